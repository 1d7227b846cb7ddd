//! Errors for the `tunnel-host` crate.

use thiserror::Error;
use tunnel_proto::GuestAddr;

/// A [MemoryError] is returned by [GuestMemory] and [PhysMemory] implementations when an access
/// cannot be performed.
///
/// [GuestMemory]: crate::GuestMemory
/// [PhysMemory]: crate::PhysMemory
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The range is not backed by guest memory.
    #[error("{len} bytes at {addr} are not mapped")]
    Unmapped {
        /// Start of the faulting range.
        addr: GuestAddr,
        /// Length of the faulting range.
        len: usize,
    },
    /// The accessor failed for another reason.
    #[error("Guest memory access failed: {0}")]
    Other(String),
}

/// A [PatchError] describes why a hook could not be installed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// The scratch buffer cannot hold the trampoline.
    #[error("Trampoline needs {need} bytes, scratch buffer holds {have}.")]
    BufferTooSmall {
        /// Bytes required.
        need: u64,
        /// Bytes available.
        have: u64,
    },
    /// The scratch buffer is out of reach of a direct branch from the hooked instruction.
    #[error("Branch from {from:#x} to {to:#x} is out of range.")]
    OutOfRange {
        /// Address of the hooked instruction.
        from: u64,
        /// Address of the trampoline.
        to: u64,
    },
    /// An address or the hook code is not instruction aligned.
    #[error("Misaligned hook: {0}")]
    Misaligned(&'static str),
    /// The scratch register cannot be used as a branch target.
    #[error("Invalid scratch register x{0}.")]
    InvalidRegister(u8),
    /// Patching memory failed.
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// A [TunnelError] is returned by [Tunnel::on_trap] when a trap could not be serviced.
///
/// [Tunnel::on_trap]: crate::Tunnel::on_trap
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TunnelError {
    /// Reading or writing the call record, or emulating the replaced store, failed.
    #[error(transparent)]
    Memory(#[from] MemoryError),
    /// At least one hook failed to install. Holds the first failure.
    #[error("Hook installation failed: {0}")]
    Hook(#[from] PatchError),
}

/// A [ConfigError] is returned when the machine configuration cannot be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration or a virtual file could not be read.
    #[error("Error reading configuration: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration is not valid JSON for [MachineConfig].
    ///
    /// [MachineConfig]: crate::MachineConfig
    #[error("Error deserializing configuration: {0}")]
    Parse(#[from] serde_json::Error),
    /// The configuration parsed, but describes an unusable machine.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
