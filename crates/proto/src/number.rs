//! Contains the [CallNumber] type, which selects the operation a [CallRecord] requests.
//!
//! [CallRecord]: crate::CallRecord

use derive_more::Display;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The operations a guest may request through the tunnel.
///
/// The discriminants are the values found in the `call_number` field of the wire record.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u32)]
pub enum CallNumber {
    /// Close a guest socket handle.
    #[display("CLOSE")]
    Close = 0x100,
    /// File-status flag control on a guest socket handle.
    #[display("FCNTL")]
    Fcntl = 0x101,
    /// Create a socket.
    #[display("SOCKET")]
    Socket = 0x110,
    /// Accept a connection on a listening socket.
    #[display("ACCEPT")]
    Accept = 0x111,
    /// Bind a socket to an address.
    #[display("BIND")]
    Bind = 0x112,
    /// Connect a socket to an address.
    #[display("CONNECT")]
    Connect = 0x113,
    /// Mark a socket as listening.
    #[display("LISTEN")]
    Listen = 0x114,
    /// Receive bytes from a socket.
    #[display("RECV")]
    Recv = 0x115,
    /// Send bytes on a socket.
    #[display("SEND")]
    Send = 0x116,
    /// Write guest bytes into a host virtual file.
    #[display("WRITE_FILE")]
    WriteFile = 0x117,
    /// Read a host virtual file into guest memory.
    #[display("READ_FILE")]
    ReadFile = 0x118,
    /// Query the size of a host virtual file.
    #[display("SIZE_FILE")]
    SizeFile = 0x119,
}

impl CallNumber {
    /// Every recognized call number, in wire order.
    pub const ALL: [Self; 12] = [
        Self::Close,
        Self::Fcntl,
        Self::Socket,
        Self::Accept,
        Self::Bind,
        Self::Connect,
        Self::Listen,
        Self::Recv,
        Self::Send,
        Self::WriteFile,
        Self::ReadFile,
        Self::SizeFile,
    ];
}

impl From<CallNumber> for u32 {
    fn from(number: CallNumber) -> Self {
        number as Self
    }
}

impl TryFrom<u32> for CallNumber {
    /// The unrecognized raw value.
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        let number = match value {
            0x100 => Self::Close,
            0x101 => Self::Fcntl,
            0x110 => Self::Socket,
            0x111 => Self::Accept,
            0x112 => Self::Bind,
            0x113 => Self::Connect,
            0x114 => Self::Listen,
            0x115 => Self::Recv,
            0x116 => Self::Send,
            0x117 => Self::WriteFile,
            0x118 => Self::ReadFile,
            0x119 => Self::SizeFile,
            _ => return Err(value),
        };
        Ok(number)
    }
}
