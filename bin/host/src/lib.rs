#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod cli;
pub use cli::{init_tracing_subscriber, HostCli, HostMode};

pub mod errors;

mod mem;
pub use mem::{FlatGuestMemory, GuestMemory, PhysMemory};

mod regs;
pub use regs::Registers;

mod handler;
pub use handler::CallHandler;

mod dispatch;
pub use dispatch::{Dispatcher, UnknownCallPolicy};

mod hooks;
pub use hooks::{HookInstaller, HookParams, HookPatcher, TrampolinePatcher};

mod host;
pub use host::{HostHandlers, MAX_IO_LEN};

mod cfg;
pub use cfg::{MachineConfig, DEFAULT_MAX_HANDLES};

mod tunnel;
pub use tunnel::{build_tunnel, HostTunnel, Tunnel};

pub mod native;

#[cfg(test)]
mod test_utils;
