#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod errors;
pub use errors::{Errno, HandlerResult};

mod number;
pub use number::CallNumber;

mod args;
pub use args::{
    AcceptArgs, CallArgs, CloseArgs, FcntlArgs, FcntlCommand, FileIoArgs, ListenArgs, SizeFileArgs,
    SocketAddrArgs, SocketArgs, TransferArgs, ARGS_SIZE,
};

mod record;
pub use record::CallRecord;

mod signal;
pub use signal::{GuestAddr, TrapSignal};
