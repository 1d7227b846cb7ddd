//! This module contains the [Dispatcher], which routes a decoded [CallRecord] to its
//! [CallHandler] method.

use crate::{CallHandler, GuestMemory};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};
use tunnel_proto::{CallArgs, CallRecord, Errno, FcntlCommand, GuestAddr, HandlerResult};

/// What to do with a call number the tunnel does not recognize.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownCallPolicy {
    /// Run no handler and leave `retval` and `error` exactly as the guest wrote them.
    #[default]
    Ignore,
    /// Answer with `retval = -1` and `error = ENOSYS`.
    Reject,
}

/// The [Dispatcher] selects a handler by call number, invokes it, and folds its outcome into the
/// same record.
#[derive(Debug)]
pub struct Dispatcher<H> {
    /// The host-side call implementations.
    handler: H,
    /// Treatment of unrecognized call numbers.
    unknown_calls: UnknownCallPolicy,
}

impl<H> Dispatcher<H>
where
    H: CallHandler,
{
    /// Create a new [Dispatcher] over the given [CallHandler].
    pub const fn new(handler: H, unknown_calls: UnknownCallPolicy) -> Self {
        Self { handler, unknown_calls }
    }

    /// Returns the underlying [CallHandler].
    pub const fn handler(&self) -> &H {
        &self.handler
    }

    /// Services one call. On return, `record.retval` and `record.error` describe the outcome,
    /// except for unrecognized calls under [UnknownCallPolicy::Ignore], which leave the record
    /// untouched.
    pub fn dispatch(&self, record: &mut CallRecord, mem: &dyn GuestMemory) {
        let Some(outcome) = self.route(&record.args, mem) else {
            return;
        };

        match outcome {
            Ok(retval) => {
                record.retval = retval;
                record.error = 0;
            }
            Err(errno) => {
                record.retval = -1;
                record.error = errno.into();
            }
        }

        trace!(
            target: "dispatcher",
            "Call {:#x} returned {} (error {})",
            record.call_number(),
            record.retval,
            record.error
        );
    }

    /// Invokes the handler selected by `args`. Returns [None] when no outcome should be recorded.
    fn route(&self, args: &CallArgs, mem: &dyn GuestMemory) -> Option<HandlerResult> {
        let h = &self.handler;
        let outcome = match *args {
            CallArgs::Close(a) => h.close(a.fd),
            CallArgs::Fcntl(a) => match a.command() {
                FcntlCommand::GetFlags => h.fcntl_getfl(a.fd),
                FcntlCommand::SetFlags => h.fcntl_setfl(a.fd, a.flags),
                FcntlCommand::Other(cmd) => {
                    debug!(target: "dispatcher", "Rejecting fcntl command {cmd} on fd {}", a.fd);
                    Err(Errno::EINVAL)
                }
            },
            CallArgs::Socket(a) => h.socket(a.domain, a.ty, a.protocol),
            CallArgs::Accept(a) => {
                h.accept(mem, a.socket, GuestAddr(a.addr), GuestAddr(a.addrlen_ptr))
            }
            CallArgs::Bind(a) => h.bind(mem, a.socket, GuestAddr(a.addr), a.addrlen),
            CallArgs::Connect(a) => h.connect(mem, a.socket, GuestAddr(a.addr), a.addrlen),
            CallArgs::Listen(a) => h.listen(a.socket, a.backlog),
            CallArgs::Recv(a) => h.recv(mem, a.socket, GuestAddr(a.buffer), a.length, a.flags),
            CallArgs::Send(a) => h.send(mem, a.socket, GuestAddr(a.buffer), a.length, a.flags),
            CallArgs::WriteFile(a) => {
                h.write_file(mem, GuestAddr(a.buffer), a.length, a.offset, a.index)
            }
            CallArgs::ReadFile(a) => {
                h.read_file(mem, GuestAddr(a.buffer), a.length, a.offset, a.index)
            }
            CallArgs::SizeFile(a) => h.size_file(a.index),
            CallArgs::Unknown { call_number, .. } => match self.unknown_calls {
                UnknownCallPolicy::Ignore => {
                    warn!(target: "dispatcher", "Ignoring unknown call {call_number:#x}");
                    return None;
                }
                UnknownCallPolicy::Reject => {
                    warn!(target: "dispatcher", "Rejecting unknown call {call_number:#x}");
                    Err(Errno::ENOSYS)
                }
            },
        };

        Some(outcome)
    }
}
