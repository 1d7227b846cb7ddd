//! Errors for the `tunnel-proto` crate.

use thiserror::Error;

/// A host error number, as reported back to the guest in [CallRecord::error].
///
/// Values live in the errno space of the host the tunnel is built for, so the constants below and
/// the numbers passed through from failed host calls always agree.
///
/// [CallRecord::error]: crate::CallRecord::error
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[error("errno {0}")]
pub struct Errno(pub i32);

impl Errno {
    /// I/O error.
    pub const EIO: Self = Self(libc::EIO);
    /// Bad file descriptor, or a guest handle that maps to nothing.
    pub const EBADF: Self = Self(libc::EBADF);
    /// Resource temporarily unavailable.
    pub const EAGAIN: Self = Self(libc::EAGAIN);
    /// Bad address. Used when a handler cannot reach a guest buffer.
    pub const EFAULT: Self = Self(libc::EFAULT);
    /// Invalid argument.
    pub const EINVAL: Self = Self(libc::EINVAL);
    /// Too many open files.
    pub const EMFILE: Self = Self(libc::EMFILE);
    /// Function not implemented.
    pub const ENOSYS: Self = Self(libc::ENOSYS);

    /// Returns the raw error number.
    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl From<Errno> for i64 {
    fn from(errno: Errno) -> Self {
        errno.0 as Self
    }
}

#[cfg(any(test, feature = "std"))]
impl From<std::io::Error> for Errno {
    fn from(err: std::io::Error) -> Self {
        err.raw_os_error().map_or(Self::EIO, Self)
    }
}

/// The outcome of one host-side handler invocation: the call's return value on success, or the
/// error number to hand back to the guest.
pub type HandlerResult = Result<i64, Errno>;
