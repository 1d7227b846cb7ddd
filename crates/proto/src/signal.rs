//! Contains the [TrapSignal] type, which tells a readiness notification apart from a service call.

use derive_more::{Display, From, Into};

/// A guest-virtual address.
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, From, Into)]
#[display("{_0:#x}")]
pub struct GuestAddr(pub u64);

impl GuestAddr {
    /// Returns the address `offset` bytes past this one, or [None] on overflow.
    pub const fn checked_add(self, offset: u64) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }
}

/// The meaning of the value a guest passes with the trapping instruction.
///
/// The same trapped write carries two unrelated signals: zero announces that guest address
/// translation is live and patches may be installed, anything else points at a [CallRecord].
///
/// [CallRecord]: crate::CallRecord
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum TrapSignal {
    /// The guest MMU is configured; install pending hooks.
    #[display("ready")]
    Ready,
    /// Service the call record at this guest-virtual address.
    #[display("call@{_0}")]
    Call(GuestAddr),
}

impl From<u64> for TrapSignal {
    fn from(value: u64) -> Self {
        match value {
            0 => Self::Ready,
            ptr => Self::Call(GuestAddr(ptr)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_trap_signal_from_value() {
        assert_eq!(TrapSignal::from(0), TrapSignal::Ready);
        assert_eq!(TrapSignal::from(0x4000), TrapSignal::Call(GuestAddr(0x4000)));
        assert_eq!(TrapSignal::from(u64::MAX), TrapSignal::Call(GuestAddr(u64::MAX)));
    }

    #[test]
    fn test_display() {
        assert_eq!(TrapSignal::Call(GuestAddr(0x4000)).to_string(), "call@0x4000");
        assert_eq!(TrapSignal::Ready.to_string(), "ready");
    }

    #[test]
    fn test_guest_addr_checked_add() {
        assert_eq!(GuestAddr(0x10).checked_add(8), Some(GuestAddr(0x18)));
        assert_eq!(GuestAddr(u64::MAX).checked_add(1), None);
    }
}
