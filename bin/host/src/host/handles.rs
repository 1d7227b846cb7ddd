//! Guest socket handles.

use std::{
    os::fd::OwnedFd,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tunnel_proto::Errno;

#[derive(Debug, Clone, Default)]
enum Slot {
    #[default]
    Free,
    /// Held for a descriptor that is about to be created.
    Reserved,
    Open(Arc<OwnedFd>),
}

/// Maps guest socket handles to host file descriptors. A handle is an index into a table of fixed
/// capacity, so the guest never sees a host descriptor.
///
/// Descriptors are handed out as [Arc]s so that a blocking call does not hold the table lock. A
/// descriptor closed while such a call is in flight is released once that call returns.
#[derive(Debug)]
pub(crate) struct HandleTable {
    slots: Mutex<Vec<Slot>>,
}

/// A slot claimed ahead of the host call that produces its descriptor. Dropping an unfilled
/// reservation frees the slot again.
#[derive(Debug)]
pub(crate) struct Reservation<'a> {
    table: &'a HandleTable,
    index: usize,
}

impl Reservation<'_> {
    /// Store `fd` in the reserved slot and return its handle.
    pub(crate) fn fill(self, fd: OwnedFd) -> i32 {
        self.table.lock()[self.index] = Slot::Open(Arc::new(fd));
        // `reserve` only hands out indices that fit.
        self.index as i32
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let mut slots = self.table.lock();
        if matches!(slots[self.index], Slot::Reserved) {
            slots[self.index] = Slot::Free;
        }
    }
}

impl HandleTable {
    pub(crate) fn new(capacity: usize) -> Self {
        Self { slots: Mutex::new(vec![Slot::Free; capacity]) }
    }

    /// Claim the lowest free slot, or fail with `EMFILE` if the table is full.
    pub(crate) fn reserve(&self) -> Result<Reservation<'_>, Errno> {
        let mut slots = self.lock();
        let (index, slot) = slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| matches!(s, Slot::Free))
            .ok_or(Errno::EMFILE)?;
        i32::try_from(index).map_err(|_| Errno::EMFILE)?;

        *slot = Slot::Reserved;
        Ok(Reservation { table: self, index })
    }

    /// Store `fd` in the lowest free slot and return its handle.
    pub(crate) fn insert(&self, fd: OwnedFd) -> Result<i32, Errno> {
        Ok(self.reserve()?.fill(fd))
    }

    pub(crate) fn get(&self, handle: i32) -> Result<Arc<OwnedFd>, Errno> {
        let slots = self.lock();
        match Self::index(handle).and_then(|i| slots.get(i)) {
            Some(Slot::Open(fd)) => Ok(Arc::clone(fd)),
            _ => Err(Errno::EBADF),
        }
    }

    /// Free the slot of `handle`.
    pub(crate) fn remove(&self, handle: i32) -> Result<(), Errno> {
        let mut slots = self.lock();
        match Self::index(handle).and_then(|i| slots.get_mut(i)) {
            Some(slot) if matches!(slot, Slot::Open(_)) => {
                *slot = Slot::Free;
                Ok(())
            }
            _ => Err(Errno::EBADF),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn index(handle: i32) -> Option<usize> {
        usize::try_from(handle).ok()
    }
}
