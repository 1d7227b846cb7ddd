//! This module contains the [GuestMemory] and [PhysMemory] traits and a flat, identity-mapped
//! implementation of both.

use crate::errors::MemoryError;
use std::sync::{Arc, Mutex, PoisonError};
use tunnel_proto::GuestAddr;

/// Describes access to guest-virtual memory, as seen through the address space of the virtual
/// CPU that raised the trap.
pub trait GuestMemory {
    /// Fill `buf` with the bytes at `addr`.
    fn read(&self, addr: GuestAddr, buf: &mut [u8]) -> Result<(), MemoryError>;

    /// Store `buf` at `addr`.
    fn write(&self, addr: GuestAddr, buf: &[u8]) -> Result<(), MemoryError>;
}

/// Describes access to guest-physical memory, bypassing the guest MMU. Used to patch guest code.
pub trait PhysMemory {
    /// Fill `buf` with the bytes at physical address `pa`.
    fn read_phys(&self, pa: u64, buf: &mut [u8]) -> Result<(), MemoryError>;

    /// Store `buf` at physical address `pa`.
    fn write_phys(&self, pa: u64, buf: &[u8]) -> Result<(), MemoryError>;
}

impl<T: GuestMemory + ?Sized> GuestMemory for Arc<T> {
    fn read(&self, addr: GuestAddr, buf: &mut [u8]) -> Result<(), MemoryError> {
        (**self).read(addr, buf)
    }

    fn write(&self, addr: GuestAddr, buf: &[u8]) -> Result<(), MemoryError> {
        (**self).write(addr, buf)
    }
}

impl<T: PhysMemory + ?Sized> PhysMemory for Arc<T> {
    fn read_phys(&self, pa: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        (**self).read_phys(pa, buf)
    }

    fn write_phys(&self, pa: u64, buf: &[u8]) -> Result<(), MemoryError> {
        (**self).write_phys(pa, buf)
    }
}

/// A single contiguous region of guest memory in which virtual and physical addresses coincide.
/// Backs the native mode and the tests.
#[derive(Debug)]
pub struct FlatGuestMemory {
    base: u64,
    bytes: Mutex<Vec<u8>>,
}

impl FlatGuestMemory {
    /// Create a zero-filled region of `size` bytes starting at `base`.
    pub fn new(base: u64, size: usize) -> Self {
        Self { base, bytes: Mutex::new(vec![0u8; size]) }
    }

    /// First address of the region.
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// Size of the region in bytes.
    pub fn size(&self) -> usize {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn with_range<R>(
        &self,
        addr: u64,
        len: usize,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R, MemoryError> {
        let unmapped = MemoryError::Unmapped { addr: GuestAddr(addr), len };
        let mut bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);

        let start = addr.checked_sub(self.base).ok_or_else(|| unmapped.clone())? as usize;
        let end = start.checked_add(len).ok_or_else(|| unmapped.clone())?;
        let range = bytes.get_mut(start..end).ok_or(unmapped)?;

        Ok(f(range))
    }
}

impl GuestMemory for FlatGuestMemory {
    fn read(&self, addr: GuestAddr, buf: &mut [u8]) -> Result<(), MemoryError> {
        self.with_range(addr.0, buf.len(), |range| buf.copy_from_slice(range))
    }

    fn write(&self, addr: GuestAddr, buf: &[u8]) -> Result<(), MemoryError> {
        self.with_range(addr.0, buf.len(), |range| range.copy_from_slice(buf))
    }
}

impl PhysMemory for FlatGuestMemory {
    fn read_phys(&self, pa: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        self.read(GuestAddr(pa), buf)
    }

    fn write_phys(&self, pa: u64, buf: &[u8]) -> Result<(), MemoryError> {
        self.write(GuestAddr(pa), buf)
    }
}
