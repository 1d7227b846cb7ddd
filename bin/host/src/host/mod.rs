//! This module contains [HostHandlers], the [CallHandler] that services guest calls with host
//! sockets and files.

use crate::{errors::MemoryError, CallHandler, GuestMemory};
use std::{
    io,
    mem::{size_of, zeroed},
    os::fd::{AsRawFd, FromRawFd, OwnedFd},
    path::Path,
    slice,
    sync::Arc,
};
use tracing::{debug, trace};
use tunnel_proto::{Errno, GuestAddr, HandlerResult};

mod files;
use files::FileTable;

mod handles;
use handles::HandleTable;

/// Largest buffer a single `RECV`, `SEND`, `READ_FILE` or `WRITE_FILE` may move.
pub const MAX_IO_LEN: u64 = 16 << 20;

/// Converts the return value of a libc call into a [Result], reading `errno` on `-1`.
fn cvt<T: Copy + PartialEq + From<i8>>(ret: T) -> Result<T, Errno> {
    if ret == T::from(-1) {
        Err(io::Error::last_os_error().into())
    } else {
        Ok(ret)
    }
}

/// A guest buffer the handler cannot reach is reported as `EFAULT`.
fn fault(err: MemoryError) -> Errno {
    debug!(target: "handlers", "Guest buffer unreachable: {err}");
    Errno::EFAULT
}

fn io_len(length: u64) -> Result<usize, Errno> {
    if length > MAX_IO_LEN {
        return Err(Errno::EINVAL);
    }
    usize::try_from(length).map_err(|_| Errno::EINVAL)
}

/// Reads a `sockaddr` of `addrlen` bytes from guest memory.
fn read_sockaddr(
    mem: &dyn GuestMemory,
    addr: GuestAddr,
    addrlen: u32,
) -> Result<(libc::sockaddr_storage, libc::socklen_t), Errno> {
    let len = addrlen as usize;
    if len > size_of::<libc::sockaddr_storage>() {
        return Err(Errno::EINVAL);
    }

    // SAFETY: `sockaddr_storage` is plain old data; all-zero is a valid value and `len` is in
    // bounds of it.
    let mut storage: libc::sockaddr_storage = unsafe { zeroed() };
    let bytes = unsafe { slice::from_raw_parts_mut((&mut storage as *mut _) as *mut u8, len) };
    mem.read(addr, bytes).map_err(fault)?;

    Ok((storage, addrlen))
}

/// [HostHandlers] executes guest calls against the host operating system.
///
/// Guest socket handles are indices into a table of host descriptors; guest files are indices
/// into the table of configured virtual files.
#[derive(Debug)]
pub struct HostHandlers {
    sockets: HandleTable,
    files: FileTable,
}

impl HostHandlers {
    /// Open the virtual files at `paths` and create a handle table with room for `max_handles`
    /// sockets.
    pub fn open<P: AsRef<Path>>(paths: &[P], max_handles: usize) -> io::Result<Self> {
        Ok(Self { sockets: HandleTable::new(max_handles), files: FileTable::open(paths)? })
    }

    /// Number of configured virtual files.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    fn fd(&self, handle: i32) -> Result<Arc<OwnedFd>, Errno> {
        self.sockets.get(handle)
    }

    fn adopt(&self, raw: libc::c_int) -> HandlerResult {
        // SAFETY: `raw` was just returned by the kernel and is owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        let handle = self.sockets.insert(fd)?;
        trace!(target: "handlers", "Host fd {raw} is guest handle {handle}");
        Ok(handle.into())
    }
}

impl CallHandler for HostHandlers {
    fn close(&self, fd: i32) -> HandlerResult {
        self.sockets.remove(fd)?;
        Ok(0)
    }

    fn fcntl_getfl(&self, fd: i32) -> HandlerResult {
        let fd = self.fd(fd)?;
        // SAFETY: `fd` is a live descriptor.
        let flags = cvt(unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) })?;
        Ok(flags.into())
    }

    fn fcntl_setfl(&self, fd: i32, flags: i32) -> HandlerResult {
        let fd = self.fd(fd)?;
        // SAFETY: `fd` is a live descriptor.
        let ret = cvt(unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, flags) })?;
        Ok(ret.into())
    }

    fn socket(&self, domain: i32, ty: i32, protocol: i32) -> HandlerResult {
        // SAFETY: no pointers are passed.
        let raw = cvt(unsafe { libc::socket(domain, ty, protocol) })?;
        self.adopt(raw)
    }

    fn accept(
        &self,
        mem: &dyn GuestMemory,
        socket: i32,
        addr: GuestAddr,
        addrlen: GuestAddr,
    ) -> HandlerResult {
        let fd = self.fd(socket)?;

        let want_addr = addr.0 != 0 && addrlen.0 != 0;
        let guest_len = if want_addr {
            let mut len = [0u8; size_of::<libc::socklen_t>()];
            mem.read(addrlen, &mut len).map_err(fault)?;
            libc::socklen_t::from_ne_bytes(len)
        } else {
            0
        };

        // A full table must fail before the pending connection is taken off the queue.
        let slot = self.sockets.reserve()?;

        // SAFETY: all-zero is a valid `sockaddr_storage`.
        let mut storage: libc::sockaddr_storage = unsafe { zeroed() };
        let mut len = size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        // SAFETY: `storage` and `len` describe a writable buffer of `len` bytes.
        let raw = cvt(unsafe {
            libc::accept(fd.as_raw_fd(), (&mut storage as *mut _) as *mut libc::sockaddr, &mut len)
        })?;
        // SAFETY: `raw` was just returned by the kernel and is owned by nobody else.
        let conn = unsafe { OwnedFd::from_raw_fd(raw) };

        if want_addr {
            let copy = guest_len.min(len) as usize;
            // SAFETY: `copy` does not exceed `len`, which the kernel bounds by the storage size.
            let bytes =
                unsafe { slice::from_raw_parts((&storage as *const _) as *const u8, copy) };
            mem.write(addr, bytes).map_err(fault)?;
            mem.write(addrlen, &len.to_ne_bytes()).map_err(fault)?;
        }

        Ok(slot.fill(conn).into())
    }

    fn bind(
        &self,
        mem: &dyn GuestMemory,
        socket: i32,
        addr: GuestAddr,
        addrlen: u32,
    ) -> HandlerResult {
        let fd = self.fd(socket)?;
        let (storage, len) = read_sockaddr(mem, addr, addrlen)?;
        // SAFETY: `storage` holds at least `len` initialized bytes.
        let ret = cvt(unsafe {
            libc::bind(fd.as_raw_fd(), (&storage as *const _) as *const libc::sockaddr, len)
        })?;
        Ok(ret.into())
    }

    fn connect(
        &self,
        mem: &dyn GuestMemory,
        socket: i32,
        addr: GuestAddr,
        addrlen: u32,
    ) -> HandlerResult {
        let fd = self.fd(socket)?;
        let (storage, len) = read_sockaddr(mem, addr, addrlen)?;
        // SAFETY: `storage` holds at least `len` initialized bytes.
        let ret = cvt(unsafe {
            libc::connect(fd.as_raw_fd(), (&storage as *const _) as *const libc::sockaddr, len)
        })?;
        Ok(ret.into())
    }

    fn listen(&self, socket: i32, backlog: i32) -> HandlerResult {
        let fd = self.fd(socket)?;
        // SAFETY: `fd` is a live descriptor.
        let ret = cvt(unsafe { libc::listen(fd.as_raw_fd(), backlog) })?;
        Ok(ret.into())
    }

    fn recv(
        &self,
        mem: &dyn GuestMemory,
        socket: i32,
        buffer: GuestAddr,
        length: u64,
        flags: i32,
    ) -> HandlerResult {
        let fd = self.fd(socket)?;
        let mut buf = vec![0u8; io_len(length)?];
        // SAFETY: `buf` is writable for `buf.len()` bytes.
        let n = cvt(unsafe {
            libc::recv(fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len(), flags)
        })?;
        mem.write(buffer, &buf[..n as usize]).map_err(fault)?;
        Ok(n as i64)
    }

    fn send(
        &self,
        mem: &dyn GuestMemory,
        socket: i32,
        buffer: GuestAddr,
        length: u64,
        flags: i32,
    ) -> HandlerResult {
        let fd = self.fd(socket)?;
        let mut buf = vec![0u8; io_len(length)?];
        mem.read(buffer, &mut buf).map_err(fault)?;
        // SAFETY: `buf` is readable for `buf.len()` bytes.
        let n = cvt(unsafe { libc::send(fd.as_raw_fd(), buf.as_ptr().cast(), buf.len(), flags) })?;
        Ok(n as i64)
    }

    fn write_file(
        &self,
        mem: &dyn GuestMemory,
        buffer: GuestAddr,
        length: u64,
        offset: u64,
        index: u64,
    ) -> HandlerResult {
        let mut buf = vec![0u8; io_len(length)?];
        mem.read(buffer, &mut buf).map_err(fault)?;
        let n = self.files.write_at(index, &buf, offset)?;
        Ok(n as i64)
    }

    fn read_file(
        &self,
        mem: &dyn GuestMemory,
        buffer: GuestAddr,
        length: u64,
        offset: u64,
        index: u64,
    ) -> HandlerResult {
        let mut buf = vec![0u8; io_len(length)?];
        let n = self.files.read_at(index, &mut buf, offset)?;
        mem.write(buffer, &buf[..n]).map_err(fault)?;
        Ok(n as i64)
    }

    fn size_file(&self, index: u64) -> HandlerResult {
        let size = self.files.size(index)?;
        i64::try_from(size).map_err(|_| Errno::EIO)
    }
}
