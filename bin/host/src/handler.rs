//! Defines the [CallHandler] trait, which describes the host-side operations reachable through the
//! tunnel.

use crate::GuestMemory;
use tunnel_proto::{GuestAddr, HandlerResult};

/// The [CallHandler] trait describes the host-side implementation of every call in the tunnel's
/// protocol. The [Dispatcher] decodes a call record and invokes exactly one of these methods.
///
/// Each method reports its outcome through its return value only: `Ok(retval)` on success, or
/// `Err(errno)` which the dispatcher hands back to the guest as `retval = -1`, `error = errno`.
/// No error state is shared between calls.
///
/// Pointer arguments are guest-virtual addresses. Handlers that need the bytes behind them use the
/// passed [GuestMemory].
///
/// [Dispatcher]: crate::Dispatcher
pub trait CallHandler {
    /// Release a guest socket handle.
    fn close(&self, fd: i32) -> HandlerResult;

    /// Read the file status flags of a guest socket handle.
    fn fcntl_getfl(&self, fd: i32) -> HandlerResult;

    /// Replace the file status flags of a guest socket handle.
    fn fcntl_setfl(&self, fd: i32, flags: i32) -> HandlerResult;

    /// Create a socket and return its guest handle.
    fn socket(&self, domain: i32, ty: i32, protocol: i32) -> HandlerResult;

    /// Accept a connection and return the new guest handle. The peer address is written to
    /// `addr` when both `addr` and `addrlen` are non-null.
    fn accept(
        &self,
        mem: &dyn GuestMemory,
        socket: i32,
        addr: GuestAddr,
        addrlen: GuestAddr,
    ) -> HandlerResult;

    /// Bind a socket to the `sockaddr` at `addr`.
    fn bind(&self, mem: &dyn GuestMemory, socket: i32, addr: GuestAddr, addrlen: u32)
        -> HandlerResult;

    /// Connect a socket to the `sockaddr` at `addr`.
    fn connect(
        &self,
        mem: &dyn GuestMemory,
        socket: i32,
        addr: GuestAddr,
        addrlen: u32,
    ) -> HandlerResult;

    /// Mark a socket as accepting connections.
    fn listen(&self, socket: i32, backlog: i32) -> HandlerResult;

    /// Receive up to `length` bytes into the guest buffer and return the number received.
    fn recv(
        &self,
        mem: &dyn GuestMemory,
        socket: i32,
        buffer: GuestAddr,
        length: u64,
        flags: i32,
    ) -> HandlerResult;

    /// Send `length` bytes from the guest buffer and return the number sent.
    fn send(
        &self,
        mem: &dyn GuestMemory,
        socket: i32,
        buffer: GuestAddr,
        length: u64,
        flags: i32,
    ) -> HandlerResult;

    /// Write `length` guest bytes at `offset` of virtual file `index`.
    fn write_file(
        &self,
        mem: &dyn GuestMemory,
        buffer: GuestAddr,
        length: u64,
        offset: u64,
        index: u64,
    ) -> HandlerResult;

    /// Read `length` bytes at `offset` of virtual file `index` into the guest buffer.
    fn read_file(
        &self,
        mem: &dyn GuestMemory,
        buffer: GuestAddr,
        length: u64,
        offset: u64,
        index: u64,
    ) -> HandlerResult;

    /// Return the size in bytes of virtual file `index`.
    fn size_file(&self, index: u64) -> HandlerResult;
}
