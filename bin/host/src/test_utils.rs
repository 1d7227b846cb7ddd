//! Test utilities for the `tunnel-host` crate.

use crate::{errors::PatchError, CallHandler, GuestMemory, HookParams, HookPatcher};
use std::sync::Mutex;
use tunnel_proto::{GuestAddr, HandlerResult};

/// A [CallHandler] that logs every invocation and answers all of them with the same result.
#[derive(Debug)]
pub(crate) struct RecordingHandler {
    result: Mutex<HandlerResult>,
    calls: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub(crate) fn returning(result: HandlerResult) -> Self {
        Self { result: Mutex::new(result), calls: Mutex::new(Vec::new()) }
    }

    pub(crate) fn set_result(&self, result: HandlerResult) {
        *self.result.lock().unwrap() = result;
    }

    pub(crate) fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    fn record(&self, call: String) -> HandlerResult {
        self.calls.lock().unwrap().push(call);
        *self.result.lock().unwrap()
    }
}

impl CallHandler for RecordingHandler {
    fn close(&self, fd: i32) -> HandlerResult {
        self.record(format!("close({fd})"))
    }

    fn fcntl_getfl(&self, fd: i32) -> HandlerResult {
        self.record(format!("fcntl_getfl({fd})"))
    }

    fn fcntl_setfl(&self, fd: i32, flags: i32) -> HandlerResult {
        self.record(format!("fcntl_setfl({fd}, {flags})"))
    }

    fn socket(&self, domain: i32, ty: i32, protocol: i32) -> HandlerResult {
        self.record(format!("socket({domain}, {ty}, {protocol})"))
    }

    fn accept(
        &self,
        _: &dyn GuestMemory,
        socket: i32,
        addr: GuestAddr,
        addrlen: GuestAddr,
    ) -> HandlerResult {
        self.record(format!("accept({socket}, {addr}, {addrlen})"))
    }

    fn bind(
        &self,
        _: &dyn GuestMemory,
        socket: i32,
        addr: GuestAddr,
        addrlen: u32,
    ) -> HandlerResult {
        self.record(format!("bind({socket}, {addr}, {addrlen})"))
    }

    fn connect(
        &self,
        _: &dyn GuestMemory,
        socket: i32,
        addr: GuestAddr,
        addrlen: u32,
    ) -> HandlerResult {
        self.record(format!("connect({socket}, {addr}, {addrlen})"))
    }

    fn listen(&self, socket: i32, backlog: i32) -> HandlerResult {
        self.record(format!("listen({socket}, {backlog})"))
    }

    fn recv(
        &self,
        _: &dyn GuestMemory,
        socket: i32,
        buffer: GuestAddr,
        length: u64,
        flags: i32,
    ) -> HandlerResult {
        self.record(format!("recv({socket}, {buffer}, {length}, {flags})"))
    }

    fn send(
        &self,
        _: &dyn GuestMemory,
        socket: i32,
        buffer: GuestAddr,
        length: u64,
        flags: i32,
    ) -> HandlerResult {
        self.record(format!("send({socket}, {buffer}, {length}, {flags})"))
    }

    fn write_file(
        &self,
        _: &dyn GuestMemory,
        buffer: GuestAddr,
        length: u64,
        offset: u64,
        index: u64,
    ) -> HandlerResult {
        self.record(format!("write_file({buffer}, {length}, {offset}, {index})"))
    }

    fn read_file(
        &self,
        _: &dyn GuestMemory,
        buffer: GuestAddr,
        length: u64,
        offset: u64,
        index: u64,
    ) -> HandlerResult {
        self.record(format!("read_file({buffer}, {length}, {offset}, {index})"))
    }

    fn size_file(&self, index: u64) -> HandlerResult {
        self.record(format!("size_file({index})"))
    }
}

/// A [HookPatcher] that logs the virtual address of every hook it is asked to install, failing
/// for the addresses in `failing`.
#[derive(Debug, Default)]
pub(crate) struct RecordingPatcher {
    pub(crate) failing: Vec<u64>,
    installed: Mutex<Vec<u64>>,
}

impl RecordingPatcher {
    pub(crate) fn failing_at(failing: Vec<u64>) -> Self {
        Self { failing, installed: Mutex::new(Vec::new()) }
    }

    pub(crate) fn installed(&self) -> Vec<u64> {
        self.installed.lock().unwrap().clone()
    }
}

impl HookPatcher for RecordingPatcher {
    fn install(&self, hook: &HookParams) -> Result<(), PatchError> {
        self.installed.lock().unwrap().push(hook.va);
        if self.failing.contains(&hook.va) {
            return Err(PatchError::Misaligned("test failure"));
        }
        Ok(())
    }
}
