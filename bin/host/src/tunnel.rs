//! This module contains the [Tunnel], the entry point invoked when a guest executes the trapping
//! instruction.

use crate::{
    errors::{ConfigError, TunnelError},
    CallHandler, Dispatcher, GuestMemory, HookInstaller, HookPatcher, HostHandlers,
    MachineConfig, PhysMemory, Registers, TrampolinePatcher,
};
use tracing::{info, trace};
use tunnel_proto::{CallRecord, GuestAddr, TrapSignal};

/// Register holding the value stored by the instruction the readiness trap replaces.
const STORE_VALUE_REG: u8 = 20;

/// Register holding the address stored to by the instruction the readiness trap replaces.
const STORE_ADDR_REG: u8 = 23;

/// The [Tunnel] services traps raised by guest vCPUs. It is shared between vCPU threads; each
/// trap is handled on the thread of the vCPU that raised it.
#[derive(Debug)]
pub struct Tunnel<H, P> {
    dispatcher: Dispatcher<H>,
    hooks: HookInstaller<P>,
}

impl<H, P> Tunnel<H, P>
where
    H: CallHandler,
    P: HookPatcher,
{
    /// Create a new [Tunnel].
    pub const fn new(dispatcher: Dispatcher<H>, hooks: HookInstaller<P>) -> Self {
        Self { dispatcher, hooks }
    }

    /// Returns the [Dispatcher].
    pub const fn dispatcher(&self) -> &Dispatcher<H> {
        &self.dispatcher
    }

    /// Returns the [HookInstaller].
    pub const fn hooks(&self) -> &HookInstaller<P> {
        &self.hooks
    }

    /// Handle a trap carrying `value`.
    ///
    /// A zero value is the readiness signal: pending hooks are applied and the guest store the
    /// trap replaced, `str x20, [x23]`, is performed on the guest's behalf. Any other value is the
    /// guest-virtual address of a [CallRecord], which is read, serviced and written back in
    /// place.
    ///
    /// ## Returns
    /// - `Ok(())` if the trap was serviced.
    /// - `Err(TunnelError::Memory)` if guest memory could not be accessed.
    /// - `Err(TunnelError::Hook)` if a hook failed to install. The replaced store has still been
    ///   performed.
    pub fn on_trap(
        &self,
        value: u64,
        regs: &dyn Registers,
        mem: &dyn GuestMemory,
    ) -> Result<(), TunnelError> {
        match TrapSignal::from(value) {
            TrapSignal::Ready => {
                let hooked = self.hooks.on_ready();

                let addr = GuestAddr(regs.xreg(STORE_ADDR_REG));
                mem.write(addr, &regs.xreg(STORE_VALUE_REG).to_ne_bytes())?;

                hooked.map_err(Into::into)
            }
            TrapSignal::Call(ptr) => {
                let mut raw = [0u8; CallRecord::SIZE];
                mem.read(ptr, &mut raw)?;

                let mut record = CallRecord::decode(&raw);
                trace!(target: "tunnel", "Servicing call {:#x} at {ptr}", record.call_number());
                self.dispatcher.dispatch(&mut record, mem);

                mem.write(ptr, &record.encode())?;
                Ok(())
            }
        }
    }
}

/// A [Tunnel] backed by the host operating system, patching through `M`.
pub type HostTunnel<M> = Tunnel<HostHandlers, TrampolinePatcher<M>>;

/// Build a [HostTunnel] for `cfg`, patching guest code through `phys`.
pub fn build_tunnel<M: PhysMemory>(
    cfg: &MachineConfig,
    phys: M,
) -> Result<HostTunnel<M>, ConfigError> {
    cfg.validate()?;
    let handlers = HostHandlers::open(&cfg.files, cfg.max_handles)?;
    info!(
        target: "tunnel",
        "Serving {} virtual file(s) and {} hook(s)",
        handlers.file_count(),
        cfg.armed_hooks()
    );

    Ok(Tunnel::new(
        Dispatcher::new(handlers, cfg.unknown_calls),
        HookInstaller::new(
            TrampolinePatcher::new(phys),
            cfg.kernel_hook.clone(),
            cfg.hook_funcs.clone(),
        ),
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        errors::MemoryError,
        test_utils::{RecordingHandler, RecordingPatcher},
        FlatGuestMemory, HookParams, UnknownCallPolicy,
    };
    use std::sync::Arc;
    use tunnel_proto::{CallArgs, Errno, FcntlArgs, SocketArgs};

    const RECORD_AT: u64 = 0x4000;

    fn regs(value: u64, addr: u64) -> [u64; 31] {
        let mut regs = [0u64; 31];
        regs[20] = value;
        regs[23] = addr;
        regs
    }

    fn read_record(mem: &FlatGuestMemory, at: u64) -> CallRecord {
        let mut raw = [0u8; CallRecord::SIZE];
        mem.read(GuestAddr(at), &mut raw).unwrap();
        CallRecord::decode(&raw)
    }

    fn mock_tunnel(
        handler: RecordingHandler,
        hook_funcs: Vec<HookParams>,
    ) -> Tunnel<RecordingHandler, RecordingPatcher> {
        Tunnel::new(
            Dispatcher::new(handler, UnknownCallPolicy::Ignore),
            HookInstaller::new(RecordingPatcher::default(), HookParams::default(), hook_funcs),
        )
    }

    #[test]
    fn test_socket_end_to_end() {
        let tunnel = build_tunnel(&MachineConfig::default(), FlatGuestMemory::new(0, 0)).unwrap();
        let mem = FlatGuestMemory::new(0, 0x8000);

        let args = CallArgs::Socket(SocketArgs {
            domain: libc::AF_INET,
            ty: libc::SOCK_STREAM,
            protocol: 0,
        });
        mem.write(GuestAddr(RECORD_AT), &CallRecord::new(args).encode()).unwrap();

        tunnel.on_trap(RECORD_AT, &[0u64; 31], &mem).unwrap();

        let record = read_record(&mem, RECORD_AT);
        assert!(record.retval >= 0);
        assert_eq!(record.error, 0);
        assert_eq!(record.args, args);
    }

    #[test]
    fn test_fcntl_bad_command_end_to_end() {
        let tunnel = mock_tunnel(RecordingHandler::returning(Ok(0)), vec![]);
        let mem = FlatGuestMemory::new(0, 0x8000);

        let args = CallArgs::Fcntl(FcntlArgs { fd: 7, cmd: 99, flags: 0 });
        mem.write(GuestAddr(RECORD_AT), &CallRecord::new(args).encode()).unwrap();

        tunnel.on_trap(RECORD_AT, &[0u64; 31], &mem).unwrap();

        let record = read_record(&mem, RECORD_AT);
        assert_eq!(record.retval, -1);
        assert_eq!(record.error, i64::from(Errno::EINVAL));
        assert!(tunnel.dispatcher().handler().take_calls().is_empty());
    }

    #[test]
    fn test_record_written_in_place() {
        let tunnel = mock_tunnel(RecordingHandler::returning(Ok(3)), vec![]);
        let mem = FlatGuestMemory::new(0, 0x8000);
        mem.write(GuestAddr(RECORD_AT - 4), &[0xcc; 4]).unwrap();
        mem.write(GuestAddr(RECORD_AT + CallRecord::SIZE as u64), &[0xdd; 4]).unwrap();

        let args = CallArgs::Socket(SocketArgs { domain: 2, ty: 1, protocol: 0 });
        mem.write(GuestAddr(RECORD_AT), &CallRecord::new(args).encode()).unwrap();
        tunnel.on_trap(RECORD_AT, &[0u64; 31], &mem).unwrap();

        assert_eq!(read_record(&mem, RECORD_AT).retval, 3);
        let mut guard = [0u8; 4];
        mem.read(GuestAddr(RECORD_AT - 4), &mut guard).unwrap();
        assert_eq!(guard, [0xcc; 4]);
        mem.read(GuestAddr(RECORD_AT + CallRecord::SIZE as u64), &mut guard).unwrap();
        assert_eq!(guard, [0xdd; 4]);
    }

    #[test]
    fn test_ready_emulates_replaced_store() {
        let tunnel = mock_tunnel(RecordingHandler::returning(Ok(0)), vec![HookParams {
            va: 0x1000,
            ..Default::default()
        }]);
        let mem = FlatGuestMemory::new(0, 0x8000);

        tunnel.on_trap(0, &regs(0x1122_3344_5566_7788, 0x6000), &mem).unwrap();
        tunnel.on_trap(0, &regs(0x99, 0x6008), &mem).unwrap();

        let mut stored = [0u8; 8];
        mem.read(GuestAddr(0x6000), &mut stored).unwrap();
        assert_eq!(u64::from_ne_bytes(stored), 0x1122_3344_5566_7788);
        mem.read(GuestAddr(0x6008), &mut stored).unwrap();
        assert_eq!(u64::from_ne_bytes(stored), 0x99);

        assert_eq!(tunnel.hooks().patcher().installed(), vec![0x1000]);
        assert!(tunnel.dispatcher().handler().take_calls().is_empty());
    }

    #[test]
    fn test_hook_failure_still_stores() {
        let tunnel = Tunnel::new(
            Dispatcher::new(RecordingHandler::returning(Ok(0)), UnknownCallPolicy::Ignore),
            HookInstaller::new(
                RecordingPatcher::failing_at(vec![0x1000]),
                HookParams::default(),
                vec![HookParams { va: 0x1000, ..Default::default() }],
            ),
        );
        let mem = FlatGuestMemory::new(0, 0x8000);

        let err = tunnel.on_trap(0, &regs(7, 0x6000), &mem).unwrap_err();
        assert!(matches!(err, TunnelError::Hook(_)));

        let mut stored = [0u8; 8];
        mem.read(GuestAddr(0x6000), &mut stored).unwrap();
        assert_eq!(u64::from_ne_bytes(stored), 7);
    }

    #[test]
    fn test_memory_errors_propagate() {
        let tunnel = mock_tunnel(RecordingHandler::returning(Ok(0)), vec![]);
        let mem = FlatGuestMemory::new(0, 0x8000);

        let err = tunnel.on_trap(0x7ff0, &[0u64; 31], &mem).unwrap_err();
        assert_eq!(
            err,
            TunnelError::Memory(MemoryError::Unmapped {
                addr: GuestAddr(0x7ff0),
                len: CallRecord::SIZE
            })
        );

        let err = tunnel.on_trap(0, &regs(1, 0x9000), &mem).unwrap_err();
        assert!(matches!(err, TunnelError::Memory(_)));
        assert!(tunnel.dispatcher().handler().take_calls().is_empty());
    }

    #[test]
    fn test_concurrent_vcpus() {
        let tunnel = Arc::new(mock_tunnel(RecordingHandler::returning(Ok(1)), vec![
            HookParams { va: 0x1000, ..Default::default() },
            HookParams { va: 0x2000, ..Default::default() },
        ]));
        let mem = Arc::new(FlatGuestMemory::new(0, 0x10000));

        let vcpus = (0..4u64)
            .map(|cpu| {
                let (tunnel, mem) = (Arc::clone(&tunnel), Arc::clone(&mem));
                std::thread::spawn(move || {
                    let at = 0x8000 + cpu * 0x100;
                    tunnel.on_trap(0, &regs(cpu, 0x100 * cpu), &mem).unwrap();

                    let args = CallArgs::Socket(SocketArgs { domain: 2, ty: 1, protocol: 0 });
                    mem.write(GuestAddr(at), &CallRecord::new(args).encode()).unwrap();
                    tunnel.on_trap(at, &[0u64; 31], &mem).unwrap();
                    read_record(&mem, at)
                })
            })
            .collect::<Vec<_>>();

        for vcpu in vcpus {
            let record = vcpu.join().unwrap();
            assert_eq!((record.retval, record.error), (1, 0));
        }
        assert_eq!(tunnel.hooks().patcher().installed().len(), 2);
        assert_eq!(tunnel.dispatcher().handler().take_calls().len(), 4);
    }
}
