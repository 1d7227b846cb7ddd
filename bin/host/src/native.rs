//! This module contains the native mode, which drives the tunnel with scripted guests running on
//! blocking worker threads, one per vCPU.

use crate::{
    build_tunnel, errors::TunnelError, CallHandler, FlatGuestMemory, GuestMemory, HookPatcher,
    MachineConfig, Tunnel,
};
use anyhow::{anyhow, Result};
use futures::future::try_join_all;
use std::sync::Arc;
use tokio::task;
use tracing::{debug, info, warn};
use tunnel_proto::{CallArgs, CallRecord, FileIoArgs, GuestAddr, SizeFileArgs};

/// First guest address handed to a scripted guest.
const GUEST_BASE: u64 = 0x1_0000;

/// Guest memory reserved per vCPU.
const VCPU_WINDOW: u64 = 0x1000;

/// Offset of the data buffer within a vCPU window.
const BUFFER_AT: u64 = 0x100;

/// Offset of the slot targeted by the store the readiness trap replaces.
const READY_SLOT_AT: u64 = 0x800;

/// Bytes read from the start of each virtual file.
pub const PREVIEW_LEN: u64 = 64;

/// The outcome of one call issued by a scripted guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    /// Raw call number.
    pub call_number: u32,
    /// Value returned by the host.
    pub retval: i64,
    /// Error number returned by the host.
    pub error: i64,
}

/// What a scripted guest observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestReport {
    /// Index of the vCPU the guest ran on.
    pub vcpu: u16,
    /// Whether the host performed the store replaced by the readiness trap.
    pub ready_stored: bool,
    /// Every call in issue order.
    pub outcomes: Vec<CallOutcome>,
    /// The leading bytes read from each virtual file.
    pub previews: Vec<Vec<u8>>,
}

/// A guest program running on one vCPU. Its record, buffer and readiness slot live in the vCPU's
/// own window of guest memory.
struct ScriptedGuest<'a, H, P> {
    vcpu: u16,
    window: u64,
    tunnel: &'a Tunnel<H, P>,
    mem: &'a FlatGuestMemory,
}

impl<H, P> ScriptedGuest<'_, H, P>
where
    H: CallHandler,
    P: HookPatcher,
{
    fn ready(&self) -> Result<bool, TunnelError> {
        let slot = self.window + READY_SLOT_AT;
        let mut regs = [0u64; 31];
        regs[20] = u64::from(self.vcpu) | 0xa5a5_0000;
        regs[23] = slot;

        match self.tunnel.on_trap(0, &regs, self.mem) {
            Ok(()) => {}
            Err(TunnelError::Hook(e)) => {
                warn!(target: "tunnel", "vCPU {}: hook installation failed: {e}", self.vcpu)
            }
            Err(e) => return Err(e),
        }

        let mut stored = [0u8; 8];
        self.mem.read(GuestAddr(slot), &mut stored)?;
        Ok(u64::from_ne_bytes(stored) == regs[20])
    }

    fn call(&self, args: CallArgs) -> Result<CallOutcome, TunnelError> {
        let at = GuestAddr(self.window);
        self.mem.write(at, &CallRecord::new(args).encode())?;
        self.tunnel.on_trap(at.0, &[0u64; 31], self.mem)?;

        let mut raw = [0u8; CallRecord::SIZE];
        self.mem.read(at, &mut raw)?;
        let record = CallRecord::decode(&raw);

        debug!(
            target: "tunnel",
            "vCPU {}: call {:#x} -> retval {}, error {}",
            self.vcpu,
            record.call_number(),
            record.retval,
            record.error
        );
        Ok(CallOutcome {
            call_number: record.call_number(),
            retval: record.retval,
            error: record.error,
        })
    }

    fn run(&self, files: u64) -> Result<GuestReport, TunnelError> {
        let ready_stored = self.ready()?;
        let mut outcomes = Vec::new();
        let mut previews = Vec::new();

        for index in 0..files {
            outcomes.push(self.call(CallArgs::SizeFile(SizeFileArgs { index }))?);

            let buffer = self.window + BUFFER_AT;
            let read = self.call(CallArgs::ReadFile(FileIoArgs {
                buffer,
                length: PREVIEW_LEN,
                offset: 0,
                index,
            }))?;

            let mut preview = vec![0u8; usize::try_from(read.retval).unwrap_or(0)];
            self.mem.read(GuestAddr(buffer), &mut preview)?;
            previews.push(preview);
            outcomes.push(read);
        }

        Ok(GuestReport { vcpu: self.vcpu, ready_stored, outcomes, previews })
    }
}

/// Run one scripted guest per vCPU against a tunnel built from `cfg`, and return their reports
/// in vCPU order.
///
/// Each guest signals readiness, then queries the size of and reads the first [PREVIEW_LEN]
/// bytes of every configured virtual file.
pub async fn run_native(cfg: &MachineConfig, vcpus: u16) -> Result<Vec<GuestReport>> {
    let mem = Arc::new(FlatGuestMemory::new(
        0,
        (GUEST_BASE + u64::from(vcpus) * VCPU_WINDOW) as usize,
    ));
    let tunnel = Arc::new(build_tunnel(cfg, Arc::clone(&mem))?);
    let files = cfg.files.len() as u64;

    info!(target: "tunnel", "Starting {vcpus} scripted guest(s)");
    let guests = (0..vcpus).map(|vcpu| {
        let (tunnel, mem) = (Arc::clone(&tunnel), Arc::clone(&mem));
        task::spawn_blocking(move || {
            let window = GUEST_BASE + u64::from(vcpu) * VCPU_WINDOW;
            ScriptedGuest { vcpu, window, tunnel: &*tunnel, mem: &*mem }.run(files)
        })
    });

    let reports = try_join_all(guests)
        .await
        .map_err(|e| anyhow!(e))?
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;
    info!(target: "tunnel", "All scripted guests completed");

    Ok(reports)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::HookParams;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fixture(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_native_guests() {
        let short = fixture(b"tunnel disk");
        let long = fixture(&[0x42; 100]);
        let cfg = MachineConfig {
            files: vec![short.path().to_path_buf(), long.path().to_path_buf()],
            ..Default::default()
        };

        let reports = run_native(&cfg, 3).await.unwrap();
        assert_eq!(reports.len(), 3);

        for (vcpu, report) in reports.iter().enumerate() {
            assert_eq!(report.vcpu as usize, vcpu);
            assert!(report.ready_stored);

            let results = report.outcomes.iter().map(|o| (o.retval, o.error)).collect::<Vec<_>>();
            assert_eq!(results, vec![(11, 0), (11, 0), (100, 0), (64, 0)]);
            assert_eq!(report.previews, vec![b"tunnel disk".to_vec(), vec![0x42; 64]]);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_native_survives_hook_failure() {
        // The hooked instruction lies outside guest memory, so the patch fails.
        let cfg = MachineConfig {
            hook_funcs: vec![HookParams {
                va: 0x4000_0000,
                pa: 0x4000_0000,
                buf_va: 0x4000_1000,
                buf_pa: 0x4000_1000,
                buf_size: 0x100,
                ..Default::default()
            }],
            ..Default::default()
        };

        let reports = run_native(&cfg, 2).await.unwrap();
        assert!(reports.iter().all(|r| r.ready_stored && r.outcomes.is_empty()));
    }

    #[tokio::test]
    async fn test_native_missing_file() {
        let cfg =
            MachineConfig { files: vec!["/nonexistent/disk.img".into()], ..Default::default() };
        assert!(run_native(&cfg, 1).await.is_err());
    }
}
