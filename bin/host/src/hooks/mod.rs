//! This module contains the [HookInstaller], which applies guest code patches once the guest
//! signals that its address translation is live.

use crate::errors::PatchError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info};

mod trampoline;
pub use trampoline::TrampolinePatcher;

/// Describes one code patch: the instruction at `va`/`pa` is redirected to a trampoline built in
/// the scratch buffer at `buf_va`/`buf_pa`, which runs `code` before resuming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookParams {
    /// Guest-virtual address of the hooked instruction. Zero leaves the hook disarmed.
    pub va: u64,
    /// Guest-physical address of the hooked instruction.
    pub pa: u64,
    /// Guest-virtual address of the scratch buffer.
    pub buf_va: u64,
    /// Guest-physical address of the scratch buffer.
    pub buf_pa: u64,
    /// Size of the scratch buffer in bytes.
    pub buf_size: u64,
    /// Machine code to run before the displaced instruction.
    pub code: Vec<u8>,
    /// Register the trampoline may clobber to return to the hooked code.
    pub scratch_reg: u8,
}

impl Default for HookParams {
    fn default() -> Self {
        Self { va: 0, pa: 0, buf_va: 0, buf_pa: 0, buf_size: 0, code: Vec::new(), scratch_reg: 16 }
    }
}

impl HookParams {
    /// Returns `true` if the hook has a target address.
    pub const fn is_armed(&self) -> bool {
        self.va != 0
    }
}

/// The [HookPatcher] trait describes the primitive that rewrites guest code for one hook.
pub trait HookPatcher {
    /// Install `hook`. Applying the same hook again must leave guest memory as the first
    /// application did.
    fn install(&self, hook: &HookParams) -> Result<(), PatchError>;
}

/// The [HookInstaller] applies the configured hooks on each readiness signal.
///
/// The kernel hook is applied on every signal while armed. The hook-function list is applied on
/// the first signal only; a later or concurrent signal from another vCPU skips it.
#[derive(Debug)]
pub struct HookInstaller<P> {
    patcher: P,
    kernel_hook: HookParams,
    hook_funcs: Vec<HookParams>,
    installed: AtomicBool,
}

impl<P> HookInstaller<P>
where
    P: HookPatcher,
{
    /// Create a new [HookInstaller].
    pub const fn new(patcher: P, kernel_hook: HookParams, hook_funcs: Vec<HookParams>) -> Self {
        Self { patcher, kernel_hook, hook_funcs, installed: AtomicBool::new(false) }
    }

    /// Returns the [HookPatcher].
    pub const fn patcher(&self) -> &P {
        &self.patcher
    }

    /// Returns `true` once the hook-function list has been claimed by a readiness signal.
    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    /// Handle a readiness signal.
    ///
    /// Every hook due in this pass is attempted. If any of them fails, the first failure is
    /// returned once the pass is over.
    pub fn on_ready(&self) -> Result<(), PatchError> {
        let mut first_err = None;

        if self.kernel_hook.is_armed() {
            self.apply("kernel hook", &self.kernel_hook, &mut first_err);
        }

        if self.installed.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
        {
            for (i, hook) in self.hook_funcs.iter().enumerate() {
                self.apply(&format!("hook function #{i}"), hook, &mut first_err);
            }
            info!(target: "hooks", "Applied {} hook function(s)", self.hook_funcs.len());
        }

        first_err.map_or(Ok(()), Err)
    }

    fn apply(&self, name: &str, hook: &HookParams, first_err: &mut Option<PatchError>) {
        match self.patcher.install(hook) {
            Ok(()) => debug!(target: "hooks", "Installed {name} at {:#x}", hook.va),
            Err(e) => {
                error!(target: "hooks", "Failed to install {name} at {:#x}: {e}", hook.va);
                first_err.get_or_insert(e);
            }
        }
    }
}
