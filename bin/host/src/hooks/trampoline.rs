//! AArch64 branch-and-return trampolines.

use super::{HookParams, HookPatcher};
use crate::{errors::PatchError, PhysMemory};
use tracing::debug;

/// Size of an AArch64 instruction.
const INSN_SIZE: u64 = 4;

/// Reach of an unconditional `B`, which encodes a signed 26-bit word offset.
const BRANCH_RANGE: i64 = 1 << 27;

/// The tail appended after the hook code: the displaced instruction, `ldr`, `br`, and the
/// 8-byte return address.
const TAIL_SIZE: u64 = 3 * INSN_SIZE + 8;

/// `B <offset>`.
fn branch(from: u64, to: u64) -> Result<u32, PatchError> {
    let offset = to.wrapping_sub(from) as i64;
    if !(-BRANCH_RANGE..BRANCH_RANGE).contains(&offset) {
        return Err(PatchError::OutOfRange { from, to });
    }
    Ok(0x1400_0000 | ((offset >> 2) as u32 & 0x03ff_ffff))
}

/// `LDR X<rt>, #8`, loading the literal two instructions ahead.
const fn ldr_literal_8(rt: u8) -> u32 {
    0x5800_0000 | (2 << 5) | rt as u32
}

/// `BR X<rn>`.
const fn br(rn: u8) -> u32 {
    0xd61f_0000 | ((rn as u32) << 5)
}

/// The [TrampolinePatcher] redirects a single instruction into a trampoline:
///
/// ```text
/// buf:  <hook code>
///       <displaced instruction>
///       ldr  x<scratch>, #8
///       br   x<scratch>
///       .quad va + 4
/// ```
///
/// The displaced instruction runs from the scratch buffer, so it must not be PC-relative.
#[derive(Debug)]
pub struct TrampolinePatcher<M> {
    mem: M,
}

impl<M> TrampolinePatcher<M>
where
    M: PhysMemory,
{
    /// Create a new [TrampolinePatcher] that writes through `mem`.
    pub const fn new(mem: M) -> Self {
        Self { mem }
    }

    fn check(hook: &HookParams) -> Result<u32, PatchError> {
        if hook.scratch_reg > 30 {
            return Err(PatchError::InvalidRegister(hook.scratch_reg));
        }
        if hook.va % INSN_SIZE != 0 || hook.pa % INSN_SIZE != 0 {
            return Err(PatchError::Misaligned("hooked instruction"));
        }
        if hook.buf_va % INSN_SIZE != 0 || hook.buf_pa % INSN_SIZE != 0 {
            return Err(PatchError::Misaligned("scratch buffer"));
        }
        if hook.code.len() as u64 % INSN_SIZE != 0 {
            return Err(PatchError::Misaligned("hook code length"));
        }

        let need = hook.code.len() as u64 + TAIL_SIZE;
        if need > hook.buf_size {
            return Err(PatchError::BufferTooSmall { need, have: hook.buf_size });
        }

        branch(hook.va, hook.buf_va)
    }
}

impl<M> HookPatcher for TrampolinePatcher<M>
where
    M: PhysMemory,
{
    fn install(&self, hook: &HookParams) -> Result<(), PatchError> {
        let jump = Self::check(hook)?;

        let mut insn = [0u8; INSN_SIZE as usize];
        self.mem.read_phys(hook.pa, &mut insn)?;
        if u32::from_le_bytes(insn) == jump {
            debug!(target: "hooks", "Hook at {:#x} already in place", hook.va);
            return Ok(());
        }

        let mut tramp = Vec::with_capacity(hook.code.len() + TAIL_SIZE as usize);
        tramp.extend_from_slice(&hook.code);
        tramp.extend_from_slice(&insn);
        tramp.extend_from_slice(&ldr_literal_8(hook.scratch_reg).to_le_bytes());
        tramp.extend_from_slice(&br(hook.scratch_reg).to_le_bytes());
        tramp.extend_from_slice(&(hook.va + INSN_SIZE).to_le_bytes());

        self.mem.write_phys(hook.buf_pa, &tramp)?;
        self.mem.write_phys(hook.pa, &jump.to_le_bytes())?;

        debug!(
            target: "hooks",
            "Redirected {:#x} to a {}-byte trampoline at {:#x}",
            hook.va,
            tramp.len(),
            hook.buf_va
        );
        Ok(())
    }
}
