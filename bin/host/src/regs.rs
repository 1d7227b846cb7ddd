//! Contains the [Registers] trait, the view of the trapping virtual CPU's register file.

/// Read access to the general purpose registers of the virtual CPU that raised a trap.
pub trait Registers {
    /// Returns the value of `x<index>`.
    fn xreg(&self, index: u8) -> u64;
}

/// A plain AArch64 register file, `x0` through `x30`.
impl Registers for [u64; 31] {
    fn xreg(&self, index: u8) -> u64 {
        self.get(index as usize).copied().unwrap_or_default()
    }
}
