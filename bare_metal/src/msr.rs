//! Model specific registers.

use core::arch::asm;

/// Extended feature enable register. On the K6 family it also carries the
/// data prefetch and write ordering controls.
pub const K6_EFER: Msr = Msr(0xC000_0080);
/// K6 write handling control register (write allocate).
pub const K6_WHCR: Msr = Msr(0xC000_0082);
/// K6 UC/WC cacheability control register, holding both memory type ranges.
pub const K6_UWCCR: Msr = Msr(0xC000_0085);
/// Enhanced power management register of the K6-2+/III+, maps the power
/// management I/O block.
pub const K6_EPMR: Msr = Msr(0xC000_0086);

/// A model-specific register.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct Msr(pub u32);

impl Msr {
    /// Read the value of a model specific register
    #[inline(always)]
    pub unsafe fn read(&self) -> u64 {
        let lo: u32;
        let hi: u32;
        asm!("rdmsr", in("ecx") self.0, out("eax") lo, out("edx") hi, options(nomem, nostack, preserves_flags));
        (lo as u64) | ((hi as u64) << 32)
    }

    /// Write the value of a model specific register
    #[inline(always)]
    pub unsafe fn write(&self, val: u64) {
        let lo = (val & 0xFFFFFFFF) as u32;
        let hi = ((val >> 32) & 0xFFFFFFFF) as u32;
        asm!("wrmsr", in("ecx") self.0, in("eax") lo, in("edx") hi, options(nostack, preserves_flags));
    }
}

/// Access to model specific registers.
///
/// Code that programs registers goes through this trait instead of calling
/// `rdmsr`/`wrmsr` directly, so it can run against a recording double in tests.
pub trait MsrAccess {
    fn read(&mut self, msr: Msr) -> u64;
    fn write(&mut self, msr: Msr, value: u64);

    /// Write a register that changes the cacheability of memory. The caches must be
    /// written back before and after the change, with interrupts disabled in between.
    fn write_cache_control(&mut self, msr: Msr, value: u64) {
        self.write(msr, value)
    }
}
