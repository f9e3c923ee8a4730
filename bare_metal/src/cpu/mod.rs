use core::arch::asm;

#[cfg(target_arch = "x86")]
use core::arch::x86::__cpuid;
#[cfg(target_arch = "x86_64")]
use core::arch::x86_64::__cpuid;

pub mod io;

/// Pause the CPU until the next interrupt arrives.
#[inline]
pub unsafe fn hlt() {
    asm!("hlt", options(nomem, nostack));
}

/// Pause the CPU indefintely. Interrupts may still arrive,
/// depending on the interrupt flags of the CPU.
#[inline]
pub unsafe fn hang() -> ! {
    loop {
        hlt();
    }
}

/// Execute the cpuid instruction after setting eax to the given query.
/// Returns `(eax, ebx, ecx, edx)`.
#[inline]
#[allow(unused_unsafe)]
pub fn cpuid(eax: u32) -> (u32, u32, u32, u32) {
    let r = unsafe { __cpuid(eax) };
    (r.eax, r.ebx, r.ecx, r.edx)
}

/// Write back and invalidate all caches.
#[inline]
pub unsafe fn wbinvd() {
    asm!("wbinvd", options(nostack, preserves_flags));
}

/// CR0 not-write-through bit.
pub const CR0_NW: usize = 1 << 29;
/// CR0 cache disable bit.
pub const CR0_CD: usize = 1 << 30;

#[inline]
pub unsafe fn read_cr0() -> usize {
    let value: usize;
    asm!("mov {}, cr0", out(reg) value, options(nomem, nostack, preserves_flags));
    value
}

#[inline]
pub unsafe fn write_cr0(value: usize) {
    asm!("mov cr0, {}", in(reg) value, options(nostack, preserves_flags));
}

/// Keeps maskable interrupts disabled while alive and restores the previous
/// interrupt flag when dropped.
pub struct InterruptGuard {
    was_enabled: bool,
}

impl InterruptGuard {
    const IF_FLAG: usize = 1 << 9;

    /// Disable interrupts. Unsafe because it must only be used at a privilege level
    /// where `cli` is allowed.
    #[inline]
    pub unsafe fn new() -> InterruptGuard {
        let flags: usize;
        asm!("pushf", "pop {}", "cli", out(reg) flags, options(nomem));
        InterruptGuard {
            was_enabled: flags & Self::IF_FLAG != 0,
        }
    }
}

impl Drop for InterruptGuard {
    #[inline]
    fn drop(&mut self) {
        if self.was_enabled {
            unsafe {
                asm!("sti", options(nomem, nostack));
            }
        }
    }
}
