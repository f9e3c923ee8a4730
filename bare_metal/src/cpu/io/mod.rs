//! Provides primitive operations for working with the CPUs I/O ports

use core::arch::asm;
use core::ops;

pub mod com;

/// A CPU I/O port number.
#[derive(Debug, Eq, PartialEq, Copy, Clone, PartialOrd, Ord)]
pub struct PortNumber(pub u16);

impl ops::Add<u16> for PortNumber {
    type Output = PortNumber;

    fn add(self, offset: u16) -> PortNumber {
        PortNumber(self.0 + offset)
    }
}

// unsafe primitives

#[inline]
pub unsafe fn outb(port: PortNumber, data: u8) {
    asm!("out dx, al", in("dx") port.0, in("al") data, options(nomem, nostack, preserves_flags));
}

#[inline]
pub unsafe fn inb(port: PortNumber) -> u8 {
    let data: u8;
    asm!("in al, dx", out("al") data, in("dx") port.0, options(nomem, nostack, preserves_flags));
    data
}

#[inline]
pub unsafe fn outw(port: PortNumber, data: u16) {
    asm!("out dx, ax", in("dx") port.0, in("ax") data, options(nomem, nostack, preserves_flags));
}

#[inline]
pub unsafe fn inw(port: PortNumber) -> u16 {
    let data: u16;
    asm!("in ax, dx", out("ax") data, in("dx") port.0, options(nomem, nostack, preserves_flags));
    data
}

#[inline]
pub unsafe fn outl(port: PortNumber, data: u32) {
    asm!("out dx, eax", in("dx") port.0, in("eax") data, options(nomem, nostack, preserves_flags));
}

#[inline]
pub unsafe fn inl(port: PortNumber) -> u32 {
    let data: u32;
    asm!("in eax, dx", out("eax") data, in("dx") port.0, options(nomem, nostack, preserves_flags));
    data
}
