//! Switching the caches on and off.
//!
//! The L1 cache is controlled by CR0 like on every x86 since the 486. The on-die L2
//! cache of the K6-III and K6-2+/III+ has a disable bit in the K6 EFER.

use bare_metal::cpu::{CR0_CD, CR0_NW};
use bare_metal::msr::{MsrAccess, K6_EFER};
use bare_metal::processor::ControlAccess;
use bare_metal::Bits;

const L2D_BIT: usize = 4;

pub fn is_l1_enabled<C: ControlAccess + ?Sized>(cpu: &mut C) -> bool {
    cpu.read_cr0() & CR0_CD == 0
}

/// Enabling also returns to write-back operation.
pub fn set_l1<C: ControlAccess + ?Sized>(cpu: &mut C, enable: bool) {
    let cr0 = cpu.read_cr0() & !CR0_NW;
    let cr0 = if enable { cr0 & !CR0_CD } else { cr0 | CR0_CD };
    debug!("[cache] L1 {}, writing CR0 {:#010x}", if enable { "on" } else { "off" }, cr0);
    cpu.write_cr0(cr0);
}

pub fn is_l2_enabled(efer: u64) -> bool {
    !efer.get_bit(L2D_BIT)
}

/// Only valid on processors with an on-die L2 cache.
pub fn set_l2<M: MsrAccess + ?Sized>(msr: &mut M, enable: bool) {
    let mut efer = msr.read(K6_EFER);
    efer.set_bit(L2D_BIT, !enable);
    debug!("[cache] L2 {}, writing EFER {:#x}", if enable { "on" } else { "off" }, efer);
    msr.write_cache_control(K6_EFER, efer);
}
