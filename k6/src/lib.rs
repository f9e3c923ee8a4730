//! Programming of the AMD K6 family processor features: the two memory type ranges,
//! write allocation, write ordering, data prefetch, the caches and the clock
//! multiplier.
//!
//! Register images are computed from plain values by the `encode` functions of each
//! module and written through [`bare_metal::processor::Processor`], so they can be checked
//! without the hardware.

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;

pub mod cache;
pub mod cpu;
pub mod efer;
pub mod mtrr;
pub mod multiplier;
pub mod sysinfo;
pub mod uwccr;
pub mod whcr;

pub use self::cpu::{Capabilities, CpuError, CpuIdentity, CpuModel};
pub use self::mtrr::{Addition, MemoryTypeRange, MtrrError, MtrrSet};
pub use self::sysinfo::SysInfo;
