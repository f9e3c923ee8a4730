//! Primitive, mostly unsafe building blocks for talking to the processor directly:
//! I/O ports, model specific registers, `cpuid` and cache control, plus the bit and
//! alignment helpers used when packing register images. [`processor`] bundles the
//! parts configuration code is allowed to change.

#![cfg_attr(not(test), no_std)]

mod align;
mod bits;

pub mod cpu;
pub mod msr;
pub mod processor;

pub use self::align::*;
pub use self::bits::*;
