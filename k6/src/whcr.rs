//! Write allocation through the write handling control register.
//!
//! Write allocation is enabled for all memory below a limit given in 4 MiB units.
//! The memory between 15 and 16 MiB can be excluded for boards that map ISA
//! devices there. The register comes in two layouts:
//!
//! ```text
//! early (K6, K6-2 up to stepping 7):  bits 7..1  limit, bit 0  15-16 MiB enable
//! CXT (later K6-2, K6-III, K6-2+):    bits 31..22 limit, bit 16 15-16 MiB enable
//! ```

use core::ops::RangeInclusive;

use bare_metal::msr::{MsrAccess, K6_WHCR};
use bare_metal::Bits;

use crate::cpu::CpuIdentity;

/// Granularity of the limit.
pub const LIMIT_UNIT_KB: u32 = 4 * 1024;

#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub enum WhcrLayout {
    Early,
    Cxt,
}

impl WhcrLayout {
    pub fn for_cpu(cpu: &CpuIdentity) -> WhcrLayout {
        match (cpu.model, cpu.stepping) {
            (8, stepping) if stepping >= 8 => WhcrLayout::Cxt,
            (9, _) | (0xD, _) => WhcrLayout::Cxt,
            _ => WhcrLayout::Early,
        }
    }

    fn limit_bits(&self) -> RangeInclusive<usize> {
        match self {
            WhcrLayout::Early => 1..=7,
            WhcrLayout::Cxt => 22..=31,
        }
    }

    fn hole_enable_bit(&self) -> usize {
        match self {
            WhcrLayout::Early => 0,
            WhcrLayout::Cxt => 16,
        }
    }

    fn max_units(&self) -> u32 {
        let bits = self.limit_bits();
        (1 << (bits.end() - bits.start() + 1)) - 1
    }

    /// Largest limit the layout can express.
    pub fn max_size_kb(&self) -> u32 {
        self.max_units() * LIMIT_UNIT_KB
    }
}

/// Write allocation settings.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub struct WriteAllocate {
    /// Memory below this limit is write allocated.
    pub size_kb: u32,
    /// Whether the board has a memory hole at 15-16 MiB, which keeps that range excluded.
    pub hole: bool,
}

pub fn encode(layout: WhcrLayout, config: &WriteAllocate) -> u64 {
    let mut units = config.size_kb / LIMIT_UNIT_KB;
    if units > layout.max_units() {
        warn!("[whcr] {} KB exceeds the write allocate limit, clamping to {} KB", config.size_kb, layout.max_size_kb());
        units = layout.max_units();
    }

    let mut value = 0_u32;
    value.set_bits(layout.limit_bits(), units);
    value.set_bit(layout.hole_enable_bit(), !config.hole);
    value as u64
}

pub fn decode(layout: WhcrLayout, value: u64) -> WriteAllocate {
    let value = value as u32;
    WriteAllocate {
        size_kb: value.get_bits(layout.limit_bits()) * LIMIT_UNIT_KB,
        hole: !value.get_bit(layout.hole_enable_bit()),
    }
}

pub fn read<M: MsrAccess + ?Sized>(msr: &mut M, layout: WhcrLayout) -> WriteAllocate {
    decode(layout, msr.read(K6_WHCR))
}

pub fn commit<M: MsrAccess + ?Sized>(msr: &mut M, layout: WhcrLayout, config: &WriteAllocate) {
    let value = encode(layout, config);
    debug!("[whcr] writing {:#010x} ({:?} layout)", value, layout);
    msr.write_cache_control(K6_WHCR, value);
}
