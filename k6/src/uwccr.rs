//! The UC/WC cacheability control register, which holds both memory type ranges of
//! the K6-2 CXT and later. Range 0 lives in the low half, range 1 in the high half:
//!
//! ```text
//!  31               17 16               2  1    0
//! +-------------------+------------------+----+----+
//! | base address      | size mask        | WC | UC |
//! +-------------------+------------------+----+----+
//! ```
//!
//! The mask has a bit for every 128 KiB size doubling that is *not* part of the range.

use bare_metal::msr::{MsrAccess, K6_UWCCR};
use bare_metal::Bits;

use crate::mtrr::{MemoryTypeRange, MtrrSet, MTRR_COUNT};

const TYPE_UC: usize = 0;
const TYPE_WC: usize = 1;
const MASK_BITS: u32 = 0x1_FFFC;
const BASE_MASK: u32 = 0xFFFE_0000;

/// Encode a single range into one half of the register. Blank ranges disable the half.
pub fn encode_range(range: &MemoryTypeRange) -> u32 {
    if !range.valid || !(range.write_combine || range.uncacheable) {
        return 0;
    }

    let requested = range.size_kb as u64 * 1024;
    let size = requested.next_power_of_two();
    if size != requested {
        warn!("[uwccr] {} KB is not a power of two, rounding up to {} KB", range.size_kb, size / 1024);
    }
    let mask = ((!(size - 1)) >> 15) as u32 & MASK_BITS;

    let mut half = 0_u32;
    half.set_bits(17..=31, range.offset >> 17);
    half.set_bits(2..=16, mask >> 2);
    if range.is_write_combining() {
        half.set_bit(TYPE_WC, true);
    } else {
        if range.write_combine {
            warn!("[uwccr] range at {:#010x} is both WC and UC, using UC", range.offset);
        }
        half.set_bit(TYPE_UC, true);
    }
    half
}

/// Decode one half of the register. A half without a memory type is disabled.
pub fn decode_range(half: u32) -> MemoryTypeRange {
    let uncacheable = half.get_bit(TYPE_UC);
    let write_combine = half.get_bit(TYPE_WC);
    if !uncacheable && !write_combine {
        return MemoryTypeRange::BLANK;
    }
    let size = (((!half & MASK_BITS) as u64) + 4) << 15;
    MemoryTypeRange::new(half & BASE_MASK, (size / 1024) as u32, write_combine, uncacheable)
}

/// The full register value for `set`.
pub fn encode(set: &MtrrSet) -> u64 {
    let ranges = set.ranges();
    (encode_range(&ranges[0]) as u64) | ((encode_range(&ranges[1]) as u64) << 32)
}

pub fn decode(value: u64) -> [MemoryTypeRange; MTRR_COUNT] {
    [decode_range(value as u32), decode_range((value >> 32) as u32)]
}

/// The ranges currently programmed into the processor.
pub fn read<M: MsrAccess + ?Sized>(msr: &mut M) -> [MemoryTypeRange; MTRR_COUNT] {
    decode(msr.read(K6_UWCCR))
}

/// Program `set` into the processor, replacing whatever was configured before.
pub fn commit<M: MsrAccess + ?Sized>(msr: &mut M, set: &MtrrSet) {
    let value = encode(set);
    debug!("[uwccr] writing {:#018x}", value);
    msr.write_cache_control(K6_UWCCR, value);
}
