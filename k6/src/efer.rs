//! Write ordering and data prefetch controls in the K6 EFER.

use core::fmt;

use bare_metal::msr::{MsrAccess, K6_EFER};
use bare_metal::Bits;

const EWBEC_BITS: core::ops::RangeInclusive<usize> = 2..=3;
const DPE_BIT: usize = 1;

/// When the processor waits for earlier writes to complete before issuing the next one.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub enum WriteOrderMode {
    /// Strong ordering for all memory, slowest.
    All = 0,
    /// Ordering for everything except uncacheable and write combined memory.
    AllExceptUcWc = 1,
    /// No ordering at all, fastest.
    None = 2,
}

impl WriteOrderMode {
    pub fn from_index(index: u8) -> Option<WriteOrderMode> {
        match index {
            0 => Some(WriteOrderMode::All),
            1 => Some(WriteOrderMode::AllExceptUcWc),
            2 => Some(WriteOrderMode::None),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            WriteOrderMode::All => "All Memory Regions",
            WriteOrderMode::AllExceptUcWc => "All except Uncacheable/Write-Combined",
            WriteOrderMode::None => "No Memory Regions",
        }
    }
}

impl fmt::Display for WriteOrderMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}, {}", *self as u8, self.description())
    }
}

/// The write ordering mode encoded in `efer`. The fourth encoding is reserved.
pub fn write_order_mode(efer: u64) -> Option<WriteOrderMode> {
    WriteOrderMode::from_index(efer.get_bits(EWBEC_BITS) as u8)
}

pub fn is_data_prefetch_enabled(efer: u64) -> bool {
    efer.get_bit(DPE_BIT)
}

pub fn set_write_order_mode<M: MsrAccess + ?Sized>(msr: &mut M, mode: WriteOrderMode) {
    let mut efer = msr.read(K6_EFER);
    efer.set_bits(EWBEC_BITS, mode as u64);
    debug!("[efer] write order mode {}, writing {:#x}", mode as u8, efer);
    msr.write(K6_EFER, efer);
}

pub fn set_data_prefetch<M: MsrAccess + ?Sized>(msr: &mut M, enable: bool) {
    let mut efer = msr.read(K6_EFER);
    efer.set_bit(DPE_BIT, enable);
    debug!("[efer] data prefetch {}, writing {:#x}", if enable { "on" } else { "off" }, efer);
    msr.write(K6_EFER, efer);
}
