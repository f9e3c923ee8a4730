//! The memory type ranges requested for this run.
//!
//! Everything that wants a range (command line switches, frame buffer discovery)
//! goes through [`MtrrSet::add_region`], which validates the request against what
//! the hardware can express and keeps the list free of duplicates. The finished set
//! is read by the UWCCR writer and the chipset encoders.

use core::fmt;

use bare_metal::Alignable;
use thiserror::Error;

/// Number of memory type ranges of the K6-2 CXT and later.
pub const MTRR_COUNT: usize = 2;

/// The legacy VGA frame buffer at A0000-BFFFF.
pub const VGA_WINDOW: u32 = 0xA0000;

pub const MIN_SIZE_KB: u32 = 128;
pub const MAX_SIZE_KB: u32 = 4 * 1024 * 1024;
/// Ranges start on a 128 KiB boundary.
pub const OFFSET_ALIGNMENT: u32 = 128 * 1024;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MtrrError {
    #[error("cannot clear the memory type ranges and set them up at the same time")]
    ClearPending,
    #[error("ranges were already added, cannot clear them")]
    AlreadyConfigured,
    #[error("requested size of {0} KB is too big")]
    TooLarge(u32),
    #[error("requested size of {0} KB is too small (< 128 KB)")]
    TooSmall(u32),
    #[error("offset {0:#x} is not aligned on a 128 KB boundary")]
    Misaligned(u32),
    #[error("all memory type ranges are in use")]
    Full,
}

pub type Result<T> = core::result::Result<T, MtrrError>;

/// One hardware memory type range.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub struct MemoryTypeRange {
    pub offset: u32,
    pub size_kb: u32,
    pub write_combine: bool,
    pub uncacheable: bool,
    pub valid: bool,
}

impl MemoryTypeRange {
    /// A disabled range.
    pub const BLANK: MemoryTypeRange = MemoryTypeRange {
        offset: 0,
        size_kb: 0,
        write_combine: false,
        uncacheable: false,
        valid: false,
    };

    pub const fn new(offset: u32, size_kb: u32, write_combine: bool, uncacheable: bool) -> MemoryTypeRange {
        MemoryTypeRange { offset, size_kb, write_combine, uncacheable, valid: true }
    }

    /// Whether the range is unused, either explicitly or because it covers nothing.
    pub fn is_blank(&self) -> bool {
        !self.valid || self.offset == 0 || self.size_kb == 0
    }

    pub fn is_vga(&self) -> bool {
        self.offset == VGA_WINDOW
    }

    /// Whether the processor write combines the range. Uncacheable wins when both
    /// types are requested.
    pub fn is_write_combining(&self) -> bool {
        self.write_combine && !self.uncacheable
    }
}

impl fmt::Display for MemoryTypeRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.valid {
            return f.write_str("unconfigured");
        }
        write!(f, "{} KB @ {:08x}", self.size_kb, self.offset)?;
        if self.write_combine {
            f.write_str(" WC")?;
        }
        if self.uncacheable {
            f.write_str(" UC")?;
        }
        Ok(())
    }
}

/// Whether [`MtrrSet::add_region`] created a new range.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub enum Addition {
    Added,
    AlreadyKnown,
}

/// The memory type ranges to program, in the order they were added.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct MtrrSet {
    ranges: [MemoryTypeRange; MTRR_COUNT],
    count: usize,
    setup: bool,
    clear: bool,
}

impl MtrrSet {
    pub const fn new() -> MtrrSet {
        MtrrSet {
            ranges: [MemoryTypeRange::BLANK; MTRR_COUNT],
            count: 0,
            setup: false,
            clear: false,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_full(&self) -> bool {
        self.count >= MTRR_COUNT
    }

    /// Whether the hardware ranges are going to be reprogrammed.
    pub fn is_setup_requested(&self) -> bool {
        self.setup
    }

    pub fn is_clear_requested(&self) -> bool {
        self.clear
    }

    /// Reprogram the hardware even if nothing ends up being added.
    pub fn request_setup(&mut self) {
        self.setup = true;
    }

    /// All slots, including blank ones.
    pub fn ranges(&self) -> &[MemoryTypeRange; MTRR_COUNT] {
        &self.ranges
    }

    /// Whether a valid range starts at `offset`.
    pub fn is_known(&self, offset: u32) -> bool {
        self.ranges[..self.count.min(MTRR_COUNT)]
            .iter()
            .any(|r| r.valid && r.offset == offset)
    }

    /// Request a range of `size_kb` KiB at `offset`.
    ///
    /// Adding an offset that is already present succeeds without changing anything.
    pub fn add_region(&mut self, offset: u32, size_kb: u32, write_combine: bool, uncacheable: bool) -> Result<Addition> {
        if self.clear {
            return Err(MtrrError::ClearPending);
        }
        if size_kb > MAX_SIZE_KB {
            return Err(MtrrError::TooLarge(size_kb));
        }
        if size_kb < MIN_SIZE_KB {
            return Err(MtrrError::TooSmall(size_kb));
        }
        if !offset.is_aligned(OFFSET_ALIGNMENT) {
            return Err(MtrrError::Misaligned(offset));
        }
        if self.is_known(offset) {
            warn!("[mtrr] address {:#x} already known, ignoring", offset);
            return Ok(Addition::AlreadyKnown);
        }
        if self.is_full() {
            return Err(MtrrError::Full);
        }

        let range = MemoryTypeRange::new(offset, size_kb, write_combine, uncacheable);
        debug!("[mtrr] range {}: {}", self.count, range);
        self.ranges[self.count] = range;
        self.count += 1;
        self.setup = true;
        Ok(Addition::Added)
    }

    /// Disable every range. Must not be combined with [`add_region`](MtrrSet::add_region).
    pub fn clear(&mut self) -> Result<()> {
        if self.count > 0 && !self.clear {
            return Err(MtrrError::AlreadyConfigured);
        }
        self.ranges = [MemoryTypeRange::BLANK; MTRR_COUNT];
        self.count = MTRR_COUNT;
        self.clear = true;
        self.setup = true;
        Ok(())
    }

    /// The first write combining range outside the VGA window whose offset has no bits
    /// of `alignment_mask` set. Ranges that are also uncacheable don't count.
    pub fn find_first_writable_non_vga_region(&self, alignment_mask: u32) -> Option<&MemoryTypeRange> {
        for range in self.ranges.iter() {
            if !range.write_combine || range.is_vga() || range.is_blank() {
                continue;
            }
            if range.uncacheable {
                warn!("[mtrr] range at {:#010x} is uncacheable, not write combining it", range.offset);
                continue;
            }
            if (range.offset & alignment_mask) != 0 {
                warn!("[mtrr] offset {:#010x} not aligned to mask {:#x}, ignoring", range.offset, alignment_mask);
                continue;
            }
            return Some(range);
        }
        None
    }

    /// Whether write combining was requested for the VGA window.
    pub fn is_vga_write_combine_requested(&self) -> bool {
        self.ranges.iter()
            .any(|r| r.valid && r.is_write_combining() && r.size_kb != 0 && r.is_vga())
    }
}

impl Default for MtrrSet {
    fn default() -> MtrrSet {
        MtrrSet::new()
    }
}
