//! Fields of register images, addressed by bit index.

use core::ops::{Bound, RangeBounds};

/// A contiguous run of bits, resolved against the width of the register it applies to.
pub trait BitRange {
    /// Shift and length of the field in a `width` bit register.
    fn resolve(&self, width: u32) -> (u32, u32);
}

impl<R: RangeBounds<usize>> BitRange for R {
    fn resolve(&self, width: u32) -> (u32, u32) {
        let low = match self.start_bound() {
            Bound::Included(&start) => start as u32,
            Bound::Excluded(&start) => start as u32 + 1,
            Bound::Unbounded => 0,
        };
        let end = match self.end_bound() {
            Bound::Included(&last) => last as u32 + 1,
            Bound::Excluded(&end) => end as u32,
            Bound::Unbounded => width,
        };
        debug_assert!(low < end && end <= width, "bits {}..{} outside a {} bit register", low, end, width);
        (low, end - low)
    }
}

/// Bit level access to register images.
pub trait Bits: Sized {
    fn get_bit(&self, index: usize) -> bool;
    fn set_bit(&mut self, index: usize, value: bool);

    /// The field at `range`, shifted down to bit 0.
    fn get_bits<R: BitRange>(&self, range: R) -> Self;
    /// Store the low bits of `value` in the field at `range`. Bits of `value` that don't
    /// fit are dropped.
    fn set_bits<R: BitRange>(&mut self, range: R, value: Self);
}

macro_rules! register_bits {
    ($($reg:ty)*) => {$(
        impl Bits for $reg {
            #[inline]
            fn get_bit(&self, index: usize) -> bool {
                (*self >> index) & 1 == 1
            }

            #[inline]
            fn set_bit(&mut self, index: usize, value: bool) {
                let bit: $reg = 1 << index;
                *self = if value { *self | bit } else { *self & !bit };
            }

            #[inline]
            fn get_bits<R: BitRange>(&self, range: R) -> Self {
                let (shift, len) = range.resolve(<$reg>::BITS);
                (*self >> shift) & <$reg>::MAX >> (<$reg>::BITS - len)
            }

            #[inline]
            fn set_bits<R: BitRange>(&mut self, range: R, value: Self) {
                let (shift, len) = range.resolve(<$reg>::BITS);
                let field = <$reg>::MAX >> (<$reg>::BITS - len);
                *self = (*self & !(field << shift)) | ((value & field) << shift);
            }
        }
    )*};
}

register_bits!(u8 u16 u32 u64);
