/// Something (usually addresses or sizes) that is alignable to a certain alignment
/// represented in the same type and usually a power of two.
pub trait Alignable {
    type Alignment;

    /// Return whether the value is a multiple of `alignment`.
    /// Everything is aligned to an alignment of zero.
    fn is_aligned(self, alignment: Self::Alignment) -> bool;
}

macro_rules! impl_Alignable {
    ($numtype:ty) => {
        impl Alignable for $numtype {
            type Alignment = $numtype;

            fn is_aligned(self, alignment: Self) -> bool {
                if alignment == 0 {
                    true
                } else {
                    let mask = alignment - 1;
                    assert!(alignment & mask == 0, "alignment must be power of two");
                    self & mask == 0
                }
            }
        }
    };
}

impl_Alignable!(usize);
impl_Alignable!(u64);
impl_Alignable!(u32);
impl_Alignable!(u16);
impl_Alignable!(u8);
