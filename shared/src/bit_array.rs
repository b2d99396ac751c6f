/// A single machine word viewed as an array of bits, least significant first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BitArray<T>(pub T);

macro_rules! impl_bitarray {
    ($($t: ty),*) => {
        $(
            impl BitArray<$t> {
                pub const BITS: usize = <$t>::BITS as usize;
                pub const FULL: Self = BitArray(<$t>::MAX);

                pub const fn get(&self, idx: usize) -> bool {
                    (self.0 >> idx & 1) != 0
                }

                pub const fn with(self, value: bool, idx: usize) -> Self {
                    let bit = 1 << idx;
                    if value {
                        BitArray(self.0 | bit)
                    } else {
                        BitArray(self.0 & !bit)
                    }
                }

                /// Index of the lowest clear bit, if any.
                pub const fn first_clear(&self) -> Option<usize> {
                    if self.0 == <$t>::MAX {
                        None
                    } else {
                        Some((!self.0).trailing_zeros() as usize)
                    }
                }

                pub const fn count_set(&self) -> usize {
                    self.0.count_ones() as usize
                }

                pub const fn load(self) -> $t { self.0 }
            }
        )*
    };
}

impl_bitarray!(u8, u16, u32, u64);
