//! # Puddle — Machine-Word Bit Storage
//!
//! A puddle is one machine word of candidate bits, the atomic unit that the
//! bit sets mutate and the unit pools are made of. Both bit-set variants are
//! generic over the word type so the 32- and 64-bit layouts share one code
//! path; the width is picked at runtime from the configuration and dispatched
//! once in the CLI.
//!
//! Page files are raw native-endian dumps of puddle arrays, so the encoding
//! here is `to_ne_bytes` / `from_ne_bytes` with no header.

use std::fmt::Debug;

/// One machine word of candidate bits, implemented for `u32` and `u64`.
pub trait Puddle: Copy + Eq + Debug + Send + Sync + 'static {
    /// Bits per puddle.
    const BITS: u32;
    /// Bytes per puddle on disk.
    const BYTES: usize;
    /// Every candidate still presumed prime.
    const FULL: Self;
    /// No candidates left.
    const EMPTY: Self;

    /// Clear the bit at `offset`.
    fn clear_bit(&mut self, offset: u32);

    /// True if the bit at `offset` is set.
    fn test_bit(self, offset: u32) -> bool;

    /// The word with every bit below `offset` cleared.
    fn mask_below(self, offset: u32) -> Self;

    /// Index of the lowest set bit. Undefined meaning for `EMPTY`.
    fn lowest_set_bit(self) -> u32;

    fn write_ne(self, out: &mut [u8]);

    fn read_ne(bytes: &[u8]) -> Self;
}

macro_rules! impl_puddle {
    ($word:ty) => {
        impl Puddle for $word {
            const BITS: u32 = <$word>::BITS;
            const BYTES: usize = std::mem::size_of::<$word>();
            const FULL: Self = <$word>::MAX;
            const EMPTY: Self = 0;

            #[inline]
            fn clear_bit(&mut self, offset: u32) {
                *self &= !(1 << offset);
            }

            #[inline]
            fn test_bit(self, offset: u32) -> bool {
                self & (1 << offset) != 0
            }

            #[inline]
            fn mask_below(self, offset: u32) -> Self {
                self & (<$word>::MAX << offset)
            }

            #[inline]
            fn lowest_set_bit(self) -> u32 {
                self.trailing_zeros()
            }

            #[inline]
            fn write_ne(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_ne_bytes());
            }

            #[inline]
            fn read_ne(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$word>()];
                raw.copy_from_slice(bytes);
                <$word>::from_ne_bytes(raw)
            }
        }
    };
}

impl_puddle!(u32);
impl_puddle!(u64);

/// Serialize a puddle slice into `out`, which must hold exactly `puddles.len() * P::BYTES` bytes.
pub fn encode<P: Puddle>(puddles: &[P], out: &mut [u8]) {
    debug_assert_eq!(out.len(), puddles.len() * P::BYTES);
    for (puddle, chunk) in puddles.iter().zip(out.chunks_exact_mut(P::BYTES)) {
        puddle.write_ne(chunk);
    }
}

/// Inverse of [`encode`].
pub fn decode<P: Puddle>(bytes: &[u8], puddles: &mut [P]) {
    debug_assert_eq!(bytes.len(), puddles.len() * P::BYTES);
    for (puddle, chunk) in puddles.iter_mut().zip(bytes.chunks_exact(P::BYTES)) {
        *puddle = P::read_ne(chunk);
    }
}
