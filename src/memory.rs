//! # Memory — Fully Resident Candidate Bit Set
//!
//! Drop-in replacement for the paged store when the whole bit space fits the
//! memory budget: one contiguous puddle array, no cache-fault protocol. The
//! bit layout matches the paged store exactly (bit k is the odd value 2k+1),
//! so both variants report identical primality for any bound.

use anyhow::{Context, Result};

use crate::config::Geometry;
use crate::gf2::Polynomial;
use crate::puddle::Puddle;
use crate::store::{PrimeStore, EXHAUSTED};

/// The whole candidate space as one resident puddle array.
pub struct InMemoryBitSet<P: Puddle> {
    geometry: Geometry,
    puddles: Vec<P>,
}

impl<P: Puddle> InMemoryBitSet<P> {
    /// Allocate the full space with every candidate presumed prime.
    pub fn new(geometry: Geometry) -> Result<Self> {
        debug_assert_eq!(geometry.puddle_bits, P::BITS);
        let len = usize::try_from(geometry.puddles)
            .context("bit space does not fit in the address space")?;
        Ok(InMemoryBitSet {
            geometry,
            puddles: vec![P::FULL; len],
        })
    }

    fn out_of_range(&self, value: Polynomial) -> anyhow::Error {
        anyhow::anyhow!(
            "value {:#x} is beyond the configured bound {:#x}",
            value,
            self.geometry.bound
        )
    }
}

impl<P: Puddle> PrimeStore for InMemoryBitSet<P> {
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn mark_composite(&mut self, value: Polynomial) -> Result<()> {
        if value & 1 == 0 {
            return Ok(());
        }
        let bit = self
            .geometry
            .bit_index(value)
            .ok_or_else(|| self.out_of_range(value))?;
        let loc = self.geometry.locate(bit);
        self.puddles[loc.puddle as usize].clear_bit(loc.offset);
        Ok(())
    }

    fn is_prime(&mut self, value: Polynomial) -> Result<bool> {
        Ok(match self.geometry.bit_index(value) {
            Some(bit) => {
                let loc = self.geometry.locate(bit);
                self.puddles[loc.puddle as usize].test_bit(loc.offset)
            }
            None => false,
        })
    }

    fn find_next_prime(&mut self, current: Polynomial) -> Result<Polynomial> {
        let start = Geometry::first_bit_after(current);
        if start >= self.geometry.bits {
            return Ok(EXHAUSTED);
        }
        let loc = self.geometry.locate(start);
        let first = loc.puddle as usize;

        let masked = self.puddles[first].mask_below(loc.offset);
        let found = if masked != P::EMPTY {
            Some((first, masked))
        } else {
            self.puddles[first + 1..]
                .iter()
                .position(|&word| word != P::EMPTY)
                .map(|skip| (first + 1 + skip, self.puddles[first + 1 + skip]))
        };

        Ok(match found {
            Some((puddle, word)) => {
                let bit = puddle as u64 * u64::from(P::BITS) + u64::from(word.lowest_set_bit());
                // padding bits past the last tracked value are never cleared
                if bit < self.geometry.bits {
                    Geometry::value_of(bit)
                } else {
                    EXHAUSTED
                }
            }
            None => EXHAUSTED,
        })
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}
