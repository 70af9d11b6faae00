//! # Store — Candidate Bit-Set Contract
//!
//! The sieve driver works against `PrimeStore`, implemented by the disk-paged
//! [`PagedBitSet`](crate::paged::PagedBitSet) and the fully resident
//! [`InMemoryBitSet`](crate::memory::InMemoryBitSet). Both track odd values
//! only: even values never consume a bit, `mark_composite` ignores them and
//! `is_prime` reports them as not prime.
//!
//! Operations take `&mut self` because a query on the paged variant may
//! fault a different pool into its cache slot.

use anyhow::Result;

use crate::config::Geometry;
use crate::gf2::Polynomial;

/// Sentinel returned by [`PrimeStore::find_next_prime`] when the space is exhausted.
pub const EXHAUSTED: Polynomial = 0;

/// Candidate bit set the sieve marks and scans.
///
/// Implementations keep one bit per odd value up to `geometry().bound`;
/// bits only ever go from set (candidate) to cleared (composite).
pub trait PrimeStore {
    /// Layout of the tracked space.
    fn geometry(&self) -> &Geometry;

    /// Clear the candidate bit for `value`. Even values are ignored; odd
    /// values above the bound are an error.
    fn mark_composite(&mut self, value: Polynomial) -> Result<()>;

    /// True if `value` is odd, within the bound, and not yet marked composite.
    fn is_prime(&mut self, value: Polynomial) -> Result<bool>;

    /// Smallest odd value strictly greater than `current` whose bit is still
    /// set, or [`EXHAUSTED`] when none remains within the bound.
    fn find_next_prime(&mut self, current: Polynomial) -> Result<Polynomial>;

    /// Write any buffered changes to backing storage.
    fn sync(&mut self) -> Result<()>;
}

/// Iterate every surviving prime in ascending order, starting with 2.
///
/// 2 is the only even irreducible polynomial and is never stored, so it is
/// yielded first whenever the bound admits it.
pub fn for_each_prime<S, F>(store: &mut S, mut visit: F) -> Result<u64>
where
    S: PrimeStore + ?Sized,
    F: FnMut(Polynomial) -> Result<()>,
{
    let mut count = 0;
    if store.geometry().bound >= 2 {
        visit(2)?;
        count += 1;
    }
    let mut prime = store.find_next_prime(2)?;
    while prime != EXHAUSTED {
        visit(prime)?;
        count += 1;
        prime = store.find_next_prime(prime)?;
    }
    Ok(count)
}
