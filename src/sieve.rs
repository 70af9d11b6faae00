//! # Sieve — Eratosthenes over GF(2)[x]
//!
//! Drives a [`PrimeStore`] through the sieve and streams every irreducible
//! polynomial up to the bound, in ascending order, to a caller-supplied sink.
//!
//! ## State Machine
//!
//! - **Seeding**: mark 1 composite (0 is even and untracked), start at
//!   p = 2, the polynomial x. On resume, replay the primes already settled.
//! - **Marking(p)**: mark p·q composite for every odd cofactor q ≥ p whose
//!   product can still fall within the bound, then emit p. The first prime
//!   whose square exceeds the bound's degree has nothing left to mark; it is
//!   still emitted here and ends the marking phase.
//! - **Advancing(p)**: ask the store for the next surviving candidate.
//! - **Draining(p)**: every candidate after the cutoff prime is emitted
//!   without marking.
//! - **Done**: the store is exhausted.
//!
//! ## Degree Cutoff
//!
//! Carryless products are not monotonic in the cofactor (3·5 = 15 but
//! 3·7 = 9), so the loops are bounded by degree: bit_length(p·q) is exactly
//! bit_length(p) + bit_length(q) − 1. Cofactors run while that stays within
//! the bound's bit length, and products above the bound are skipped. For a
//! bound of the form 2^n − 1 this is the same as stopping at the first
//! product above the bound.
//!
//! Only odd cofactors are tried: an even cofactor gives an even product,
//! which the store does not track. Each product is recomputed with a full
//! carryless multiply.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::checkpoint::{self, Manifest};
use crate::gf2::{self, Polynomial};
use crate::progress::{Phase, Progress};
use crate::store::{PrimeStore, EXHAUSTED};

/// One prime emitted by the sieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discovery {
    pub value: Polynomial,
    /// `Marking` for primes reached by the marking loop (including the one
    /// that ended it), `Draining` for primes collected after the cutoff.
    pub phase: Phase,
}

/// Counters reported when a run finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SieveSummary {
    /// Primes emitted by the marking loop (including replayed ones).
    pub sieved: u64,
    /// Primes collected after the cutoff.
    pub drained: u64,
    /// Composite marks issued.
    pub marked: u64,
    /// Largest prime the marking loop has finished with.
    pub last_sieved: Polynomial,
}

impl SieveSummary {
    pub fn primes(&self) -> u64 {
        self.sieved + self.drained
    }
}

/// Periodic manifest updates for paged runs.
pub struct CheckpointPolicy {
    pub path: PathBuf,
    pub manifest: Manifest,
    pub interval: Duration,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Seeding,
    Marking(Polynomial),
    Advancing(Polynomial),
    Draining(Polynomial),
    Done,
}

/// Runs the sieve over a borrowed store.
///
/// The driver owns no bits itself: every mark and scan goes through the
/// [`PrimeStore`], so the same loop serves the paged and in-memory variants.
/// Progress is published through a shared [`Progress`] for a monitor thread.
pub struct SieveDriver<'a, S: PrimeStore + ?Sized> {
    store: &'a mut S,
    progress: Arc<Progress>,
    resume_after: Polynomial,
    checkpoint: Option<CheckpointPolicy>,
}

impl<'a, S: PrimeStore + ?Sized> SieveDriver<'a, S> {
    pub fn new(store: &'a mut S, progress: Arc<Progress>) -> Self {
        SieveDriver {
            store,
            progress,
            resume_after: 0,
            checkpoint: None,
        }
    }

    /// Treat every prime up to `last_prime` as already marked on the store.
    pub fn resume_after(mut self, last_prime: Polynomial) -> Self {
        self.resume_after = last_prime;
        self
    }

    /// Save the manifest after a marking pass once `policy.interval` has
    /// elapsed, and again when the run completes.
    pub fn with_checkpoints(mut self, policy: CheckpointPolicy) -> Self {
        self.checkpoint = Some(policy);
        self
    }

    /// Shared progress state, for handing to a monitor.
    pub fn progress(&self) -> Arc<Progress> {
        Arc::clone(&self.progress)
    }

    /// Run to completion, passing each prime to `emit` in ascending order.
    pub fn run<F>(&mut self, mut emit: F) -> Result<SieveSummary>
    where
        F: FnMut(Discovery) -> Result<()>,
    {
        let bound = self.store.geometry().bound;
        let bound_len = gf2::bit_length(bound);
        let mut summary = SieveSummary::default();
        let mut last_checkpoint = Instant::now();
        let mut state = State::Seeding;

        loop {
            state = match state {
                State::Seeding => {
                    self.store.mark_composite(0)?;
                    self.store.mark_composite(1)?;
                    if self.resume_after >= 2 {
                        self.replay(&mut emit, &mut summary)?;
                        State::Advancing(summary.last_sieved)
                    } else {
                        State::Marking(2)
                    }
                }
                State::Marking(prime) => {
                    self.progress.set_phase(Phase::Marking);
                    self.progress.set_prime(prime);
                    if !past_cutoff(prime, bound_len) {
                        summary.marked += self.mark_multiples(prime, bound, bound_len)?;
                    }
                    emit(Discovery {
                        value: prime,
                        phase: Phase::Marking,
                    })?;
                    summary.sieved += 1;
                    summary.last_sieved = prime;
                    if last_checkpoint.elapsed() >= self.checkpoint_interval() {
                        self.save_checkpoint(prime, false)?;
                        last_checkpoint = Instant::now();
                    }
                    State::Advancing(prime)
                }
                State::Advancing(prime) => match self.store.find_next_prime(prime)? {
                    EXHAUSTED => State::Done,
                    next if past_cutoff(prime, bound_len) => State::Draining(next),
                    next => State::Marking(next),
                },
                State::Draining(prime) => {
                    self.progress.set_phase(Phase::Draining);
                    self.progress.set_prime(prime);
                    emit(Discovery {
                        value: prime,
                        phase: Phase::Draining,
                    })?;
                    summary.drained += 1;
                    match self.store.find_next_prime(prime)? {
                        EXHAUSTED => State::Done,
                        next => State::Draining(next),
                    }
                }
                State::Done => break,
            };
        }

        self.store.sync()?;
        self.save_checkpoint(summary.last_sieved, true)?;
        info!(
            sieved = summary.sieved,
            drained = summary.drained,
            marked = summary.marked,
            bound = format_args!("{:#x}", bound),
            "sieve complete"
        );
        Ok(summary)
    }

    /// Mark every multiple `prime * q` (odd q ≥ prime) that lies within the bound.
    fn mark_multiples(&mut self, prime: Polynomial, bound: Polynomial, bound_len: u32) -> Result<u64> {
        // products of the even prime x are even and untracked
        if prime & 1 == 0 {
            return Ok(0);
        }
        let cofactor_len = bound_len + 1 - gf2::bit_length(prime);
        let cofactor_end: Polynomial = 1 << cofactor_len;

        let mut marked = 0;
        let mut cofactor = prime;
        while cofactor < cofactor_end {
            let product = gf2::multiply(prime, cofactor);
            if product <= bound {
                self.store.mark_composite(product)?;
                marked += 1;
            }
            cofactor += 2;
            self.progress.set_cofactor(cofactor);
        }
        Ok(marked)
    }

    /// Re-emit 2 and every stored prime up to the resume point.
    fn replay<F>(&mut self, emit: &mut F, summary: &mut SieveSummary) -> Result<()>
    where
        F: FnMut(Discovery) -> Result<()>,
    {
        self.progress.set_phase(Phase::Marking);
        let mut prime = 2;
        while prime != EXHAUSTED && prime <= self.resume_after {
            self.progress.set_prime(prime);
            emit(Discovery {
                value: prime,
                phase: Phase::Marking,
            })?;
            summary.sieved += 1;
            summary.last_sieved = prime;
            prime = self.store.find_next_prime(prime)?;
        }
        info!(
            replayed = summary.sieved,
            resume_after = format_args!("{:#x}", self.resume_after),
            "resumed from checkpoint"
        );
        Ok(())
    }

    fn checkpoint_interval(&self) -> Duration {
        self.checkpoint
            .as_ref()
            .map_or(Duration::MAX, |policy| policy.interval)
    }

    /// Flush the store, then record `last_prime` as settled.
    fn save_checkpoint(&mut self, last_prime: Polynomial, complete: bool) -> Result<()> {
        let Some(policy) = self.checkpoint.as_mut() else {
            return Ok(());
        };
        self.store.sync()?;
        policy.manifest.last_prime = last_prime;
        policy.manifest.complete = complete;
        policy.manifest.updated_at = chrono::Utc::now();
        checkpoint::save(&policy.path, &policy.manifest)?;
        info!(
            last_prime = format_args!("{:#x}", last_prime),
            complete,
            "checkpoint saved"
        );
        Ok(())
    }
}

/// True once `prime · prime` has more bits than the bound, so no multiple of
/// `prime` or of any larger prime is left to mark.
fn past_cutoff(prime: Polynomial, bound_len: u32) -> bool {
    2 * gf2::bit_length(prime) - 1 > bound_len
}

/// Sieve `store` from scratch and collect every prime.
pub fn collect_primes<S: PrimeStore + ?Sized>(store: &mut S) -> Result<Vec<Polynomial>> {
    let bound = store.geometry().bound;
    let mut primes = Vec::new();
    SieveDriver::new(store, Progress::new(bound)).run(|d| {
        primes.push(d.value);
        Ok(())
    })?;
    Ok(primes)
}
