//! # Progress — Shared Sieve Progress and Background Monitor
//!
//! The sieve thread publishes its current prime, cofactor and phase through
//! relaxed atomics; the monitor thread reads them without any ordering
//! guarantee. A reader may see a prime from one step and a cofactor from the
//! next. Both only grow within a phase, so a torn read shows a slightly stale
//! line, never a wrong direction, and nothing in the sieve depends on it.
//!
//! ## Monitor
//!
//! `start_monitor` spawns a thread that logs one status line per interval
//! (elapsed HH:MM:SS, prime, cofactor, phase, fraction). `finish` sets the
//! completion flag and wakes the monitor through a condvar, so it emits a
//! final line and exits without waiting out the interval.
//!
//! ## Completion Fraction
//!
//! While marking, the fraction is the current prime against the first value
//! too large to mark (degree above half the bound's degree). While draining,
//! it is the current prime against the bound itself.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

use crate::gf2::{self, Polynomial};

/// Default time between status lines.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Seeding = 0,
    Marking = 1,
    Draining = 2,
    Done = 3,
}

impl Phase {
    fn from_u8(raw: u8) -> Phase {
        match raw {
            0 => Phase::Seeding,
            1 => Phase::Marking,
            2 => Phase::Draining,
            _ => Phase::Done,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Seeding => "seeding",
            Phase::Marking => "marking",
            Phase::Draining => "draining",
            Phase::Done => "done",
        }
    }
}

/// Smallest prime whose multiples can no longer fall within `bound`.
pub fn marking_limit(bound: Polynomial) -> Polynomial {
    1 << ((gf2::bit_length(bound) + 1) / 2)
}

/// One consistent-enough reading of the shared state.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    pub elapsed: Duration,
    pub prime: Polynomial,
    pub cofactor: Polynomial,
    pub phase: Phase,
    pub fraction: f64,
}

/// Shared sieve progress: written by the driver, read by the monitor.
///
/// Scalars are relaxed atomics, so a reader may see a prime and cofactor
/// from different instants. Completion goes through a mutex and condvar so
/// the monitor can sleep until the next report and still wake on `finish`.
pub struct Progress {
    prime: AtomicU64,
    cofactor: AtomicU64,
    phase: AtomicU8,
    bound: Polynomial,
    start: Instant,
    done: Mutex<bool>,
    wake: Condvar,
}

impl Progress {
    pub fn new(bound: Polynomial) -> Arc<Self> {
        Arc::new(Progress {
            prime: AtomicU64::new(0),
            cofactor: AtomicU64::new(0),
            phase: AtomicU8::new(Phase::Seeding as u8),
            bound,
            start: Instant::now(),
            done: Mutex::new(false),
            wake: Condvar::new(),
        })
    }

    pub fn set_prime(&self, prime: Polynomial) {
        self.prime.store(prime, Ordering::Relaxed);
        self.cofactor.store(prime, Ordering::Relaxed);
    }

    pub fn set_cofactor(&self, cofactor: Polynomial) {
        self.cofactor.store(cofactor, Ordering::Relaxed);
    }

    pub fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        let prime = self.prime.load(Ordering::Relaxed);
        let cofactor = self.cofactor.load(Ordering::Relaxed);
        let phase = Phase::from_u8(self.phase.load(Ordering::Relaxed));
        let fraction = match phase {
            Phase::Seeding => 0.0,
            Phase::Marking => prime as f64 / marking_limit(self.bound) as f64,
            Phase::Draining => prime as f64 / self.bound as f64,
            Phase::Done => 1.0,
        };
        Snapshot {
            elapsed: self.start.elapsed(),
            prime,
            cofactor,
            phase,
            fraction: fraction.clamp(0.0, 1.0),
        }
    }

    pub fn print_status(&self) {
        let snap = self.snapshot();
        let secs = snap.elapsed.as_secs();
        info!(
            elapsed = format_args!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60),
            prime = format_args!("{:x}", snap.prime),
            cofactor = format_args!("{:x}", snap.cofactor),
            phase = snap.phase.as_str(),
            fraction = format_args!("{:.6}", snap.fraction),
            "sieve progress"
        );
    }

    /// Signal completion and wake the monitor. Idempotent.
    pub fn finish(&self) {
        self.set_phase(Phase::Done);
        let mut done = self.done.lock().unwrap_or_else(|e| e.into_inner());
        *done = true;
        self.wake.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        *self.done.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block for up to `timeout`, returning early once finished. Returns the flag.
    fn wait(&self, timeout: Duration) -> bool {
        let done = self.done.lock().unwrap_or_else(|e| e.into_inner());
        let (done, _) = self
            .wake
            .wait_timeout_while(done, timeout, |finished| !*finished)
            .unwrap_or_else(|e| e.into_inner());
        *done
    }

    /// Spawn the monitor thread. Join it after calling [`finish`](Self::finish).
    pub fn start_monitor(self: &Arc<Self>, interval: Duration) -> thread::JoinHandle<()> {
        let progress = Arc::clone(self);
        thread::spawn(move || loop {
            let finished = progress.wait(interval);
            progress.print_status();
            if finished {
                break;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    //! # Progress Tests
    //!
    //! Validates initial state, the per-phase completion fraction, and the
    //! monitor thread's lifecycle.
    //!
    //! ## Thread Model
    //!
    //! One writer (the sieve) updates relaxed atomics; one reader (the
    //! monitor) snapshots them. Stale reads are acceptable, torn ones are
    //! impossible on `AtomicU64`. The monitor must exit as soon as `finish`
    //! is called, not at its next scheduled wake, or a one-hour report
    //! interval would delay process exit by up to an hour.

    use super::*;

    // ── State and Fraction ──────────────────────────────────────────

    /// A fresh tracker is seeding with nothing done.
    #[test]
    fn starts_seeding_at_zero() {
        let p = Progress::new(0xff);
        let snap = p.snapshot();
        assert_eq!(snap.prime, 0);
        assert_eq!(snap.cofactor, 0);
        assert_eq!(snap.phase, Phase::Seeding);
        assert_eq!(snap.fraction, 0.0);
        assert!(!p.is_finished());
    }

    /// Marking stops at the first prime whose square outgrows the bound.
    /// For 64-bit bounds that is 2^32, the limit the fraction divides by.
    #[test]
    fn marking_limit_tracks_half_degree() {
        // x^4 squared has degree 8 > 7
        assert_eq!(marking_limit(0xff), 0x10);
        assert_eq!(marking_limit(0x1ff), 0x20);
        assert_eq!(marking_limit(u64::MAX), 1 << 32);
    }

    /// Each new prime restarts its cofactor at the prime itself, so a stale
    /// cofactor from the previous pass is never reported.
    #[test]
    fn set_prime_resets_cofactor() {
        let p = Progress::new(0xff);
        p.set_prime(7);
        p.set_cofactor(0x1d);
        assert_eq!(p.snapshot().cofactor, 0x1d);
        p.set_prime(0xb);
        assert_eq!(p.snapshot().cofactor, 0xb);
    }

    /// Marking measures against the marking limit (0x10 for bound 0xff),
    /// draining against the bound; both clamp to 1, and `finish` pins the
    /// fraction at 1.
    #[test]
    fn fraction_per_phase() {
        let p = Progress::new(0xff);
        p.set_phase(Phase::Marking);
        p.set_prime(8);
        assert!((p.snapshot().fraction - 0.5).abs() < 1e-9);

        p.set_phase(Phase::Draining);
        p.set_prime(0x7f);
        let f = p.snapshot().fraction;
        assert!(f > 0.49 && f < 0.5);

        p.set_prime(0x1000);
        assert_eq!(p.snapshot().fraction, 1.0);

        p.finish();
        assert_eq!(p.snapshot().phase, Phase::Done);
        assert_eq!(p.snapshot().fraction, 1.0);
    }

    // ── Monitor Thread ──────────────────────────────────────────────

    /// The driver may finish on both the success and error paths.
    #[test]
    fn finish_is_idempotent() {
        let p = Progress::new(0xff);
        p.finish();
        p.finish();
        assert!(p.is_finished());
    }

    /// With an hour-long interval, `finish` still wakes the monitor at once.
    #[test]
    fn monitor_exits_promptly_on_finish() {
        let p = Progress::new(0xffff);
        let handle = p.start_monitor(Duration::from_secs(3600));
        thread::sleep(Duration::from_millis(20));
        let begin = Instant::now();
        p.finish();
        handle.join().unwrap();
        assert!(begin.elapsed() < Duration::from_secs(5));
    }

    /// Several reports fire while primes advance; the thread still joins.
    #[test]
    fn monitor_reports_on_short_interval() {
        let p = Progress::new(0xffff);
        p.set_phase(Phase::Marking);
        let handle = p.start_monitor(Duration::from_millis(5));
        for prime in [3u64, 7, 0xb, 0xd] {
            p.set_prime(prime);
            thread::sleep(Duration::from_millis(10));
        }
        p.finish();
        handle.join().unwrap();
    }

    /// A single writer storing increasing primes is observed in order by a
    /// concurrent reader: relaxed stores to one atomic are never reordered
    /// with each other.
    #[test]
    fn concurrent_reader_sees_monotonic_primes() {
        let p = Progress::new(u64::MAX);
        p.set_phase(Phase::Marking);
        let reader = {
            let p = Arc::clone(&p);
            thread::spawn(move || {
                let mut last = 0;
                while !p.is_finished() {
                    let prime = p.snapshot().prime;
                    assert!(prime >= last);
                    last = prime;
                }
            })
        };
        for prime in 1..50_000u64 {
            p.set_prime(prime);
        }
        p.finish();
        reader.join().unwrap();
    }
}
