//! # Config — Sieve Configuration and Derived Geometry
//!
//! `SieveConfig` is the validated startup configuration: the maximum
//! polynomial value, the puddle width, the pool byte budget and the page-file
//! prefix. It can be read from a TOML file and is stored verbatim in the run
//! manifest so a resumed run can check that the page files on disk were laid
//! out with the same parameters.
//!
//! `Geometry` holds every count derived from the configuration. Only odd
//! values are tracked: bit k stands for the polynomial 2k + 1, so the space
//! holds one bit per odd value up to and including the bound.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::gf2::Polynomial;

/// Default maximum polynomial value: every polynomial of degree below 34.
pub const DEFAULT_BOUND: Polynomial = (1 << 34) - 1;
pub const DEFAULT_PUDDLE_BITS: u32 = 32;
/// Default pool budget: 1 GiB.
pub const DEFAULT_POOL_BYTES: u64 = 1024 * 1024 * 1024;
pub const DEFAULT_PREFIX: &str = "primes.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SieveConfig {
    /// Largest polynomial value considered.
    pub bound: Polynomial,
    /// Bits per puddle: 32 or 64.
    pub puddle_bits: u32,
    /// Bytes per pool (page file).
    pub pool_bytes: u64,
    /// Page-file prefix; files are named `<prefix><5-digit index>`.
    pub prefix: String,
}

impl Default for SieveConfig {
    fn default() -> Self {
        SieveConfig {
            bound: DEFAULT_BOUND,
            puddle_bits: DEFAULT_PUDDLE_BITS,
            pool_bytes: DEFAULT_POOL_BYTES,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl SieveConfig {
    /// Parse a TOML configuration file. Missing keys keep their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: SieveConfig = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Check the configuration once and compute the derived counts.
    pub fn validate(&self) -> Result<Geometry> {
        if self.bound < 2 {
            anyhow::bail!("bound must be at least 2, got {:#x}", self.bound);
        }
        if self.puddle_bits != 32 && self.puddle_bits != 64 {
            anyhow::bail!("puddle width must be 32 or 64 bits, got {}", self.puddle_bits);
        }
        let puddle_bytes = u64::from(self.puddle_bits / 8);
        if self.pool_bytes == 0 || self.pool_bytes % puddle_bytes != 0 {
            anyhow::bail!(
                "pool size must be a positive multiple of {} bytes, got {}",
                puddle_bytes,
                self.pool_bytes
            );
        }
        if self.prefix.is_empty() {
            anyhow::bail!("file prefix must not be empty");
        }
        Ok(Geometry::new(
            self.bound,
            self.puddle_bits,
            self.pool_bytes / puddle_bytes,
        ))
    }

    /// Path of the run manifest that sits next to the page files.
    pub fn manifest_path(&self) -> PathBuf {
        PathBuf::from(format!("{}manifest.json", self.prefix))
    }
}

/// Counts derived from a validated [`SieveConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub bound: Polynomial,
    pub puddle_bits: u32,
    /// Tracked bits: one per odd value `<= bound`.
    pub bits: u64,
    pub puddles: u64,
    pub puddles_per_pool: u64,
    pub pools: u64,
}

/// Where a bit lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitLocation {
    /// Global puddle index.
    pub puddle: u64,
    /// Bit offset within the puddle.
    pub offset: u32,
    pub pool: u64,
    /// Puddle offset within the pool.
    pub pool_offset: usize,
}

impl Geometry {
    pub fn new(bound: Polynomial, puddle_bits: u32, puddles_per_pool: u64) -> Self {
        let bits = bound / 2 + (bound & 1);
        let puddles = bits.div_ceil(u64::from(puddle_bits));
        let pools = puddles.div_ceil(puddles_per_pool);
        Geometry {
            bound,
            puddle_bits,
            bits,
            puddles,
            puddles_per_pool,
            pools,
        }
    }

    /// Bytes in one page file.
    pub fn pool_bytes(&self) -> u64 {
        self.puddles_per_pool * u64::from(self.puddle_bits / 8)
    }

    /// Bytes needed to hold the entire bit space resident.
    pub fn total_bytes(&self) -> u64 {
        self.puddles * u64::from(self.puddle_bits / 8)
    }

    /// True if the whole space fits in a single pool budget.
    pub fn fits_in_one_pool(&self) -> bool {
        self.puddles <= self.puddles_per_pool
    }

    /// Bit index tracking the odd value `value`, or `None` for even or out-of-range values.
    pub fn bit_index(&self, value: Polynomial) -> Option<u64> {
        if value & 1 == 0 || value > self.bound {
            return None;
        }
        Some(value >> 1)
    }

    /// Split a bit index into its puddle, pool, and offsets. Pure
    /// arithmetic: the index is not checked against the bound.
    pub fn locate(&self, bit: u64) -> BitLocation {
        let width = u64::from(self.puddle_bits);
        let puddle = bit / width;
        BitLocation {
            puddle,
            offset: (bit % width) as u32,
            pool: puddle / self.puddles_per_pool,
            pool_offset: (puddle % self.puddles_per_pool) as usize,
        }
    }

    /// Bit index of the smallest odd value strictly greater than `value`.
    pub fn first_bit_after(value: Polynomial) -> u64 {
        value / 2 + (value & 1)
    }

    /// The polynomial a bit index stands for.
    pub fn value_of(bit: u64) -> Polynomial {
        2 * bit + 1
    }
}
