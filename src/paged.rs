//! # Paged — Disk-Backed Candidate Bit Set
//!
//! Tracks the candidate bits of a space far larger than memory. The space is
//! cut into pools of `puddles_per_pool` words, one page file per pool, named
//! `<prefix><5-digit index>`. Each file is a raw native-endian dump of its
//! puddle array with no header, exactly `puddles_per_pool * puddle_bytes`
//! long, including the last pool.
//!
//! ## Single-Slot Cache
//!
//! At most one pool is resident. Touching any other pool flushes the
//! resident one if dirty, closes its handle, and reads the new pool in full.
//! There is no eviction ranking: the sieve walks the space forward, so a
//! second slot would rarely be hit. Backward seeks thrash.
//!
//! ## Failure Model
//!
//! Page files are regenerable scratch state. Any open, read, write or size
//! mismatch is returned as an error with the file path attached and the run
//! is abandoned; nothing is retried.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use tracing::{debug, error, info};

use crate::config::{BitLocation, Geometry};
use crate::gf2::Polynomial;
use crate::puddle::{self, Puddle};
use crate::store::{PrimeStore, EXHAUSTED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Write every page file with all bits set.
    CreateNew,
    /// Reuse page files from an earlier run; pool 0 is loaded immediately.
    OpenExisting,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Pools read from disk into the cache slot.
    pub loads: u64,
    /// Dirty pools written back.
    pub flushes: u64,
}

/// Name of the page file holding pool `index`.
pub fn page_path(prefix: &str, index: u64) -> PathBuf {
    PathBuf::from(format!("{}{:05}", prefix, index))
}

struct ResidentPool {
    index: u64,
    path: PathBuf,
    file: File,
    dirty: bool,
}

/// Candidate bits for every odd value up to the bound, kept in page files
/// with a single resident pool.
///
/// Created with [`PagedBitSet::initialize`] and released with
/// [`PagedBitSet::terminate`]. Dropping it without `terminate` still writes
/// back a dirty pool but can only log a failure.
pub struct PagedBitSet<P: Puddle> {
    geometry: Geometry,
    prefix: String,
    /// Puddles of the resident pool; contents are meaningless while `resident` is `None`.
    pool: Vec<P>,
    /// Scratch buffer for page-file I/O.
    bytes: Vec<u8>,
    resident: Option<ResidentPool>,
    stats: CacheStats,
}

impl<P: Puddle> PagedBitSet<P> {
    /// Create or reopen the page files for `geometry` under `prefix`.
    ///
    /// `CreateNew` overwrites every page with all bits set and leaves the
    /// cache slot empty. `OpenExisting` checks that every page exists with
    /// the expected length, then loads pool 0.
    pub fn initialize(prefix: &str, geometry: Geometry, mode: OpenMode) -> Result<Self> {
        debug_assert_eq!(geometry.puddle_bits, P::BITS);
        let pool_len = usize::try_from(geometry.puddles_per_pool)
            .context("pool size does not fit in the address space")?;

        let mut bits = PagedBitSet {
            geometry,
            prefix: prefix.to_string(),
            pool: vec![P::FULL; pool_len],
            bytes: vec![0u8; pool_len * P::BYTES],
            resident: None,
            stats: CacheStats::default(),
        };

        match mode {
            OpenMode::CreateNew => bits.create_pages()?,
            OpenMode::OpenExisting => {
                bits.check_pages()?;
                bits.fault_in(0)?;
            }
        }
        Ok(bits)
    }

    /// Flush the resident pool and close its handle.
    pub fn terminate(mut self) -> Result<CacheStats> {
        self.release()?;
        Ok(self.stats)
    }

    /// Flush and empty the cache slot. The slot is emptied even when the
    /// flush fails, so `Drop` does not repeat a write that already failed.
    fn release(&mut self) -> Result<()> {
        let flushed = self.flush();
        self.resident = None;
        flushed
    }

    /// Loads and flushes so far.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Index of the pool currently in the cache slot.
    pub fn resident_pool(&self) -> Option<u64> {
        self.resident.as_ref().map(|r| r.index)
    }

    fn create_pages(&mut self) -> Result<()> {
        puddle::encode(&vec![P::FULL; self.pool.len()], &mut self.bytes);
        for index in 0..self.geometry.pools {
            let path = page_path(&self.prefix, index);
            debug!(path = %path.display(), "creating page file");
            let mut file = File::create(&path)
                .with_context(|| format!("creating page file {}", path.display()))?;
            file.write_all(&self.bytes)
                .with_context(|| format!("writing page file {}", path.display()))?;
        }
        info!(
            pools = self.geometry.pools,
            pool_bytes = self.bytes.len(),
            prefix = %self.prefix,
            "created page files"
        );
        Ok(())
    }

    fn check_pages(&self) -> Result<()> {
        for index in 0..self.geometry.pools {
            let path = page_path(&self.prefix, index);
            let meta = std::fs::metadata(&path)
                .with_context(|| format!("opening page file {}", path.display()))?;
            self.check_len(&path, meta.len())?;
        }
        Ok(())
    }

    fn check_len(&self, path: &std::path::Path, len: u64) -> Result<()> {
        if len != self.bytes.len() as u64 {
            anyhow::bail!(
                "page file {} is {} bytes, expected {}",
                path.display(),
                len,
                self.bytes.len()
            );
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let Some(resident) = self.resident.as_mut() else {
            return Ok(());
        };
        if !resident.dirty {
            return Ok(());
        }
        puddle::encode(&self.pool, &mut self.bytes);
        resident
            .file
            .seek(SeekFrom::Start(0))
            .and_then(|_| resident.file.write_all(&self.bytes))
            .with_context(|| format!("writing page file {}", resident.path.display()))?;
        resident.dirty = false;
        self.stats.flushes += 1;
        debug!(pool = resident.index, "flushed pool");
        Ok(())
    }

    /// Make `index` the resident pool, flushing and replacing whatever was there.
    fn fault_in(&mut self, index: u64) -> Result<()> {
        if self.resident_pool() == Some(index) {
            return Ok(());
        }
        self.flush()?;
        self.resident = None;

        let path = page_path(&self.prefix, index);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("opening page file {}", path.display()))?;
        let len = file
            .metadata()
            .with_context(|| format!("reading metadata of {}", path.display()))?
            .len();
        self.check_len(&path, len)?;
        file.read_exact(&mut self.bytes)
            .with_context(|| format!("reading page file {}", path.display()))?;
        puddle::decode(&self.bytes, &mut self.pool);

        self.stats.loads += 1;
        debug!(pool = index, loads = self.stats.loads, "page fault");
        self.resident = Some(ResidentPool {
            index,
            path,
            file,
            dirty: false,
        });
        Ok(())
    }

    fn locate(&self, value: Polynomial) -> Option<BitLocation> {
        self.geometry
            .bit_index(value)
            .map(|bit| self.geometry.locate(bit))
    }

    /// Puddles of pool `index` that fall inside the bit space.
    fn puddles_in_pool(&self, index: u64) -> usize {
        let first = index * self.geometry.puddles_per_pool;
        (self.geometry.puddles - first).min(self.geometry.puddles_per_pool) as usize
    }
}

impl<P: Puddle> PrimeStore for PagedBitSet<P> {
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn mark_composite(&mut self, value: Polynomial) -> Result<()> {
        if value & 1 == 0 {
            return Ok(());
        }
        let loc = self.locate(value).ok_or_else(|| {
            anyhow::anyhow!(
                "value {:#x} is beyond the configured bound {:#x}",
                value,
                self.geometry.bound
            )
        })?;
        self.fault_in(loc.pool)?;

        let word = &mut self.pool[loc.pool_offset];
        if word.test_bit(loc.offset) {
            word.clear_bit(loc.offset);
            if let Some(resident) = self.resident.as_mut() {
                resident.dirty = true;
            }
        }
        Ok(())
    }

    fn is_prime(&mut self, value: Polynomial) -> Result<bool> {
        let Some(loc) = self.locate(value) else {
            return Ok(false);
        };
        self.fault_in(loc.pool)?;
        Ok(self.pool[loc.pool_offset].test_bit(loc.offset))
    }

    fn find_next_prime(&mut self, current: Polynomial) -> Result<Polynomial> {
        let start = Geometry::first_bit_after(current);
        if start >= self.geometry.bits {
            return Ok(EXHAUSTED);
        }
        let loc = self.geometry.locate(start);
        let mut pool = loc.pool;
        let mut offset = loc.pool_offset;

        self.fault_in(pool)?;
        let mut word = self.pool[offset].mask_below(loc.offset);

        while word == P::EMPTY {
            let end = self.puddles_in_pool(pool);
            let skip = self.pool[offset + 1..end]
                .iter()
                .position(|&w| w != P::EMPTY);
            match skip {
                Some(skip) => {
                    offset += 1 + skip;
                    word = self.pool[offset];
                }
                None => {
                    pool += 1;
                    if pool >= self.geometry.pools {
                        return Ok(EXHAUSTED);
                    }
                    self.fault_in(pool)?;
                    offset = 0;
                    word = self.pool[0];
                }
            }
        }

        let puddle = pool * self.geometry.puddles_per_pool + offset as u64;
        let bit = puddle * u64::from(P::BITS) + u64::from(word.lowest_set_bit());
        // padding bits past the last tracked value are never cleared
        Ok(if bit < self.geometry.bits {
            Geometry::value_of(bit)
        } else {
            EXHAUSTED
        })
    }

    fn sync(&mut self) -> Result<()> {
        self.flush()
    }
}

impl<P: Puddle> Drop for PagedBitSet<P> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!(error = %e, "failed to flush resident pool");
        }
    }
}
