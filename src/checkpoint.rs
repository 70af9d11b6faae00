//! # Checkpoint — Run Manifest for Paged Sieves
//!
//! A paged run keeps a JSON manifest beside its page files recording the
//! configuration the pages were laid out with and the last prime whose
//! marking is fully written back. `sieve --resume` and the `list` and
//! `verify` commands read it to recover the geometry.
//!
//! ## Atomic Writes
//!
//! The manifest is written to a temp file and renamed into place, so a crash
//! mid-write leaves the previous manifest intact.
//!
//! ## Integrity
//!
//! A SHA-256 hash of the pretty-printed payload is stored in an envelope. On
//! load the hash is verified and corrupted files are skipped, falling back to
//! older generations (up to 3 kept).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::SieveConfig;
use crate::gf2::Polynomial;

/// Number of backup generations to keep.
const GENERATIONS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub config: SieveConfig,
    /// Largest prime whose multiples are all marked on disk; 0 before any.
    pub last_prime: Polynomial,
    /// Marking finished; the page files hold the final prime set.
    pub complete: bool,
    pub updated_at: DateTime<Utc>,
}

impl Manifest {
    pub fn new(config: SieveConfig) -> Self {
        Manifest {
            config,
            last_prime: 0,
            complete: false,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ManifestEnvelope {
    checksum: String,
    data: serde_json::Value,
}

fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Return the path for generation `gen` (0 = current, 1 = .1, 2 = .2, ...).
fn generation_path(base: &Path, gen: usize) -> PathBuf {
    if gen == 0 {
        base.to_path_buf()
    } else {
        let mut p = base.as_os_str().to_os_string();
        p.push(format!(".{}", gen));
        PathBuf::from(p)
    }
}

/// Save the manifest, rotating older generations: current → .1 → .2.
pub fn save(path: &Path, manifest: &Manifest) -> Result<()> {
    for gen in (1..GENERATIONS).rev() {
        let src = generation_path(path, gen - 1);
        let dst = generation_path(path, gen);
        if src.exists() {
            let _ = fs::rename(&src, &dst);
        }
    }

    let data = serde_json::to_value(manifest)?;
    let data_str = serde_json::to_string_pretty(&data)?;
    let checksum = sha256_hex(&data_str);
    let json = serde_json::to_string_pretty(&ManifestEnvelope { checksum, data })?;

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &json).with_context(|| format!("writing manifest {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing manifest {}", path.display()))?;
    Ok(())
}

/// Load the newest valid manifest, falling back to older generations on corruption.
pub fn load(path: &Path) -> Option<Manifest> {
    for gen in 0..GENERATIONS {
        let p = generation_path(path, gen);
        if let Some(manifest) = load_single(&p) {
            if gen > 0 {
                warn!(path = %p.display(), generation = gen, "recovered manifest from backup");
            }
            return Some(manifest);
        }
    }
    None
}

/// Load a manifest or fail with a message naming the expected path.
pub fn require(path: &Path) -> Result<Manifest> {
    load(path).with_context(|| {
        format!(
            "no valid manifest at {}; run `sieve` with paged storage first",
            path.display()
        )
    })
}

fn load_single(path: &Path) -> Option<Manifest> {
    let raw = fs::read_to_string(path).ok()?;
    let envelope: ManifestEnvelope = serde_json::from_str(&raw).ok()?;

    let data_str = serde_json::to_string_pretty(&envelope.data).ok()?;
    let expected = sha256_hex(&data_str);
    if expected != envelope.checksum {
        warn!(
            path = %path.display(),
            expected = &expected[..12],
            found = &envelope.checksum[..12.min(envelope.checksum.len())],
            "manifest integrity check failed"
        );
        return None;
    }

    serde_json::from_value(envelope.data).ok()
}

/// Remove the manifest and all its generations.
pub fn clear(path: &Path) {
    for gen in 0..GENERATIONS {
        let _ = fs::remove_file(generation_path(path, gen));
    }
    let _ = fs::remove_file(path.with_extension("tmp"));
}
