//! # CLI Execution Functions
//!
//! Extracted from `main.rs` to keep the entry point slim. Resolves the
//! configuration, picks the bit-set backend and puddle width, runs the sieve
//! with the progress monitor alongside, and writes primes to stdout.

use anyhow::{Context, Result};
use gf2sieve::checkpoint::{self, Manifest};
use gf2sieve::config::{Geometry, SieveConfig};
use gf2sieve::gf2::{self, Polynomial};
use gf2sieve::memory::InMemoryBitSet;
use gf2sieve::paged::{OpenMode, PagedBitSet};
use gf2sieve::progress::{Phase, Progress};
use gf2sieve::puddle::Puddle;
use gf2sieve::sieve::{CheckpointPolicy, Discovery, SieveDriver, SieveSummary};
use gf2sieve::store::{self, PrimeStore};
use std::io::{self, Write};
use std::time::Duration;
use tracing::{info, warn};

use super::{Cli, Commands, StorageKind};

// ── Configuration ───────────────────────────────────────────────

/// Defaults, then the TOML file, then the global `--prefix`.
fn base_config(cli: &Cli) -> Result<SieveConfig> {
    let mut config = match &cli.config {
        Some(path) => SieveConfig::from_toml_file(path)?,
        None => SieveConfig::default(),
    };
    if let Some(prefix) = &cli.prefix {
        config.prefix = prefix.clone();
    }
    Ok(config)
}

/// Configuration recorded by the run that created the page files at the configured prefix.
fn stored_config(cli: &Cli) -> Result<Manifest> {
    let config = base_config(cli)?;
    let manifest = checkpoint::require(&config.manifest_path())?;
    if manifest.config.prefix != config.prefix {
        anyhow::bail!(
            "manifest {} was written for prefix '{}'",
            config.manifest_path().display(),
            manifest.config.prefix
        );
    }
    Ok(manifest)
}

// ── Output ──────────────────────────────────────────────────────

/// Prime sink on stdout. Paged runs print bare hex; in-memory runs tag each
/// line with `*` (marked its multiples) or `-` (collected after the cutoff).
struct PrimeWriter<W: Write> {
    out: W,
    tagged: bool,
}

impl<W: Write> PrimeWriter<W> {
    fn new(out: W, tagged: bool) -> Self {
        PrimeWriter { out, tagged }
    }

    fn write(&mut self, discovery: Discovery) -> Result<()> {
        if self.tagged {
            let tag = if discovery.phase == Phase::Marking { '*' } else { '-' };
            writeln!(self.out, "{} 0x{:016X}", tag, discovery.value)?;
        } else {
            writeln!(self.out, "{:x}", discovery.value)?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

// ── Sieve ───────────────────────────────────────────────────────

struct SieveOptions {
    resume: Option<Manifest>,
    report_interval: Duration,
    checkpoint_interval: Duration,
}

/// Run the `sieve` subcommand.
pub fn run_sieve(cli: &Cli) -> Result<()> {
    let Commands::Sieve {
        bound,
        puddle_bits,
        pool_bytes,
        storage,
        resume,
        report_interval,
        checkpoint_interval,
    } = &cli.command
    else {
        unreachable!("run_sieve called for another subcommand");
    };

    let mut config = base_config(cli)?;
    let resume = if *resume {
        if *storage == StorageKind::Memory {
            anyhow::bail!("--resume needs paged storage");
        }
        let manifest = stored_config(cli)?;
        let stored = &manifest.config;
        let conflicts = bound.is_some_and(|b| b != stored.bound)
            || puddle_bits.is_some_and(|b| b != stored.puddle_bits)
            || pool_bytes.is_some_and(|b| b != stored.pool_bytes);
        if conflicts {
            anyhow::bail!(
                "parameters differ from the manifest (bound {:#x}, {}-bit puddles, {} byte pools)",
                stored.bound,
                stored.puddle_bits,
                stored.pool_bytes
            );
        }
        config = manifest.config.clone();
        Some(manifest)
    } else {
        if let Some(b) = bound {
            config.bound = *b;
        }
        if let Some(b) = puddle_bits {
            config.puddle_bits = *b;
        }
        if let Some(b) = pool_bytes {
            config.pool_bytes = *b;
        }
        None
    };

    let geometry = config.validate()?;
    let paged = match storage {
        StorageKind::Paged => true,
        StorageKind::Memory => false,
        StorageKind::Auto => resume.is_some() || !geometry.fits_in_one_pool(),
    };

    info!(
        bound = format_args!("{:#x}", config.bound),
        puddle_bits = config.puddle_bits,
        bits = geometry.bits,
        pools = geometry.pools,
        bytes = geometry.total_bytes(),
        storage = if paged { "paged" } else { "memory" },
        "gf2sieve starting"
    );

    let options = SieveOptions {
        resume,
        report_interval: Duration::from_secs((*report_interval).max(1)),
        checkpoint_interval: Duration::from_secs(*checkpoint_interval),
    };
    let summary = match (paged, config.puddle_bits) {
        (true, 32) => sieve_paged::<u32>(&config, geometry, options)?,
        (true, _) => sieve_paged::<u64>(&config, geometry, options)?,
        (false, 32) => sieve_memory::<u32>(geometry, options)?,
        (false, _) => sieve_memory::<u64>(geometry, options)?,
    };

    info!(primes = summary.primes(), "search complete");
    Ok(())
}

fn sieve_paged<P: Puddle>(
    config: &SieveConfig,
    geometry: Geometry,
    options: SieveOptions,
) -> Result<SieveSummary> {
    let (mode, manifest) = match options.resume {
        Some(manifest) => {
            if manifest.complete {
                info!("manifest reports a finished sieve; replaying stored primes");
            }
            (OpenMode::OpenExisting, manifest)
        }
        None => (OpenMode::CreateNew, Manifest::new(config.clone())),
    };
    let resume_after = if mode == OpenMode::OpenExisting {
        manifest.last_prime
    } else {
        0
    };

    let manifest_path = config.manifest_path();
    if mode == OpenMode::CreateNew {
        checkpoint::clear(&manifest_path);
    }
    let mut bits = PagedBitSet::<P>::initialize(&config.prefix, geometry, mode)?;
    if mode == OpenMode::CreateNew {
        checkpoint::save(&manifest_path, &manifest)?;
    }

    let policy = CheckpointPolicy {
        path: manifest_path,
        manifest,
        interval: options.checkpoint_interval,
    };
    let driver = SieveDriver::new(&mut bits, Progress::new(geometry.bound))
        .resume_after(resume_after)
        .with_checkpoints(policy);
    let summary = drive(driver, false, options.report_interval)?;

    let stats = bits.terminate()?;
    info!(loads = stats.loads, flushes = stats.flushes, "page cache");
    Ok(summary)
}

fn sieve_memory<P: Puddle>(geometry: Geometry, options: SieveOptions) -> Result<SieveSummary> {
    let mut bits = InMemoryBitSet::<P>::new(geometry)?;
    let driver = SieveDriver::new(&mut bits, Progress::new(geometry.bound));
    drive(driver, true, options.report_interval)
}

/// Run a driver with the progress monitor alongside and primes going to stdout.
fn drive<S: PrimeStore + ?Sized>(
    mut driver: SieveDriver<'_, S>,
    tagged: bool,
    report_interval: Duration,
) -> Result<SieveSummary> {
    let progress = driver.progress();
    let monitor = progress.start_monitor(report_interval);

    let mut writer = PrimeWriter::new(io::stdout().lock(), tagged);
    let result = driver.run(|discovery| writer.write(discovery));

    progress.finish();
    monitor
        .join()
        .map_err(|_| anyhow::anyhow!("progress monitor panicked"))?;

    let summary = result?;
    writer.finish()?;
    Ok(summary)
}

// ── List / Verify ───────────────────────────────────────────────

/// Run the `list` subcommand: print every prime held by the page files.
pub fn run_list(cli: &Cli) -> Result<()> {
    let manifest = stored_config(cli)?;
    if !manifest.complete {
        warn!(
            last_prime = format_args!("{:#x}", manifest.last_prime),
            "sieve did not finish; values past the checkpoint may be composite"
        );
    }
    let geometry = manifest.config.validate()?;
    let prefix = manifest.config.prefix.as_str();
    match manifest.config.puddle_bits {
        32 => list_pages::<u32>(prefix, geometry),
        _ => list_pages::<u64>(prefix, geometry),
    }
}

fn list_pages<P: Puddle>(prefix: &str, geometry: Geometry) -> Result<()> {
    let mut bits = PagedBitSet::<P>::initialize(prefix, geometry, OpenMode::OpenExisting)?;
    let mut out = io::stdout().lock();
    let count = store::for_each_prime(&mut bits, |prime| {
        writeln!(out, "{:x}", prime).context("writing to stdout")
    })?;
    out.flush()?;
    bits.terminate()?;
    info!(primes = count, "listing complete");
    Ok(())
}

/// Run the `verify` subcommand: compare stored primality with trial division.
pub fn run_verify(cli: &Cli, limit: Polynomial) -> Result<()> {
    let manifest = stored_config(cli)?;
    let geometry = manifest.config.validate()?;
    let prefix = manifest.config.prefix.as_str();
    let report = match manifest.config.puddle_bits {
        32 => verify_pages::<u32>(prefix, geometry, limit)?,
        _ => verify_pages::<u64>(prefix, geometry, limit)?,
    };

    println!(
        "checked {} values up to {:#x}: {} irreducible, {} mismatches",
        report.checked, report.limit, report.irreducible, report.mismatches
    );
    if report.mismatches > 0 {
        anyhow::bail!("{} stored values disagree with trial division", report.mismatches);
    }
    Ok(())
}

struct VerifyReport {
    limit: Polynomial,
    checked: u64,
    irreducible: u64,
    mismatches: u64,
}

fn verify_pages<P: Puddle>(prefix: &str, geometry: Geometry, limit: Polynomial) -> Result<VerifyReport> {
    let mut bits = PagedBitSet::<P>::initialize(prefix, geometry, OpenMode::OpenExisting)?;
    let limit = limit.min(geometry.bound);
    let mut report = VerifyReport {
        limit,
        checked: 0,
        irreducible: 0,
        mismatches: 0,
    };

    // 2 is never stored; every other irreducible is odd
    if limit >= 2 {
        report.checked += 1;
        report.irreducible += 1;
    }
    let mut value: Polynomial = 1;
    while value <= limit {
        let stored = bits.is_prime(value)?;
        let expected = gf2::is_irreducible(value);
        report.checked += 1;
        report.irreducible += u64::from(expected);
        if stored != expected {
            report.mismatches += 1;
            if report.mismatches <= 10 {
                warn!(value = format_args!("{:#x}", value), stored, expected, "primality mismatch");
            }
        }
        value = match value.checked_add(2) {
            Some(next) => next,
            None => break,
        };
    }

    bits.terminate()?;
    Ok(report)
}
