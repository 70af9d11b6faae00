//! # Main — CLI Entry Point
//!
//! Parses the command line, initializes logging, and routes subcommands to
//! the execution functions in `cli.rs`.
//!
//! ## Subcommands
//!
//! - `sieve`: run the sieve and stream every irreducible polynomial up to the
//!   bound to stdout, one hex value per line.
//! - `list`: print the primes recorded in existing page files.
//! - `verify`: cross-check existing page files against trial division.
//!
//! ## Configuration
//!
//! Parameters come from built-in defaults, then an optional TOML file
//! (`--config`), then flags or `GF2SIEVE_*` environment variables (a `.env`
//! file is honored). Logs go to stderr; `LOG_FORMAT=json` switches to JSON
//! and `RUST_LOG` sets the level.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use gf2sieve::gf2::Polynomial;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(
    name = "gf2sieve",
    version,
    about = "Enumerate irreducible polynomials over GF(2) with a disk-paged sieve"
)]
struct Cli {
    /// TOML file with sieve parameters (flags take precedence)
    #[arg(long, env = "GF2SIEVE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Page-file prefix; pool files are named <prefix>00000, <prefix>00001, ...
    #[arg(long, env = "GF2SIEVE_PREFIX", global = true)]
    prefix: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sieve irreducible polynomials up to a bound and print them in ascending order
    Sieve {
        /// Largest polynomial value to consider (decimal or 0x-prefixed hex)
        #[arg(long, env = "GF2SIEVE_BOUND", value_parser = parse_polynomial)]
        bound: Option<Polynomial>,
        /// Bits per puddle (32 or 64)
        #[arg(long, env = "GF2SIEVE_PUDDLE_BITS")]
        puddle_bits: Option<u32>,
        /// Bytes per pool, the unit of paging and of each page file
        #[arg(long, env = "GF2SIEVE_POOL_BYTES")]
        pool_bytes: Option<u64>,
        /// Bit-set backend
        #[arg(long, value_enum, default_value_t = StorageKind::Auto)]
        storage: StorageKind,
        /// Continue from the manifest checkpoint of an earlier paged run
        #[arg(long)]
        resume: bool,
        /// Seconds between progress lines
        #[arg(long, default_value_t = 60)]
        report_interval: u64,
        /// Minimum seconds between manifest checkpoints (paged runs)
        #[arg(long, default_value_t = 300)]
        checkpoint_interval: u64,
    },
    /// Print the primes stored in existing page files
    List,
    /// Cross-check existing page files against trial division
    Verify {
        /// Largest value to check (decimal or 0x-prefixed hex)
        #[arg(long, default_value = "0xffff", value_parser = parse_polynomial)]
        limit: Polynomial,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum StorageKind {
    /// In memory when the whole space fits one pool, paged otherwise
    Auto,
    /// Page files with a single resident pool
    Paged,
    /// One resident array
    Memory,
}

fn parse_polynomial(raw: &str) -> Result<Polynomial, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => Polynomial::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|e| format!("invalid polynomial value '{}': {}", raw, e))
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::Sieve { .. } => cli::run_sieve(&cli),
        Commands::List => cli::run_list(&cli),
        Commands::Verify { limit } => cli::run_verify(&cli, *limit),
    }
}
