//! CLI integration tests using assert_cmd.
//!
//! Every test works in its own temp directory, so page files and manifests
//! never collide. The `GF2SIEVE_*` environment variables are cleared for each
//! invocation so a developer's shell cannot leak parameters into a test.
//!
//! Expected prime lists come from the library's trial-division check, never
//! from an earlier sieve run.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

/// GF(2) irreducibles up to 0xff, in the paged output format.
const PRIMES_UP_TO_0XFF: &str = "2\n3\n7\nb\nd\n13\n19\n1f\n25\n29\n2f\n37\n3b\n3d\n43\n49\n57\n5b\n61\n67\n6d\n73\n75\n83\n89\n8f\n91\n9d\na7\nab\nb9\nbf\nc1\ncb\nd3\nd5\ne5\nef\nf1\nf7\nfd\n";

#[allow(deprecated)]
fn gf2sieve() -> Command {
    let mut cmd = Command::cargo_bin("gf2sieve").unwrap();
    cmd.env_remove("GF2SIEVE_CONFIG")
        .env_remove("GF2SIEVE_PREFIX")
        .env_remove("GF2SIEVE_BOUND")
        .env_remove("GF2SIEVE_PUDDLE_BITS")
        .env_remove("GF2SIEVE_POOL_BYTES");
    cmd
}

fn prefix(dir: &Path) -> String {
    format!("{}/primes.", dir.display())
}

fn sieve_paged(dir: &Path, bound: &str, pool_bytes: &str) -> assert_cmd::assert::Assert {
    gf2sieve()
        .args(["--prefix", &prefix(dir)])
        .args(["sieve", "--storage", "paged", "--bound", bound, "--pool-bytes", pool_bytes])
        .assert()
}

// --- Help and arg validation ---

/// Top-level help lists the three subcommands.
#[test]
fn help_shows_all_subcommands() {
    gf2sieve().arg("--help").assert().success().stdout(
        predicate::str::contains("sieve")
            .and(predicate::str::contains("list"))
            .and(predicate::str::contains("verify")),
    );
}

/// `sieve --help` documents every sieve parameter, including `--resume`.
#[test]
fn help_sieve_shows_args() {
    gf2sieve()
        .args(["sieve", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--bound")
                .and(predicate::str::contains("--puddle-bits"))
                .and(predicate::str::contains("--pool-bytes"))
                .and(predicate::str::contains("--storage"))
                .and(predicate::str::contains("--resume")),
        );
}

/// Only 32- and 64-bit puddles exist; validation names the allowed widths.
#[test]
fn rejects_bad_puddle_width() {
    gf2sieve()
        .args(["sieve", "--storage", "memory", "--bound", "0xff", "--puddle-bits", "16"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("32 or 64"));
}

/// A bound that is neither hex nor decimal is refused by the argument parser.
#[test]
fn rejects_unparseable_bound() {
    gf2sieve()
        .args(["sieve", "--bound", "0xzz"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid polynomial value"));
}

// --- Sieve ---

/// In-memory output tags primes from the marking loop with `*` and the rest
/// with `-`. For bound 255 the loop ends at x⁴+x+1 (0x13), which is still
/// tagged `*`; the next prime, 0x19, is the first drained one.
#[test]
fn memory_sieve_tags_sieved_and_drained() {
    let assert = gf2sieve()
        .args(["sieve", "--storage", "memory", "--bound", "255"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 41);
    assert_eq!(lines[0], "* 0x0000000000000002");
    assert_eq!(lines[4], "* 0x000000000000000D");
    assert_eq!(lines[5], "* 0x0000000000000013");
    assert_eq!(lines[6], "- 0x0000000000000019");
    assert_eq!(lines[40], "- 0x00000000000000FD");
}

/// Paged output is bare lowercase hex. 128 bits over 4-byte pools give
/// exactly four page files plus the manifest.
#[test]
fn paged_sieve_prints_plain_hex_and_writes_pages() {
    let dir = tempfile::tempdir().unwrap();
    sieve_paged(dir.path(), "0xff", "4")
        .success()
        .stdout(PRIMES_UP_TO_0XFF);

    for index in 0..4 {
        let page = dir.path().join(format!("primes.{:05}", index));
        assert_eq!(std::fs::metadata(&page).unwrap().len(), 4);
    }
    assert!(!dir.path().join("primes.00004").exists());
    assert!(dir.path().join("primes.manifest.json").exists());
}

/// Both backends emit the same 4720 irreducibles up to 0xffff, once the
/// in-memory tags are stripped.
#[test]
fn memory_and_paged_agree() {
    let dir = tempfile::tempdir().unwrap();
    let paged = sieve_paged(dir.path(), "0xffff", "64").success();
    let paged_out = String::from_utf8(paged.get_output().stdout.clone()).unwrap();

    let memory = gf2sieve()
        .args(["sieve", "--storage", "memory", "--bound", "0xffff", "--puddle-bits", "64"])
        .assert()
        .success();
    let memory_out = String::from_utf8(memory.get_output().stdout.clone()).unwrap();

    let from_memory: Vec<u64> = memory_out
        .lines()
        .map(|l| u64::from_str_radix(&l[4..], 16).unwrap())
        .collect();
    let from_pages: Vec<u64> = paged_out
        .lines()
        .map(|l| u64::from_str_radix(l, 16).unwrap())
        .collect();
    assert_eq!(from_pages.len(), 4720);
    assert_eq!(from_pages, from_memory);
}

/// Every sieve parameter can come from the `--config` TOML file alone.
#[test]
fn toml_config_supplies_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("sieve.toml");
    std::fs::write(
        &config,
        format!(
            "bound = 255\npuddle_bits = 64\npool_bytes = 8\nprefix = \"{}\"\n",
            prefix(dir.path())
        ),
    )
    .unwrap();

    gf2sieve()
        .arg("--config")
        .arg(&config)
        .args(["sieve", "--storage", "paged"])
        .assert()
        .success()
        .stdout(PRIMES_UP_TO_0XFF);
    assert_eq!(
        std::fs::metadata(dir.path().join("primes.00001")).unwrap().len(),
        8
    );
}

// --- Resume / List / Verify ---

/// `--resume` on a finished run reads bound and geometry from the manifest
/// and re-emits the full list.
#[test]
fn resume_replays_identical_output() {
    let dir = tempfile::tempdir().unwrap();
    sieve_paged(dir.path(), "0xfff", "16").success();

    let first = gf2sieve()
        .args(["--prefix", &prefix(dir.path()), "sieve", "--resume"])
        .assert()
        .success();
    let expected: String = (0..=0xfffu64)
        .filter(|&p| gf2sieve::gf2::is_irreducible(p))
        .map(|p| format!("{:x}\n", p))
        .collect();
    assert_eq!(String::from_utf8(first.get_output().stdout.clone()).unwrap(), expected);
}

/// Resuming with a bound other than the stored one is refused.
#[test]
fn resume_rejects_conflicting_bound() {
    let dir = tempfile::tempdir().unwrap();
    sieve_paged(dir.path(), "0xff", "4").success();
    gf2sieve()
        .args(["--prefix", &prefix(dir.path()), "sieve", "--resume", "--bound", "0xfff"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("differ from the manifest"));
}

/// `list` reads the page files and prints what the sieve printed.
#[test]
fn list_prints_stored_primes() {
    let dir = tempfile::tempdir().unwrap();
    sieve_paged(dir.path(), "0xff", "4").success();
    gf2sieve()
        .args(["--prefix", &prefix(dir.path()), "list"])
        .assert()
        .success()
        .stdout(PRIMES_UP_TO_0XFF);
}

/// Without a manifest there is nothing to list; the error says so.
#[test]
fn list_without_manifest_fails() {
    let dir = tempfile::tempdir().unwrap();
    gf2sieve()
        .args(["--prefix", &prefix(dir.path()), "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no valid manifest"));
}

/// A deleted page file is fatal and named in the error.
#[test]
fn list_fails_on_missing_page() {
    let dir = tempfile::tempdir().unwrap();
    sieve_paged(dir.path(), "0xff", "4").success();
    std::fs::remove_file(dir.path().join("primes.00003")).unwrap();
    gf2sieve()
        .args(["--prefix", &prefix(dir.path()), "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("primes.00003"));
}

/// Pages from a complete run agree with trial division for every value.
#[test]
fn verify_accepts_sieved_pages() {
    let dir = tempfile::tempdir().unwrap();
    sieve_paged(dir.path(), "0x3fff", "32").success();
    gf2sieve()
        .args(["--prefix", &prefix(dir.path()), "verify", "--limit", "0x3fff"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 mismatches"));
}

/// Setting every bit of the first page back to 1 revives composites such
/// as 9 = x³+1 = (x+1)(x²+x+1), which verify reports as mismatches.
#[test]
fn verify_detects_tampered_pages() {
    let dir = tempfile::tempdir().unwrap();
    sieve_paged(dir.path(), "0xff", "4").success();
    // restore every candidate bit in the first pool
    std::fs::write(dir.path().join("primes.00000"), [0xffu8; 4]).unwrap();
    gf2sieve()
        .args(["--prefix", &prefix(dir.path()), "verify"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("mismatches"));
}
