//! Selftest command implementation.
//!
//! Maps scratch pages with assorted protections and holes and runs every
//! engine operation against them.

use anyhow::{Result, bail, ensure};
use owo_colors::OwoColorize;
use pagesafe_core::{
    Error, MemoryBackend, NativeMemory, Protection, SafeMemory, SafeMemoryConfig, ScratchPages,
};

type Engine = SafeMemory<NativeMemory>;

enum Outcome {
    Pass,
    Fail(anyhow::Error),
    Skip(&'static str),
}

struct Check {
    name: &'static str,
    needs_read_elevation: bool,
    needs_write_elevation: bool,
    run: fn(&Engine) -> Result<()>,
}

const CHECKS: &[Check] = &[
    Check {
        name: "write/read round trip",
        needs_read_elevation: false,
        needs_write_elevation: false,
        run: round_trip,
    },
    Check {
        name: "probe rejects null and short regions",
        needs_read_elevation: false,
        needs_write_elevation: false,
        run: probe,
    },
    Check {
        name: "write into read-only page",
        needs_read_elevation: false,
        needs_write_elevation: true,
        run: write_read_only,
    },
    Check {
        name: "read no-access page",
        needs_read_elevation: true,
        needs_write_elevation: false,
        run: read_no_access,
    },
    Check {
        name: "zero-fill across released page",
        needs_read_elevation: false,
        needs_write_elevation: false,
        run: zero_fill,
    },
    Check {
        name: "content guard",
        needs_read_elevation: false,
        needs_write_elevation: true,
        run: content_guard,
    },
    Check {
        name: "fill and compare",
        needs_read_elevation: false,
        needs_write_elevation: false,
        run: fill_compare,
    },
    Check {
        name: "chunked copy lengths",
        needs_read_elevation: false,
        needs_write_elevation: false,
        run: copy_lengths,
    },
];

/// Run the selftest command
pub fn run(config: SafeMemoryConfig) -> Result<()> {
    let memory = SafeMemory::with_config(config)?;
    println!(
        "Selftest (page size {}, elevation to {})",
        memory.page_size(),
        config.elevated_protection
    );
    println!();

    let mut failed = 0;
    for check in CHECKS {
        let outcome = if check.needs_read_elevation && !config.elevate_reads {
            Outcome::Skip("read elevation disabled")
        } else if check.needs_write_elevation && !config.elevate_writes {
            Outcome::Skip("write elevation disabled")
        } else {
            match (check.run)(&memory) {
                Ok(()) => Outcome::Pass,
                Err(e) => Outcome::Fail(e),
            }
        };

        match outcome {
            Outcome::Pass => println!("  {} {}", "PASS".green(), check.name),
            Outcome::Skip(reason) => println!("  {} {} ({})", "SKIP".yellow(), check.name, reason),
            Outcome::Fail(e) => {
                failed += 1;
                println!("  {} {}: {:#}", "FAIL".red(), check.name, e);
            }
        }
    }

    println!();
    if memory.restore_failures() > 0 {
        println!(
            "{} {} protection restore(s) failed",
            "WARN".yellow(),
            memory.restore_failures()
        );
    }
    if failed > 0 {
        bail!("{} of {} checks failed", failed, CHECKS.len());
    }
    println!("All checks passed");
    Ok(())
}

fn protection_at(memory: &Engine, address: usize) -> Result<Protection> {
    match memory.backend().query(address) {
        Some(region) => Ok(region.protection),
        None => bail!("region query at 0x{:X} failed", address),
    }
}

fn round_trip(memory: &Engine) -> Result<()> {
    let pages = ScratchPages::map(2)?;
    let at = pages.page(1)? - 8;
    let data: Vec<u8> = (1..=16).collect();

    unsafe { memory.write(at, &data, None) }?;
    let mut buf = [0u8; 16];
    memory.read(at, &mut buf)?;
    ensure!(buf[..] == data[..], "read back {:02X?}", buf);
    Ok(())
}

fn probe(memory: &Engine) -> Result<()> {
    let pages = ScratchPages::map(2)?;
    pages.protect(1, 1, Protection::ReadOnly)?;
    let page_size = pages.page_size();

    ensure!(!memory.is_readable(0, 1), "null reported readable");
    ensure!(
        memory.is_writable(pages.base(), page_size),
        "read-write page reported read-only"
    );
    ensure!(
        !memory.is_writable(pages.base(), page_size + 1),
        "range into read-only page reported writable"
    );
    Ok(())
}

fn write_read_only(memory: &Engine) -> Result<()> {
    let pages = ScratchPages::map(1)?;
    pages.protect(0, 1, Protection::ReadOnly)?;

    unsafe { memory.write(pages.base(), &[0xC3], None) }?;
    ensure!(memory.compare(pages.base(), &[0xC3]), "byte not written");
    let protection = protection_at(memory, pages.base())?;
    ensure!(
        protection == Protection::ReadOnly,
        "protection left at {}",
        protection
    );
    Ok(())
}

fn read_no_access(memory: &Engine) -> Result<()> {
    let pages = ScratchPages::map(1)?;
    unsafe { memory.fill(pages.base(), 0x5A, 32) }?;
    pages.protect(0, 1, Protection::NoAccess)?;

    let mut buf = [0u8; 32];
    memory.read(pages.base(), &mut buf)?;
    ensure!(buf == [0x5A; 32], "read back {:02X?}", buf);
    let protection = protection_at(memory, pages.base())?;
    ensure!(
        protection == Protection::NoAccess,
        "protection left at {}",
        protection
    );
    Ok(())
}

fn zero_fill(memory: &Engine) -> Result<()> {
    let mut pages = ScratchPages::map(2)?;
    let at = pages.page(1)? - 4;
    unsafe { memory.fill(at, 0xAA, 4) }?;
    pages.release(1)?;

    let mut buf = [0xFFu8; 8];
    match memory.read(at, &mut buf) {
        Err(e) if e.is_incomplete() => {}
        Err(e) => bail!("unexpected error: {}", e),
        Ok(()) => bail!("read of released page succeeded"),
    }
    ensure!(
        buf == [0xAA, 0xAA, 0xAA, 0xAA, 0, 0, 0, 0],
        "read back {:02X?}",
        buf
    );
    Ok(())
}

fn content_guard(memory: &Engine) -> Result<()> {
    let pages = ScratchPages::map(1)?;
    pages.protect(0, 1, Protection::ExecuteRead)?;
    let at = pages.base();

    match unsafe { memory.write(at, &[0x90, 0x90], Some(&[0x55, 0x48][..])) } {
        Err(Error::UnexpectedContent { .. }) => {}
        other => bail!("mismatching guard returned {:?}", other),
    }
    ensure!(memory.compare(at, &[0, 0]), "guarded write modified memory");

    unsafe { memory.write(at, &[0x90, 0x90], Some(&[0, 0][..])) }?;
    ensure!(memory.compare(at, &[0x90, 0x90]), "matching guard did not write");
    Ok(())
}

fn fill_compare(memory: &Engine) -> Result<()> {
    let pages = ScratchPages::map(3)?;
    let len = pages.len() - 1;

    unsafe { memory.fill(pages.base() + 1, 0xCC, len) }?;
    ensure!(
        memory.compare(pages.base() + 1, &vec![0xCC; len]),
        "filled range differs"
    );
    ensure!(memory.compare(pages.base(), &[0]), "fill wrote before its start");
    Ok(())
}

fn copy_lengths(memory: &Engine) -> Result<()> {
    let max_len = 3 * 4096 + 1;
    let count = (max_len + 8) / memory.page_size() + 1;

    for len in [1, 4095, 4096, 4097, max_len] {
        let src = ScratchPages::map(count)?;
        let dest = ScratchPages::map(count)?;
        let source: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
        unsafe { memory.write(src.base() + 3, &source, None) }?;

        unsafe { memory.copy(dest.base() + 5, src.base() + 3, len, None) }?;
        ensure!(
            memory.compare(dest.base() + 5, &source),
            "copy of {} bytes differs",
            len
        );
        ensure!(
            memory.compare(dest.base() + 5 + len, &[0]),
            "copy of {} bytes overran",
            len
        );
    }
    Ok(())
}
