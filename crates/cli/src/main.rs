//! # CLI - TwinSlot Interactive Shell
//!
//! A REPL-style command-line interface over a single TwinSlot store. Reads
//! commands from stdin, executes them, and prints results to stdout. Logs go
//! to stderr so scripted use can parse stdout. Works interactively or with
//! commands piped in.
//!
//! ## Commands
//!
//! ```text
//! PUT text...        Store the rest of the line as the new version
//! PUTFILE path       Store the contents of a file as the new version
//! GET                Print the latest payload (or "(nil)")
//! TS                 Print the latest timestamp in Unix millis (or "(nil)")
//! DUMP path          Write the latest payload to a file
//! INVALIDATE         Discard the latest version, falling back to the previous
//! RELOAD             Re-read both slots from disk
//! FLUSH              fsync the store file
//! STATS              Print store diagnostics
//! EXIT / QUIT        Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! ```text
//! TWINSLOT_PATH      store file path                 (default: "twinslot.dat")
//! TWINSLOT_MAGIC     format tag, decimal or 0x-hex   (default: "TWINSLOT" in ASCII)
//! RUST_LOG           log filter                      (default: "store=info,cli=info")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! TwinSlot started (path=twinslot.dat, magic=0x5457494e534c4f54, file_len=72, active=none)
//! > PUT hello world
//! OK
//! > GET
//! hello world
//! > EXIT
//! bye
//! ```

use anyhow::{Context, Result};
use config::Config;
use std::fs;
use std::io::{self, BufRead, Write};
use store::{Slot, TwinSlotStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Whether the REPL keeps reading after a command.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "store=info,cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_logging();

    let cfg = Config::from_env()?;
    let mut store = TwinSlotStore::open(&cfg.path, cfg.magic)
        .with_context(|| format!("failed to open store at {}", cfg.path.display()))?;

    println!(
        "TwinSlot started (path={}, magic={:#x}, file_len={}, active={})",
        cfg.path.display(),
        cfg.magic,
        store.file_len(),
        store
            .active_slot()
            .map_or_else(|| "none".to_string(), |s| s.to_string())
    );
    println!("Commands: PUT text | PUTFILE path | GET | TS | DUMP path");
    println!("          INVALIDATE | RELOAD | FLUSH | STATS | EXIT");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write!(out, "> ")?;
    out.flush()?;

    for line in stdin.lock().lines() {
        let line = line?;
        if execute(&mut store, &line, &mut out)? == Flow::Exit {
            break;
        }
        write!(out, "> ")?;
        out.flush()?;
    }

    store.close()?;
    Ok(())
}

/// Runs one command line against `store`, writing the response to `out`.
///
/// Store errors are reported as `ERR ...` lines; only failures writing to
/// `out` are returned.
fn execute<W: Write>(store: &mut TwinSlotStore, line: &str, out: &mut W) -> io::Result<Flow> {
    let trimmed = line.trim_start();
    let (cmd, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (trimmed, ""),
    };
    if cmd.is_empty() {
        return Ok(Flow::Continue);
    }
    tracing::debug!(command = cmd, arg_len = rest.len(), "executing command");

    match cmd.to_uppercase().as_str() {
        "PUT" => {
            if rest.is_empty() {
                writeln!(out, "ERR usage: PUT text")?;
            } else {
                match store.store(rest.as_bytes()) {
                    Ok(()) => writeln!(out, "OK")?,
                    Err(e) => writeln!(out, "ERR store failed: {}", e)?,
                }
            }
        }
        "PUTFILE" => {
            if rest.is_empty() {
                writeln!(out, "ERR usage: PUTFILE path")?;
            } else {
                match fs::read(rest) {
                    Ok(data) => match store.store(&data) {
                        Ok(()) => writeln!(out, "OK ({} bytes)", data.len())?,
                        Err(e) => writeln!(out, "ERR store failed: {}", e)?,
                    },
                    Err(e) => writeln!(out, "ERR cannot read {}: {}", rest, e)?,
                }
            }
        }
        "GET" => match store.latest_payload() {
            Some(p) => writeln!(out, "{}", String::from_utf8_lossy(p))?,
            None => writeln!(out, "(nil)")?,
        },
        "TS" => match store.latest_timestamp() {
            Some(ts) => writeln!(out, "{}", ts)?,
            None => writeln!(out, "(nil)")?,
        },
        "DUMP" => {
            if rest.is_empty() {
                writeln!(out, "ERR usage: DUMP path")?;
            } else {
                match store.latest_payload() {
                    Some(p) => match fs::write(rest, p) {
                        Ok(()) => writeln!(out, "OK ({} bytes)", p.len())?,
                        Err(e) => writeln!(out, "ERR cannot write {}: {}", rest, e)?,
                    },
                    None => writeln!(out, "(nil)")?,
                }
            }
        }
        "INVALIDATE" => match store.invalidate_latest() {
            Ok(true) => writeln!(out, "OK")?,
            Ok(false) => writeln!(out, "(nil)")?,
            Err(e) => writeln!(out, "ERR invalidate failed: {}", e)?,
        },
        "RELOAD" => match store.read_latest_data() {
            Ok(Some(p)) => writeln!(out, "OK ({} bytes)", p.len())?,
            Ok(None) => writeln!(out, "OK (no data)")?,
            Err(e) => writeln!(out, "ERR reload failed: {}", e)?,
        },
        "FLUSH" => match store.flush() {
            Ok(()) => writeln!(out, "OK")?,
            Err(e) => writeln!(out, "ERR flush failed: {}", e)?,
        },
        "STATS" => write_stats(store, out)?,
        "EXIT" | "QUIT" => {
            writeln!(out, "bye")?;
            return Ok(Flow::Exit);
        }
        other => {
            writeln!(out, "unknown command: {}", other)?;
        }
    }

    Ok(Flow::Continue)
}

fn write_stats<W: Write>(store: &TwinSlotStore, out: &mut W) -> io::Result<()> {
    let stats = store.stats();
    writeln!(out, "path:          {}", store.path().display())?;
    writeln!(out, "magic:         {:#x}", store.magic())?;
    writeln!(out, "file_len:      {}", stats.file_len)?;
    writeln!(out, "slot_capacity: {}", stats.slot_capacity)?;
    match stats.active {
        Some(slot) => writeln!(out, "active:        {}", slot)?,
        None => writeln!(out, "active:        none")?,
    }
    for slot in Slot::ALL {
        match stats.slots[slot.index()] {
            Some(meta) => writeln!(
                out,
                "slot {}:        ts={} len={}",
                slot, meta.timestamp, meta.payload_len
            )?,
            None => writeln!(out, "slot {}:        empty", slot)?,
        }
    }
    Ok(())
}
