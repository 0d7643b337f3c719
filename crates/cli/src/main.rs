//! # CLI — riptide-lsm interactive shell
//!
//! A REPL-style command-line interface for the storage engine. Reads
//! commands from stdin, executes them against a [`KvStore`], and prints
//! results to stdout — useful for interactive exploration and scripted
//! testing alike (pipe commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! PUT key value      Insert or update a key (both u64)
//! GET key            Look up a key (prints value or "(nil)")
//! DEL key            Delete a key (writes a tombstone)
//! SCAN lo hi         Range scan, inclusive both ends
//! FLUSH              Force the memtable to flush to a new L0 run
//! COMPACT            Force compaction of level 0 into level 1
//! STATS              Print engine debug info
//! EXIT / QUIT        Close the database and exit
//! ```
//!
//! ## Configuration
//!
//! Every [`Options`] field is exposed as a flag; see `--help`.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use engine::{KvStore, Options};
use sstable::Serialization;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// riptide-lsm interactive shell.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Database name; files live under `<dir>/<name>/`.
    #[arg(long, default_value = "db")]
    name: String,

    /// Parent directory for the database directory.
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Wipe any existing database directory before opening.
    #[arg(long)]
    overwrite: bool,

    /// Memtable capacity, in distinct keys.
    #[arg(long, default_value_t = 1000)]
    memtable_elements: usize,

    /// Buffer-pool max page count.
    #[arg(long, default_value_t = 256)]
    buffer_pages: usize,

    /// On-disk sorted-run format: "flat" or "btree".
    #[arg(long, default_value = "flat")]
    serialization: String,

    /// Max runs per level before compaction triggers.
    #[arg(long, default_value_t = engine::DEFAULT_TIERS)]
    tiers: u8,

    /// Disable automatic compaction (it still runs on explicit COMPACT).
    #[arg(long)]
    no_compaction: bool,
}

fn parse_serialization(s: &str) -> Result<Serialization> {
    match s {
        "flat" | "flatsorted" | "flat-sorted" => Ok(Serialization::FlatSorted),
        "btree" | "b-tree" => Ok(Serialization::BTree),
        other => Err(anyhow!(
            "unrecognized --serialization {other:?}: expected \"flat\" or \"btree\""
        )),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let options = Options {
        dir: args.dir.clone(),
        overwrite: args.overwrite,
        memory_buffer_elements: args.memtable_elements,
        buffer_pages_maximum: args.buffer_pages,
        serialization: parse_serialization(&args.serialization)?,
        tiers: args.tiers,
        compaction: !args.no_compaction,
    };

    let mut store = KvStore::open(&args.name, options).context("failed to open database")?;

    println!(
        "riptide-lsm started (db={}, tiers={}, compaction={})",
        store.data_directory()?.display(),
        args.tiers,
        !args.no_compaction
    );
    println!("Commands: PUT key value | GET key | DEL key | SCAN lo hi");
    println!("          FLUSH | COMPACT | STATS | EXIT");
    prompt();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "PUT" | "SET" => match (parts.next(), parts.next()) {
                    (Some(k), Some(v)) => match (k.parse(), v.parse()) {
                        (Ok(k), Ok(v)) => match store.put(k, v) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR {e}"),
                        },
                        _ => println!("ERR key and value must be u64"),
                    },
                    _ => println!("ERR usage: PUT key value"),
                },
                "GET" => match parts.next().map(str::parse) {
                    Some(Ok(k)) => match store.get(k) {
                        Ok(Some(v)) => println!("{v}"),
                        Ok(None) => println!("(nil)"),
                        Err(e) => println!("ERR {e}"),
                    },
                    _ => println!("ERR usage: GET key"),
                },
                "DEL" | "DELETE" => match parts.next().map(str::parse) {
                    Some(Ok(k)) => match store.delete(k) {
                        Ok(()) => println!("OK"),
                        Err(e) => println!("ERR {e}"),
                    },
                    _ => println!("ERR usage: DEL key"),
                },
                "SCAN" => match (parts.next().map(str::parse), parts.next().map(str::parse)) {
                    (Some(Ok(lo)), Some(Ok(hi))) => match store.scan(lo, hi) {
                        Ok(results) if results.is_empty() => println!("(empty)"),
                        Ok(results) => {
                            for (k, v) in &results {
                                println!("{k} -> {v}");
                            }
                            println!("({} entries)", results.len());
                        }
                        Err(e) => println!("ERR {e}"),
                    },
                    _ => println!("ERR usage: SCAN lo hi"),
                },
                "FLUSH" => match store.flush() {
                    Ok(()) => println!("OK (levels={})", store.num_levels()),
                    Err(e) => println!("ERR {e}"),
                },
                "COMPACT" => match store.compact() {
                    Ok(()) => println!("OK (levels={})", store.num_levels()),
                    Err(e) => println!("ERR {e}"),
                },
                "STATS" => println!("{store:?}"),
                "EXIT" | "QUIT" => {
                    store.close()?;
                    println!("bye");
                    break;
                }
                other => println!("unknown command: {other}"),
            }
        }
        prompt();
    }

    Ok(())
}

fn prompt() {
    print!("> ");
    io::stdout().flush().ok();
}
