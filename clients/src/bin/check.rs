//! `xtypes-check`: validates a graph dump written by the xtypes serializer
//! and optionally cuts a subgraph out of it.
//!
//! **Checks:**
//! - every node is stored under its own identifier
//! - every fingerprint is the CRC-32 of its identifier
//! - every edge target is present in the dump
//!
//! **Usage:**
//! ```
//! xtypes-check --input <dump.json> [--root <uri> [--max-depth <n>] --out <file>] [--verbose]
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    clippy::missing_errors_doc
)]

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use xtypes::serializer::wire::{check_dump, subgraph, GraphDump};

/// Check an xtypes graph dump.
#[derive(Parser)]
#[command(name = "xtypes-check", about = "Check an xtypes graph dump")]
struct Args {
    /// Dump file (JSON object mapping identifiers to nodes).
    #[arg(long)]
    input: PathBuf,

    /// Identifier to extract a subgraph from.
    #[arg(long)]
    root: Option<String>,

    /// Expansion depth of the subgraph; negative means unbounded.
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    max_depth: i32,

    /// Output file for the subgraph (stdout if omitted).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let dump: GraphDump = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {} as a graph dump", args.input.display()))?;

    let edges: usize = dump
        .values()
        .flat_map(|node| node.relations.values())
        .map(Vec::len)
        .sum();
    println!(
        "{}: {} nodes, {} edges",
        args.input.display(),
        dump.len(),
        edges
    );

    let issues = check_dump(&dump);
    for issue in &issues {
        println!("  FAIL  {issue}");
    }

    if let Some(root) = &args.root {
        if !dump.contains_key(root) {
            bail!("Root {root} is not part of the dump");
        }
        let cut = subgraph(&dump, root, args.max_depth);
        debug!(root = %root, nodes = cut.len(), "extracted subgraph");
        let json = serde_json::to_string_pretty(&cut).context("Failed to serialize subgraph")?;
        match &args.out {
            Some(path) => {
                fs::write(path, &json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("  Written: {}", path.display());
            }
            None => println!("{json}"),
        }
    } else if args.out.is_some() {
        warn!("--out has no effect without --root");
    }

    if issues.is_empty() {
        println!("  PASS  dump is consistent");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{} issue(s) found", issues.len());
        Ok(ExitCode::FAILURE)
    }
}
