//! Check a tree file's edge table, optionally repairing it.
//!
//! Usage:
//!   check_tree <tree file>
//!   check_tree <tree file> --repair <output file>
//!
//! Exits 1 when the table has violations and no repair was requested,
//! and 2 on usage errors.

use std::path::PathBuf;
use std::process;

use anyhow::Result;

use paleophylo::data::{read_tree, write_tree};
use paleophylo::tree::repair::repair;
use paleophylo::tree::validate::check_edges;

fn usage() -> ! {
    eprintln!("Usage: check_tree <tree file> [--repair <output file>]");
    process::exit(2);
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut input: Option<PathBuf> = None;
    let mut repair_out: Option<PathBuf> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--repair" => {
                i += 1;
                match args.get(i) {
                    Some(v) => repair_out = Some(PathBuf::from(v)),
                    None => usage(),
                }
            }
            "--help" | "-h" => usage(),
            flag if flag.starts_with("--") => {
                eprintln!("unknown option: {}", flag);
                usage();
            }
            other => {
                if input.is_some() {
                    usage();
                }
                input = Some(PathBuf::from(other));
            }
        }
        i += 1;
    }
    let input = match input {
        Some(p) => p,
        None => usage(),
    };

    println!("{}", "=".repeat(80));
    println!("EDGE TABLE CHECK: {}", input.display());
    println!("{}", "=".repeat(80));

    let tree = read_tree(&input)?;
    println!("Tips:           {}", tree.tip_count());
    println!("Internal nodes: {}", tree.internal_count);
    println!("Edges:          {}", tree.edges.len());
    println!(
        "Branch lengths: {}",
        if tree.has_edge_lengths() {
            "present"
        } else {
            "absent"
        }
    );
    println!();

    let report = check_edges(&tree);
    if report.is_canonical() {
        println!("Edge table is clean.");
        return Ok(());
    }
    if report.violations.is_empty() {
        println!("No violations, but the table is not canonical:");
    } else {
        println!("Found {} violation(s):", report.violations.len());
    }
    println!("{}", report.summary());
    println!();

    match repair_out {
        Some(out) => {
            let (fixed, log) = repair(&tree)?;
            if log.is_empty() {
                println!("Nothing to change.");
            } else {
                println!("Repair log:");
                for action in &log {
                    println!("  - {}", action);
                }
            }
            write_tree(&out, &fixed)?;
            println!("✓ Saved: {}", out.display());
        }
        None => {
            if report.violations.is_empty() {
                println!("Re-run with --repair <output file> to canonicalize.");
            } else {
                println!("Re-run with --repair <output file> to attempt a repair.");
                process::exit(1);
            }
        }
    }
    Ok(())
}
