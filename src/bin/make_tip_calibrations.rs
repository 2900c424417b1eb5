//! Generate a MrBayes tip-dating calibration block from fossil ages.
//!
//! Ages come either from a per-taxon CSV of occurrence bounds or from a
//! timescale CSV plus interval assignments. With `--constraints` the output
//! also pins the topology to a reference tree, and the two sections are
//! wrapped in one `begin mrbayes; ... end;` block.

use std::fs;
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;

use paleophylo::ages::Appearance;
use paleophylo::data::{load_interval_ages, load_tip_ages, read_tree};
use paleophylo::mrbayes::calibrations::{tip_calibrations, tip_calibrations_with_rng};
use paleophylo::mrbayes::constraints::topology_constraints;
use paleophylo::mrbayes::{mrbayes_block, AgeCalibration, AnchorChoice, CalibrationConfig};

const USAGE: &str = "\
Usage:
  make_tip_calibrations <ages csv> <output file> [options]
  make_tip_calibrations --intervals <csv> --assignments <csv> <output file> [options]

Options:
  --calibration <type>   uniform-range | fixed-earlier | fixed-latter | fixed-random
  --offset <Ma>          tree-age prior offset above its minimum
  --appearance <which>   first (default) | last
  --min-tree-age <Ma>    floor for the tree-age prior
  --no-collapse-uniform  keep zero-width uniform(x, x) calibrations
  --anchor <taxon|none>  override the automatic anchor tip
  --seed <n>             make fixed-random draws reproducible
  --config <json>        load options from JSON; explicit flags override
  --constraints <tree>   append topology constraints from a tree file
  --block                wrap the output in begin mrbayes; ... end;";

fn usage() -> ! {
    eprintln!("{}", USAGE);
    process::exit(2);
}

fn take_value(args: &[String], i: &mut usize) -> String {
    *i += 1;
    match args.get(*i) {
        Some(v) => v.clone(),
        None => usage(),
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
    }

    let mut positional: Vec<PathBuf> = Vec::new();
    let mut calibration: Option<AgeCalibration> = None;
    let mut offset: Option<f64> = None;
    let mut appearance: Option<Appearance> = None;
    let mut min_tree_age: Option<f64> = None;
    let mut no_collapse = false;
    let mut anchor: Option<AnchorChoice> = None;
    let mut seed: Option<u64> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut intervals: Option<PathBuf> = None;
    let mut assignments: Option<PathBuf> = None;
    let mut constraints_tree: Option<PathBuf> = None;
    let mut wrap_block = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--calibration" => calibration = Some(take_value(&args, &mut i).parse()?),
            "--offset" => {
                let v = take_value(&args, &mut i);
                offset = Some(v.parse().with_context(|| format!("bad --offset '{}'", v))?);
            }
            "--appearance" => appearance = Some(take_value(&args, &mut i).parse()?),
            "--min-tree-age" => {
                let v = take_value(&args, &mut i);
                min_tree_age =
                    Some(v.parse().with_context(|| format!("bad --min-tree-age '{}'", v))?);
            }
            "--no-collapse-uniform" => no_collapse = true,
            "--anchor" => {
                let v = take_value(&args, &mut i);
                anchor = Some(if v == "none" {
                    AnchorChoice::None
                } else {
                    AnchorChoice::Taxon(v)
                });
            }
            "--seed" => {
                let v = take_value(&args, &mut i);
                seed = Some(v.parse().with_context(|| format!("bad --seed '{}'", v))?);
            }
            "--config" => config_path = Some(PathBuf::from(take_value(&args, &mut i))),
            "--intervals" => intervals = Some(PathBuf::from(take_value(&args, &mut i))),
            "--assignments" => assignments = Some(PathBuf::from(take_value(&args, &mut i))),
            "--constraints" => constraints_tree = Some(PathBuf::from(take_value(&args, &mut i))),
            "--block" => wrap_block = true,
            "--help" | "-h" => usage(),
            flag if flag.starts_with("--") => {
                eprintln!("unknown option: {}", flag);
                usage();
            }
            other => positional.push(PathBuf::from(other)),
        }
        i += 1;
    }

    let using_intervals = intervals.is_some() || assignments.is_some();
    if using_intervals && (intervals.is_none() || assignments.is_none()) {
        bail!("--intervals and --assignments go together");
    }
    let (ages_path, output) = if using_intervals {
        if positional.len() != 1 {
            usage();
        }
        (None, positional[0].clone())
    } else {
        if positional.len() != 2 {
            usage();
        }
        (Some(positional[0].clone()), positional[1].clone())
    };

    let mut config = match &config_path {
        Some(path) => CalibrationConfig::load(path)?,
        None => {
            let calibration = match calibration {
                Some(c) => c,
                None => bail!("--calibration is required (or use --config)"),
            };
            let offset = match offset {
                Some(o) => o,
                None => bail!("--offset is required (or use --config)"),
            };
            CalibrationConfig::new(calibration, offset)
        }
    };
    if let Some(c) = calibration {
        config.age_calibration = c;
    }
    if let Some(o) = offset {
        config.tree_age_offset = o;
    }
    if let Some(a) = appearance {
        config.appearance = a;
    }
    if let Some(m) = min_tree_age {
        config.min_tree_age = Some(m);
    }
    if no_collapse {
        config.collapse_uniform = false;
    }
    if let Some(a) = anchor {
        config.anchor = a;
    }

    let table = match (&ages_path, &intervals, &assignments) {
        (Some(path), _, _) => load_tip_ages(path)?,
        (None, Some(iv), Some(asg)) => load_interval_ages(iv, asg)?,
        _ => usage(),
    };

    println!("{}", "=".repeat(80));
    println!("MRBAYES TIP CALIBRATIONS");
    println!("{}", "=".repeat(80));
    println!("Taxa:        {}", table.len());
    println!("Calibration: {}", config.age_calibration);
    println!(
        "Appearance:  {}",
        match config.appearance {
            Appearance::First => "first",
            Appearance::Last => "last",
        }
    );
    println!("Offset:      {} Ma", config.tree_age_offset);

    let calibration_text = match seed {
        Some(s) => {
            let mut rng = StdRng::seed_from_u64(s);
            tip_calibrations_with_rng(&table, &config, &mut rng)?
        }
        None => tip_calibrations(&table, &config)?,
    };

    let mut sections = vec![calibration_text];
    if let Some(tree_path) = &constraints_tree {
        let tree = read_tree(tree_path)?;
        sections.push(topology_constraints(&tree)?);
        println!("Constraints: {} ({} tips)", tree_path.display(), tree.tip_count());
    }
    println!();

    let text = if wrap_block || sections.len() > 1 {
        mrbayes_block(&sections)
    } else {
        format!("{}\n", sections[0])
    };
    fs::write(&output, &text).with_context(|| format!("failed to write {}", output.display()))?;
    println!("✓ Saved: {}", output.display());
    Ok(())
}
