//! `calibrate` and `prset treeagepr` command generation.
//!
//! One `calibrate` line per taxon in table order, then the
//! offset-exponential prior on the tree age. The prior's minimum defaults
//! to the oldest selected tip age; its mean sits `tree_age_offset` Ma above
//! the minimum.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use rand::Rng;

use super::{format_age, AgeCalibration, AnchorChoice, CalibrationConfig};
use crate::ages::TipAgeTable;

enum TipLine {
    Uniform { oldest: f64, youngest: f64 },
    Fixed { age: f64 },
}

fn round_age(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Render the tip calibration commands for a table of occurrence ages.
///
/// Random draws for [`AgeCalibration::FixedDateRandom`] come from the
/// thread RNG; use [`tip_calibrations_with_rng`] with a seeded generator to
/// make them reproducible.
pub fn tip_calibrations(table: &TipAgeTable, config: &CalibrationConfig) -> Result<String> {
    tip_calibrations_with_rng(table, config, &mut rand::thread_rng())
}

/// [`tip_calibrations`] with a caller-supplied random number generator.
pub fn tip_calibrations_with_rng<R: Rng>(
    table: &TipAgeTable,
    config: &CalibrationConfig,
    rng: &mut R,
) -> Result<String> {
    if !config.tree_age_offset.is_finite() || config.tree_age_offset <= 0.0 {
        bail!(
            "tree_age_offset must be a positive number of Ma (got {})",
            config.tree_age_offset
        );
    }
    let ranges = table.select_ranges(config.appearance)?;
    if let AnchorChoice::Taxon(name) = &config.anchor {
        if !ranges.iter().any(|r| &r.taxon == name) {
            bail!("anchor taxon `{}` is not in the age table", name);
        }
    }

    let oldest_tip = ranges.iter().map(|r| r.oldest).fold(0.0_f64, f64::max);
    let min_tree_age = match config.min_tree_age {
        Some(v) if !v.is_finite() => bail!("min_tree_age must be finite (got {})", v),
        Some(v) if v < oldest_tip => bail!(
            "min_tree_age {} Ma is below the oldest tip age {} Ma",
            v,
            oldest_tip
        ),
        Some(v) => v,
        None => oldest_tip,
    };

    let mut lines: Vec<(String, TipLine)> = Vec::with_capacity(ranges.len());
    for r in &ranges {
        let line = match config.age_calibration {
            AgeCalibration::UniformRange => {
                if r.is_exact() && config.collapse_uniform {
                    TipLine::Fixed { age: r.oldest }
                } else {
                    TipLine::Uniform {
                        oldest: r.oldest,
                        youngest: r.youngest,
                    }
                }
            }
            AgeCalibration::FixedDateEarlier => TipLine::Fixed { age: r.oldest },
            AgeCalibration::FixedDateLatter => TipLine::Fixed { age: r.youngest },
            AgeCalibration::FixedDateRandom => {
                let age = if r.is_exact() {
                    r.oldest
                } else {
                    round_age(rng.gen_range(r.youngest..=r.oldest))
                };
                TipLine::Fixed { age }
            }
        };
        lines.push((r.taxon.clone(), line));
    }

    // All-uniform calibrations leave MrBayes without an absolute time
    // reference, so one tip gets pinned at the older bound of its range.
    let mut anchor_idx: Option<usize> = None;
    if config.age_calibration == AgeCalibration::UniformRange {
        match &config.anchor {
            AnchorChoice::None => {}
            AnchorChoice::Taxon(name) => {
                anchor_idx = ranges.iter().position(|r| &r.taxon == name);
            }
            AnchorChoice::Auto => {
                let any_fixed = lines.iter().any(|(_, l)| matches!(l, TipLine::Fixed { .. }));
                if !any_fixed {
                    let mut best = 0usize;
                    for (i, r) in ranges.iter().enumerate() {
                        if r.oldest > ranges[best].oldest {
                            best = i;
                        }
                    }
                    anchor_idx = Some(best);
                }
            }
        }
    }
    if let Some(i) = anchor_idx {
        lines[i].1 = TipLine::Fixed {
            age: ranges[i].oldest,
        };
    }

    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 4);
    out.push("[tip age calibrations from fossil occurrence data]".to_string());
    for (i, (taxon, line)) in lines.iter().enumerate() {
        let call = match line {
            TipLine::Uniform { oldest, youngest } => {
                format!("uniform({}, {})", format_age(*youngest), format_age(*oldest))
            }
            TipLine::Fixed { age } => format!("fixed({})", format_age(*age)),
        };
        let note = if anchor_idx == Some(i) {
            " [anchor taxon]"
        } else {
            ""
        };
        out.push(format!("calibrate {} = {};{}", taxon, call, note));
    }
    out.push(String::new());
    out.push("[offset-exponential prior on the tree age]".to_string());
    out.push(format!(
        "prset treeagepr = offsetexp({}, {});",
        format_age(min_tree_age),
        format_age(min_tree_age + config.tree_age_offset)
    ));
    Ok(out.join("\n"))
}

/// Generate the calibration text and write it to `path`.
pub fn write_tip_calibrations(
    path: &Path,
    table: &TipAgeTable,
    config: &CalibrationConfig,
) -> Result<()> {
    let text = tip_calibrations(table, config)?;
    fs::write(path, format!("{}\n", text))
        .with_context(|| format!("failed to write calibrations: {}", path.display()))?;
    Ok(())
}
