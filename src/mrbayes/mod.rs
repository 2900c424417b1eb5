//! Text-block generation for MrBayes tip-dating runs.
//!
//! Nothing here talks to MrBayes; these functions render the `calibrate`,
//! `prset`, and `constraint` command text that a tip-dating NEXUS file
//! embeds. Bracketed text is a NEXUS comment, so the generated blocks can
//! be pasted verbatim.

pub mod calibrations;
pub mod constraints;

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ages::Appearance;

/// How each tip's occurrence age range becomes a `calibrate` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeCalibration {
    /// `uniform(youngest, oldest)` spanning the dating uncertainty.
    UniformRange,
    /// `fixed(x)` at the older bound of the range.
    FixedDateEarlier,
    /// `fixed(x)` at the younger bound of the range.
    FixedDateLatter,
    /// `fixed(x)` at a uniform draw from the range, rounded to 0.001 Ma.
    FixedDateRandom,
}

impl fmt::Display for AgeCalibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgeCalibration::UniformRange => "uniform-range",
            AgeCalibration::FixedDateEarlier => "fixed-earlier",
            AgeCalibration::FixedDateLatter => "fixed-latter",
            AgeCalibration::FixedDateRandom => "fixed-random",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for AgeCalibration {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uniform-range" => Ok(AgeCalibration::UniformRange),
            "fixed-earlier" => Ok(AgeCalibration::FixedDateEarlier),
            "fixed-latter" => Ok(AgeCalibration::FixedDateLatter),
            "fixed-random" => Ok(AgeCalibration::FixedDateRandom),
            other => anyhow::bail!(
                "unknown calibration type '{}' (expected uniform-range, fixed-earlier, \
                 fixed-latter or fixed-random)",
                other
            ),
        }
    }
}

/// Which tip, if any, gets pinned to an exact age under
/// [`AgeCalibration::UniformRange`].
///
/// With every tip age uncertain MrBayes has no absolute time reference, so
/// one tip is fixed at the older bound of its range.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorChoice {
    /// Fix the oldest tip, but only when no tip is already fixed.
    #[default]
    Auto,
    /// Never fix a tip.
    None,
    /// Fix this taxon regardless of the others.
    Taxon(String),
}

/// Options for [`calibrations::tip_calibrations`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub age_calibration: AgeCalibration,
    #[serde(default)]
    pub appearance: Appearance,
    /// Distance in Ma from the tree-age prior's minimum to its mean.
    pub tree_age_offset: f64,
    /// Hard minimum for the tree age. Defaults to the oldest selected tip
    /// age; anything younger than that is rejected.
    #[serde(default)]
    pub min_tree_age: Option<f64>,
    /// Emit `fixed(x)` instead of a zero-width `uniform(x, x)`.
    #[serde(default = "default_collapse_uniform")]
    pub collapse_uniform: bool,
    #[serde(default)]
    pub anchor: AnchorChoice,
}

fn default_collapse_uniform() -> bool {
    true
}

impl CalibrationConfig {
    /// Calibration type plus tree-age offset, everything else defaulted.
    pub fn new(age_calibration: AgeCalibration, tree_age_offset: f64) -> Self {
        Self {
            age_calibration,
            appearance: Appearance::default(),
            tree_age_offset,
            min_tree_age: None,
            collapse_uniform: true,
            anchor: AnchorChoice::default(),
        }
    }

    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read calibration config: {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse calibration config: {}", path.display()))?;
        Ok(config)
    }
}

/// Format an age in Ma for command text: plain decimal, no padding
/// (`443.8`, `10`, `0.125`).
pub fn format_age(age: f64) -> String {
    format!("{}", age)
}

/// Wrap finished sections in `begin mrbayes; ... end;`, one blank line
/// between sections.
pub fn mrbayes_block(sections: &[String]) -> String {
    let mut out = String::from("begin mrbayes;\n\n");
    for (i, section) in sections.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(section.trim_end());
        out.push('\n');
    }
    out.push_str("\nend;\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_age_is_plain_decimal() {
        assert_eq!(format_age(443.8), "443.8");
        assert_eq!(format_age(10.0), "10");
        assert_eq!(format_age(0.125), "0.125");
    }

    #[test]
    fn calibration_type_round_trips_through_str() {
        for (token, value) in [
            ("uniform-range", AgeCalibration::UniformRange),
            ("fixed-earlier", AgeCalibration::FixedDateEarlier),
            ("fixed-latter", AgeCalibration::FixedDateLatter),
            ("fixed-random", AgeCalibration::FixedDateRandom),
        ] {
            assert_eq!(token.parse::<AgeCalibration>().unwrap(), value);
            assert_eq!(format!("{}", value), token);
        }
        assert!("gamma".parse::<AgeCalibration>().is_err());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let json = r#"{"age_calibration": "uniform_range", "tree_age_offset": 10.0}"#;
        let config: CalibrationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.age_calibration, AgeCalibration::UniformRange);
        assert_eq!(config.appearance, Appearance::First);
        assert!(config.collapse_uniform);
        assert!(config.min_tree_age.is_none());
        assert_eq!(config.anchor, AnchorChoice::Auto);
    }

    #[test]
    fn anchor_variants_deserialize() {
        let json = r#"{
            "age_calibration": "fixed_date_earlier",
            "appearance": "last",
            "tree_age_offset": 5.0,
            "anchor": {"taxon": "Acernaspis_orestes"}
        }"#;
        let config: CalibrationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.anchor,
            AnchorChoice::Taxon("Acernaspis_orestes".into())
        );
        assert_eq!(config.appearance, Appearance::Last);

        let json = r#"{"age_calibration": "uniform_range", "tree_age_offset": 5.0, "anchor": "none"}"#;
        let config: CalibrationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.anchor, AnchorChoice::None);
    }

    #[test]
    fn block_wraps_sections() {
        let block = mrbayes_block(&["calibrate A = fixed(10);".to_string()]);
        assert!(block.starts_with("begin mrbayes;\n"));
        assert!(block.ends_with("end;\n"));
        assert!(block.contains("calibrate A = fixed(10);"));
    }
}
