//! Fossil occurrence age tables.
//!
//! Ages are in Ma (million years before present), so larger numbers are
//! older. Each taxon carries the age range of its first appearance datum
//! (FAD) and optionally of its last appearance datum (LAD); a range spans
//! the dating uncertainty of that occurrence, oldest bound first.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Characters that break NEXUS and Newick files when they appear in a
/// taxon name. Whitespace is rejected as well.
pub const RESERVED_NAME_CHARS: &[char] = &[
    '(', ')', '[', ']', ':', ';', ',', '=', '\'', '"',
];

/// Which occurrence of a taxon to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Appearance {
    /// First appearance datum (oldest occurrence).
    #[default]
    First,
    /// Last appearance datum (youngest occurrence).
    Last,
}

impl std::str::FromStr for Appearance {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Appearance::First),
            "last" => Ok(Appearance::Last),
            other => anyhow::bail!("unknown appearance '{}' (expected first or last)", other),
        }
    }
}

/// Occurrence age bounds for one taxon, oldest bound first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonAges {
    pub taxon: String,
    pub fad_max: f64,
    pub fad_min: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lad_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lad_min: Option<f64>,
}

impl TaxonAges {
    /// A taxon with first-appearance bounds only.
    pub fn first_only(taxon: impl Into<String>, fad_max: f64, fad_min: f64) -> Self {
        Self {
            taxon: taxon.into(),
            fad_max,
            fad_min,
            lad_max: None,
            lad_min: None,
        }
    }

    pub fn has_last(&self) -> bool {
        self.lad_max.is_some() && self.lad_min.is_some()
    }
}

/// The age range selected for one taxon, oldest bound first.
#[derive(Debug, Clone, PartialEq)]
pub struct AppearanceRange {
    pub taxon: String,
    pub oldest: f64,
    pub youngest: f64,
}

impl AppearanceRange {
    /// A point occurrence: both bounds agree.
    pub fn is_exact(&self) -> bool {
        self.oldest == self.youngest
    }
}

/// A named span of the geologic timescale, in Ma, start older than end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub name: String,
    pub start: f64,
    pub end: f64,
}

/// A taxon placed on the timescale by its first and last intervals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalAssignment {
    pub taxon: String,
    pub first: String,
    pub last: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AgeTableError {
    #[error("age table has no rows")]
    Empty,
    #[error("taxon `{taxon}` appears more than once")]
    DuplicateTaxon { taxon: String },
    #[error("taxon name `{taxon}` is empty or contains whitespace or reserved punctuation")]
    UnusableName { taxon: String },
    #[error("taxon `{taxon}`: {field} is not a finite number")]
    NonFiniteAge { taxon: String, field: &'static str },
    #[error("taxon `{taxon}`: {field} is negative")]
    NegativeAge { taxon: String, field: &'static str },
    #[error("taxon `{taxon}`: {which} minimum {min} Ma is older than maximum {max} Ma")]
    InvertedRange {
        taxon: String,
        which: &'static str,
        min: f64,
        max: f64,
    },
    #[error("taxon `{taxon}`: only one of the last-appearance bounds is present")]
    PartialLast { taxon: String },
    #[error("taxon `{taxon}`: last appearance is older than first appearance")]
    LastOlderThanFirst { taxon: String },
    #[error("taxon `{taxon}` has no last-appearance bounds")]
    MissingLast { taxon: String },
    #[error("timescale has no intervals")]
    EmptyTimescale,
    #[error("interval `{name}` is listed more than once")]
    DuplicateInterval { name: String },
    #[error("interval `{name}`: {field} is not a finite, non-negative age")]
    BadIntervalBound { name: String, field: &'static str },
    #[error("interval `{name}`: end {end} Ma is older than start {start} Ma")]
    InvertedInterval { name: String, start: f64, end: f64 },
    #[error("interval `{name}` is not in the timescale")]
    UnknownInterval { name: String },
}

fn name_is_usable(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || RESERVED_NAME_CHARS.contains(&c))
}

fn check_age(taxon: &str, field: &'static str, value: f64) -> Result<(), AgeTableError> {
    if !value.is_finite() {
        return Err(AgeTableError::NonFiniteAge {
            taxon: taxon.to_string(),
            field,
        });
    }
    if value < 0.0 {
        return Err(AgeTableError::NegativeAge {
            taxon: taxon.to_string(),
            field,
        });
    }
    Ok(())
}

/// A table of occurrence ages, one row per taxon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TipAgeTable {
    pub rows: Vec<TaxonAges>,
}

impl TipAgeTable {
    pub fn new(rows: Vec<TaxonAges>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Check the whole table, stopping at the first defect.
    pub fn validate(&self) -> Result<(), AgeTableError> {
        if self.rows.is_empty() {
            return Err(AgeTableError::Empty);
        }
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        for row in &self.rows {
            if !name_is_usable(&row.taxon) {
                return Err(AgeTableError::UnusableName {
                    taxon: row.taxon.clone(),
                });
            }
            if !seen.insert(row.taxon.as_str()) {
                return Err(AgeTableError::DuplicateTaxon {
                    taxon: row.taxon.clone(),
                });
            }
            check_age(&row.taxon, "fad_max", row.fad_max)?;
            check_age(&row.taxon, "fad_min", row.fad_min)?;
            if row.fad_min > row.fad_max {
                return Err(AgeTableError::InvertedRange {
                    taxon: row.taxon.clone(),
                    which: "first appearance",
                    min: row.fad_min,
                    max: row.fad_max,
                });
            }
            match (row.lad_max, row.lad_min) {
                (None, None) => {}
                (Some(_), None) | (None, Some(_)) => {
                    return Err(AgeTableError::PartialLast {
                        taxon: row.taxon.clone(),
                    });
                }
                (Some(lad_max), Some(lad_min)) => {
                    check_age(&row.taxon, "lad_max", lad_max)?;
                    check_age(&row.taxon, "lad_min", lad_min)?;
                    if lad_min > lad_max {
                        return Err(AgeTableError::InvertedRange {
                            taxon: row.taxon.clone(),
                            which: "last appearance",
                            min: lad_min,
                            max: lad_max,
                        });
                    }
                    if lad_max > row.fad_max || lad_min > row.fad_min {
                        return Err(AgeTableError::LastOlderThanFirst {
                            taxon: row.taxon.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Validate, then pull the requested appearance's age range per taxon,
    /// preserving table order.
    pub fn select_ranges(
        &self,
        appearance: Appearance,
    ) -> Result<Vec<AppearanceRange>, AgeTableError> {
        self.validate()?;
        let mut out = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let (oldest, youngest) = match appearance {
                Appearance::First => (row.fad_max, row.fad_min),
                Appearance::Last => match (row.lad_max, row.lad_min) {
                    (Some(max), Some(min)) => (max, min),
                    _ => {
                        return Err(AgeTableError::MissingLast {
                            taxon: row.taxon.clone(),
                        });
                    }
                },
            };
            out.push(AppearanceRange {
                taxon: row.taxon.clone(),
                oldest,
                youngest,
            });
        }
        Ok(out)
    }

    /// Resolve interval assignments against a timescale into age bounds.
    ///
    /// A taxon assigned `first` and `last` intervals gets FAD bounds from
    /// the first interval and LAD bounds from the last; a taxon confined to
    /// one interval simply names it twice. The resulting table is validated
    /// before it is returned.
    pub fn from_intervals(
        intervals: &[Interval],
        assignments: &[IntervalAssignment],
    ) -> Result<Self, AgeTableError> {
        if intervals.is_empty() {
            return Err(AgeTableError::EmptyTimescale);
        }
        let mut by_name: FxHashMap<&str, (f64, f64)> = FxHashMap::default();
        for iv in intervals {
            for (field, value) in [("start", iv.start), ("end", iv.end)] {
                if !value.is_finite() || value < 0.0 {
                    return Err(AgeTableError::BadIntervalBound {
                        name: iv.name.clone(),
                        field,
                    });
                }
            }
            if iv.end > iv.start {
                return Err(AgeTableError::InvertedInterval {
                    name: iv.name.clone(),
                    start: iv.start,
                    end: iv.end,
                });
            }
            if by_name.insert(iv.name.as_str(), (iv.start, iv.end)).is_some() {
                return Err(AgeTableError::DuplicateInterval {
                    name: iv.name.clone(),
                });
            }
        }

        let mut rows = Vec::with_capacity(assignments.len());
        for a in assignments {
            let first = by_name.get(a.first.as_str()).ok_or_else(|| {
                AgeTableError::UnknownInterval {
                    name: a.first.clone(),
                }
            })?;
            let last = by_name.get(a.last.as_str()).ok_or_else(|| {
                AgeTableError::UnknownInterval {
                    name: a.last.clone(),
                }
            })?;
            rows.push(TaxonAges {
                taxon: a.taxon.clone(),
                fad_max: first.0,
                fad_min: first.1,
                lad_max: Some(last.0),
                lad_min: Some(last.1),
            });
        }
        let table = Self { rows };
        table.validate()?;
        Ok(table)
    }
}
