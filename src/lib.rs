//! Edge-table checking and MrBayes tip-dating text for paleobiological
//! phylogenetics.
//!
//! Two independent pipelines:
//! - [`tree`]: validate and repair the edge-table representation of rooted
//!   phylogenies ([`check_edges`], [`repair`]).
//! - [`mrbayes`]: turn fossil occurrence age tables into the `calibrate`,
//!   `prset`, and `constraint` command text a MrBayes tip-dating run embeds
//!   ([`tip_calibrations`], [`topology_constraints`]).
//!
//! Age tables load from CSV ([`data`]), trees from JSON or Newick files
//! ([`newick`]). Ages are in Ma, so larger numbers are older.

pub mod ages;
pub mod data;
pub mod mrbayes;
pub mod newick;
pub mod tree;

pub use ages::{
    Appearance, AppearanceRange, Interval, IntervalAssignment, TaxonAges, TipAgeTable,
};
pub use mrbayes::calibrations::{
    tip_calibrations, tip_calibrations_with_rng, write_tip_calibrations,
};
pub use mrbayes::constraints::topology_constraints;
pub use mrbayes::{AgeCalibration, AnchorChoice, CalibrationConfig};
pub use tree::repair::{repair, RepairAction, RepairError};
pub use tree::validate::{assert_clean, check_edges, EdgeReport, EdgeViolation};
pub use tree::{Edge, PhyloTree};
