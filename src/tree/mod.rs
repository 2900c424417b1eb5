//! Edge-table representation of rooted phylogenetic trees.
//!
//! Numbering follows the convention used across paleobiology tooling: tips
//! are `1..=n` in the order of `tip_labels`, the root is `n + 1`, and the
//! remaining internal nodes occupy `n + 2 ..= n + internal_count`. Each row
//! of the edge table is one ancestor-descendant pair, and a canonical table
//! lists rows cladewise (a parent row before every row of its subtree).

pub mod repair;
pub mod validate;

use serde::{Deserialize, Serialize};

/// One ancestor-descendant row of the edge table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub parent: u32,
    pub child: u32,
}

impl Edge {
    pub fn new(parent: u32, child: u32) -> Self {
        Self { parent, child }
    }
}

/// A rooted phylogenetic tree stored as an edge table.
///
/// `edge_lengths`, when present, aligns row-for-row with `edges` and holds
/// branch durations in the same unit as the tip ages (Ma for dated trees).
/// `root_edge` is the stem length below the root, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhyloTree {
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_lengths: Option<Vec<f64>>,
    pub tip_labels: Vec<String>,
    pub internal_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_edge: Option<f64>,
}

impl PhyloTree {
    /// Build a tree from raw parts without any checking. Pair with
    /// [`validate::check_edges`] before trusting the result.
    pub fn from_parts(
        edges: Vec<Edge>,
        edge_lengths: Option<Vec<f64>>,
        tip_labels: Vec<String>,
        internal_count: u32,
    ) -> Self {
        Self {
            edges,
            edge_lengths,
            tip_labels,
            internal_count,
            root_edge: None,
        }
    }

    pub fn tip_count(&self) -> u32 {
        self.tip_labels.len() as u32
    }

    /// Total node count implied by the tip and internal counts. Saturates
    /// rather than overflowing when a file declares an absurd count.
    pub fn node_total(&self) -> u32 {
        self.tip_count().saturating_add(self.internal_count)
    }

    /// Root node id under the numbering convention.
    pub fn root_id(&self) -> u32 {
        self.tip_count() + 1
    }

    pub fn is_tip(&self, id: u32) -> bool {
        id >= 1 && id <= self.tip_count()
    }

    /// Label of a tip id, or `None` for internal or out-of-range ids.
    pub fn tip_label(&self, id: u32) -> Option<&str> {
        if self.is_tip(id) {
            Some(self.tip_labels[(id - 1) as usize].as_str())
        } else {
            None
        }
    }

    /// Children of a node in edge-row order.
    pub fn children(&self, id: u32) -> impl Iterator<Item = u32> + '_ {
        self.edges
            .iter()
            .filter(move |e| e.parent == id)
            .map(|e| e.child)
    }

    /// Parent of a node, taken from the first edge row pointing at it.
    pub fn parent(&self, id: u32) -> Option<u32> {
        self.edges
            .iter()
            .find(|e| e.child == id)
            .map(|e| e.parent)
    }

    /// Row index of the `(parent, child)` edge, if present.
    pub fn edge_index(&self, parent: u32, child: u32) -> Option<usize> {
        self.edges
            .iter()
            .position(|e| e.parent == parent && e.child == child)
    }

    pub fn has_edge_lengths(&self) -> bool {
        self.edge_lengths.is_some()
    }
}
