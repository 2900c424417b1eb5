//! Rebuilding canonical edge tables from damaged ones.
//!
//! [`repair`] trusts the structure of the table over its numbering: tips keep
//! their ids (labels are indexed by them), the root is found structurally as
//! the one node without a parent whose subtree holds every tip, and internal
//! ids are reassigned in preorder. Malformed rows, disconnected fragments,
//! childless internal nodes, and singleton internal nodes are removed along
//! the way, with every change logged as a [`RepairAction`].

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use thiserror::Error;

use super::validate::check_edges;
use super::{Edge, PhyloTree};

type ChildMap = FxHashMap<u32, SmallVec<[(u32, Option<f64>); 4]>>;

/// One change made while repairing a tree, in application order.
#[derive(Debug, Clone, PartialEq)]
pub enum RepairAction {
    /// Rows with a zero id, a self loop, or repeating an earlier edge.
    /// Indices refer to the input table.
    DroppedMalformedRows { rows: Vec<usize> },
    /// Nodes outside the subtree of the chosen root.
    DroppedUnreachable { nodes: Vec<u32> },
    /// An internal node with no children left.
    DroppedChildlessInternal { node: u32 },
    /// A one-child internal node spliced out; the two branch lengths merge.
    CollapsedSingleton {
        node: u32,
        merged_length: Option<f64>,
    },
    /// A one-child root replaced by its child; the stem length folds into
    /// `root_edge`.
    PromotedNewRoot {
        old_root: u32,
        new_root: u32,
        stem_added: Option<f64>,
    },
    /// Internal node ids reassigned to the preorder convention.
    RenumberedNodes { remapped: usize },
    /// Rows rewritten in cladewise order.
    ReorderedEdges,
}

impl fmt::Display for RepairAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairAction::DroppedMalformedRows { rows } => {
                write!(f, "dropped {} malformed edge row(s)", rows.len())
            }
            RepairAction::DroppedUnreachable { nodes } => {
                write!(f, "dropped {} node(s) not connected to the root", nodes.len())
            }
            RepairAction::DroppedChildlessInternal { node } => {
                write!(f, "dropped childless internal node {}", node)
            }
            RepairAction::CollapsedSingleton {
                node,
                merged_length: Some(len),
            } => write!(f, "collapsed singleton node {} (merged length {})", node, len),
            RepairAction::CollapsedSingleton {
                node,
                merged_length: None,
            } => write!(f, "collapsed singleton node {}", node),
            RepairAction::PromotedNewRoot {
                old_root, new_root, ..
            } => write!(f, "collapsed singleton root {} into {}", old_root, new_root),
            RepairAction::RenumberedNodes { remapped } => {
                write!(f, "renumbered {} node(s)", remapped)
            }
            RepairAction::ReorderedEdges => write!(f, "reordered edge rows cladewise"),
        }
    }
}

/// Damage that cannot be repaired without guessing at the topology.
#[derive(Debug, Error)]
pub enum RepairError {
    #[error("tree has no tip labels")]
    NoTips,
    #[error("edge table has no usable rows")]
    NoEdges,
    #[error("{found} branch lengths for {edges} edges; cannot pair lengths with rows")]
    LengthCountMismatch { found: usize, edges: usize },
    #[error("node {node} has multiple parents; the true topology is ambiguous")]
    MultipleParents { node: u32 },
    #[error("no root candidate: every node in the edge table has a parent")]
    NoRoot,
    #[error("tip {tip} (`{label}`) is not connected to the root")]
    TipUnreachable { tip: u32, label: String },
    #[error("no single subtree contains every tip (root candidates: {candidates:?})")]
    DisjointTrees { candidates: Vec<u32> },
    #[error("repair left an invalid table:\n{report}")]
    Unrepairable { report: String },
}

fn reachable_from(start: u32, kids: &ChildMap) -> FxHashSet<u32> {
    let mut visited = FxHashSet::default();
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        if !visited.insert(node) {
            continue;
        }
        if let Some(ks) = kids.get(&node) {
            stack.extend(ks.iter().map(|(c, _)| *c));
        }
    }
    visited
}

/// Rebuild a canonical edge table, logging every change.
///
/// Returns the repaired tree and the action log, or an error when the
/// damage leaves the topology ambiguous. A tree that is already canonical
/// comes back unchanged with an empty log.
pub fn repair(tree: &PhyloTree) -> Result<(PhyloTree, Vec<RepairAction>), RepairError> {
    if tree.tip_labels.is_empty() {
        return Err(RepairError::NoTips);
    }
    if tree.edges.is_empty() {
        return Err(RepairError::NoEdges);
    }
    if let Some(lens) = &tree.edge_lengths {
        if lens.len() != tree.edges.len() {
            return Err(RepairError::LengthCountMismatch {
                found: lens.len(),
                edges: tree.edges.len(),
            });
        }
    }

    let n = tree.tip_count();
    let has_lengths = tree.edge_lengths.is_some();
    let mut actions: Vec<RepairAction> = Vec::new();

    // Pair rows with their lengths, dropping rows no tree can contain.
    let mut rows: Vec<(Edge, Option<f64>)> = Vec::with_capacity(tree.edges.len());
    let mut dropped_rows: Vec<usize> = Vec::new();
    let mut seen: FxHashSet<(u32, u32)> = FxHashSet::default();
    for (i, e) in tree.edges.iter().enumerate() {
        let malformed = e.parent == 0
            || e.child == 0
            || e.parent == e.child
            || !seen.insert((e.parent, e.child));
        if malformed {
            dropped_rows.push(i);
            continue;
        }
        let len = tree.edge_lengths.as_ref().map(|l| l[i]);
        rows.push((*e, len));
    }
    if !dropped_rows.is_empty() {
        actions.push(RepairAction::DroppedMalformedRows { rows: dropped_rows });
    }
    if rows.is_empty() {
        return Err(RepairError::NoEdges);
    }

    let mut parent_of: FxHashMap<u32, u32> = FxHashMap::default();
    for (e, _) in &rows {
        if parent_of.insert(e.child, e.parent).is_some() {
            return Err(RepairError::MultipleParents { node: e.child });
        }
    }
    for tip in 1..=n {
        if !parent_of.contains_key(&tip) {
            return Err(RepairError::TipUnreachable {
                tip,
                label: tree.tip_labels[(tip - 1) as usize].clone(),
            });
        }
    }

    let mut kids: ChildMap = FxHashMap::default();
    for (e, len) in &rows {
        kids.entry(e.parent).or_default().push((e.child, *len));
    }

    // The root is the parentless node whose subtree holds every tip.
    let mut candidates: Vec<u32> = kids
        .keys()
        .filter(|p| !parent_of.contains_key(p))
        .copied()
        .collect();
    candidates.sort_unstable();
    if candidates.is_empty() {
        return Err(RepairError::NoRoot);
    }
    let mut chosen: Option<(u32, FxHashSet<u32>)> = None;
    for &cand in &candidates {
        let visited = reachable_from(cand, &kids);
        if (1..=n).all(|t| visited.contains(&t)) {
            chosen = Some((cand, visited));
            break;
        }
    }
    let (mut root, reach) = match chosen {
        Some(pair) => pair,
        None => {
            if candidates.len() == 1 {
                let visited = reachable_from(candidates[0], &kids);
                let tip = (1..=n).find(|t| !visited.contains(t)).unwrap_or(1);
                return Err(RepairError::TipUnreachable {
                    tip,
                    label: tree.tip_labels[(tip - 1) as usize].clone(),
                });
            }
            return Err(RepairError::DisjointTrees { candidates });
        }
    };

    let mut appearing: FxHashSet<u32> = FxHashSet::default();
    for (e, _) in &rows {
        appearing.insert(e.parent);
        appearing.insert(e.child);
    }
    let mut dropped_nodes: Vec<u32> = appearing.difference(&reach).copied().collect();
    dropped_nodes.sort_unstable();
    if !dropped_nodes.is_empty() {
        rows.retain(|(e, _)| reach.contains(&e.parent));
        actions.push(RepairAction::DroppedUnreachable {
            nodes: dropped_nodes,
        });
    }

    // Prune childless internals and splice out singletons until stable.
    // One change per pass keeps the degree maps honest; tables are small.
    let mut root_edge = tree.root_edge;
    loop {
        let mut out_deg: FxHashMap<u32, usize> = FxHashMap::default();
        let mut in_row: FxHashMap<u32, usize> = FxHashMap::default();
        for (i, (e, _)) in rows.iter().enumerate() {
            *out_deg.entry(e.parent).or_insert(0) += 1;
            in_row.insert(e.child, i);
        }

        let mut childless: Vec<u32> = rows
            .iter()
            .map(|(e, _)| e.child)
            .filter(|c| *c > n && !out_deg.contains_key(c))
            .collect();
        childless.sort_unstable();
        if let Some(&node) = childless.first() {
            if let Some(&row) = in_row.get(&node) {
                rows.remove(row);
                actions.push(RepairAction::DroppedChildlessInternal { node });
                continue;
            }
        }

        let mut singles: Vec<u32> = out_deg
            .iter()
            .filter(|(node, d)| **d == 1 && **node > n)
            .map(|(node, _)| *node)
            .collect();
        singles.sort_unstable();
        let mut acted = false;
        for &node in &singles {
            if node == root {
                let down = rows.iter().position(|(e, _)| e.parent == root);
                if let Some(down) = down {
                    let (down_e, down_len) = rows[down];
                    if down_e.child <= n {
                        // a bare root-to-tip edge is the canonical one-tip tree
                        continue;
                    }
                    rows.remove(down);
                    if let Some(len) = down_len {
                        root_edge = Some(root_edge.unwrap_or(0.0) + len);
                    }
                    actions.push(RepairAction::PromotedNewRoot {
                        old_root: root,
                        new_root: down_e.child,
                        stem_added: down_len,
                    });
                    root = down_e.child;
                    acted = true;
                    break;
                }
            } else {
                let down = rows.iter().position(|(e, _)| e.parent == node);
                let up = rows.iter().position(|(e, _)| e.child == node);
                if let (Some(down), Some(up)) = (down, up) {
                    let (down_e, down_len) = rows[down];
                    let merged = match (rows[up].1, down_len) {
                        (Some(a), Some(b)) => Some(a + b),
                        (a, b) => a.or(b),
                    };
                    rows[up].0.child = down_e.child;
                    rows[up].1 = merged;
                    rows.remove(down);
                    actions.push(RepairAction::CollapsedSingleton {
                        node,
                        merged_length: merged,
                    });
                    acted = true;
                    break;
                }
            }
        }
        if acted {
            continue;
        }
        break;
    }

    // Renumber in preorder and emit rows cladewise in one walk.
    let mut kids2: ChildMap = FxHashMap::default();
    for (e, len) in &rows {
        kids2.entry(e.parent).or_default().push((e.child, *len));
    }
    let mut new_id: FxHashMap<u32, u32> = FxHashMap::default();
    for tip in 1..=n {
        new_id.insert(tip, tip);
    }
    let mut next_internal = n + 1;
    new_id.insert(root, next_internal);

    let mut new_edges: Vec<Edge> = Vec::with_capacity(rows.len());
    let mut new_lens: Vec<f64> = Vec::with_capacity(rows.len());
    let mut stack: Vec<(u32, u32, usize)> = vec![(root, next_internal, 0)];
    while let Some((node, mapped, idx)) = stack.pop() {
        let ks = match kids2.get(&node) {
            Some(k) => k,
            None => continue,
        };
        if idx >= ks.len() {
            continue;
        }
        let (child, len) = ks[idx];
        stack.push((node, mapped, idx + 1));
        let child_mapped = if child <= n {
            child
        } else {
            match new_id.get(&child) {
                Some(&v) => v,
                None => {
                    next_internal += 1;
                    new_id.insert(child, next_internal);
                    next_internal
                }
            }
        };
        new_edges.push(Edge::new(mapped, child_mapped));
        if has_lengths {
            new_lens.push(len.unwrap_or(0.0));
        }
        stack.push((child, child_mapped, 0));
    }
    let internal_total = next_internal - n;

    let remapped = new_id.iter().filter(|(old, new)| old != new).count();
    if remapped > 0 {
        actions.push(RepairAction::RenumberedNodes { remapped });
    }
    let lookup = |id: u32| new_id.get(&id).copied().unwrap_or(id);
    let mapped_rows: Vec<Edge> = rows
        .iter()
        .map(|(e, _)| Edge::new(lookup(e.parent), lookup(e.child)))
        .collect();
    if mapped_rows != new_edges {
        actions.push(RepairAction::ReorderedEdges);
    }

    let fixed = PhyloTree {
        edges: new_edges,
        edge_lengths: if has_lengths { Some(new_lens) } else { None },
        tip_labels: tree.tip_labels.clone(),
        internal_count: internal_total,
        root_edge,
    };
    let report = check_edges(&fixed);
    if !report.is_canonical() {
        return Err(RepairError::Unrepairable {
            report: report.summary(),
        });
    }
    Ok((fixed, actions))
}
