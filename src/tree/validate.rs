//! Structural checks for edge tables.
//!
//! [`check_edges`] collects every violation it can find rather than stopping
//! at the first, so a report on a mangled table names all the problems at
//! once. Violations are hard errors; singleton internal nodes are reported
//! separately because [`super::repair::repair`] can collapse them.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use thiserror::Error;

use super::PhyloTree;

/// A single structural defect in an edge table.
///
/// Row indices are zero-based positions in `edges`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EdgeViolation {
    #[error("tree has no tip labels")]
    NoTips,
    #[error("tip label `{label}` is shared by tips {first} and {second}")]
    DuplicateTipLabel { label: String, first: u32, second: u32 },
    #[error("edge table is empty")]
    EmptyEdgeTable,
    #[error("node id 0 appears in edge row {row}")]
    ZeroNodeId { row: usize },
    #[error("edge row {row} is a self loop on node {node}")]
    SelfLoop { row: usize, node: u32 },
    #[error("edge row {row} repeats the ({parent}, {child}) edge")]
    DuplicateEdge { row: usize, parent: u32, child: u32 },
    #[error("node {node} lies outside the declared id range 1..={max}")]
    NodeOutOfRange { node: u32, max: u32 },
    #[error("tip {tip} (`{label}`) appears as a parent in edge row {row}")]
    TipAsParent { tip: u32, label: String, row: usize },
    #[error("tip {tip} (`{label}`) never appears as a child")]
    TipMissing { tip: u32, label: String },
    #[error("declared internal node {node} never appears as a parent")]
    UnusedInternal { node: u32 },
    #[error("declared internal count {declared} exceeds what {edges} edge rows can hold")]
    InternalCountTooLarge { declared: u32, edges: usize },
    #[error("root {root} has a parent (edge row {row})")]
    RootHasParent { root: u32, row: usize },
    #[error("node {node} has {count} parents")]
    MultipleParents { node: u32, count: usize },
    #[error("node {node} is not reachable from the root")]
    Unreachable { node: u32 },
    #[error("{found} edges but a rooted tree on {nodes} nodes needs {expected}")]
    EdgeCountMismatch {
        found: usize,
        nodes: u32,
        expected: usize,
    },
    #[error("{found} branch lengths for {edges} edges")]
    LengthCountMismatch { found: usize, edges: usize },
    #[error("branch length {value} in edge row {row} is not finite")]
    NonFiniteLength { row: usize, value: f64 },
    #[error("negative branch length {value} in edge row {row}")]
    NegativeLength { row: usize, value: f64 },
}

/// Everything [`check_edges`] found.
#[derive(Debug, Clone, Default)]
pub struct EdgeReport {
    /// Hard violations, in a fixed check order.
    pub violations: Vec<EdgeViolation>,
    /// Internal nodes with exactly one child, ascending. Legal but
    /// non-canonical; `repair` collapses them.
    pub singletons: Vec<u32>,
}

impl EdgeReport {
    /// No hard violations. The tree may still carry singletons.
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// No violations and no singletons.
    pub fn is_canonical(&self) -> bool {
        self.is_clean() && self.singletons.is_empty()
    }

    /// One bullet line per finding, for logs and error messages.
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .violations
            .iter()
            .map(|v| format!("- {}", v))
            .collect();
        if !self.singletons.is_empty() {
            let ids: Vec<String> = self.singletons.iter().map(|n| n.to_string()).collect();
            lines.push(format!(
                "- singleton internal nodes (one child): {}",
                ids.join(", ")
            ));
        }
        lines.join("\n")
    }
}

/// Run every structural check against a tree's edge table.
///
/// Checks run in a fixed order and sort their findings by node id, so the
/// report is deterministic for a given tree.
pub fn check_edges(tree: &PhyloTree) -> EdgeReport {
    let mut violations = Vec::new();
    let mut singletons = Vec::new();

    let n = tree.tip_count();
    if n == 0 {
        violations.push(EdgeViolation::NoTips);
    }

    let mut seen_labels: FxHashMap<&str, u32> = FxHashMap::default();
    for (i, label) in tree.tip_labels.iter().enumerate() {
        let tip = i as u32 + 1;
        if let Some(&first) = seen_labels.get(label.as_str()) {
            violations.push(EdgeViolation::DuplicateTipLabel {
                label: label.clone(),
                first,
                second: tip,
            });
        } else {
            seen_labels.insert(label.as_str(), tip);
        }
    }

    if tree.edges.is_empty() {
        violations.push(EdgeViolation::EmptyEdgeTable);
        if let Some(lens) = &tree.edge_lengths {
            if !lens.is_empty() {
                violations.push(EdgeViolation::LengthCountMismatch {
                    found: lens.len(),
                    edges: 0,
                });
            }
        }
        return EdgeReport {
            violations,
            singletons,
        };
    }

    let total = tree.node_total();
    let root = tree.root_id();

    // Row scan: malformed rows, duplicates, and degree tallies. Malformed
    // rows (zero ids, self loops, repeats) are excluded from the tallies so
    // one bad row does not cascade into spurious degree findings.
    let mut child_count: FxHashMap<u32, usize> = FxHashMap::default();
    let mut out_degree: FxHashMap<u32, usize> = FxHashMap::default();
    let mut first_child_row: FxHashMap<u32, usize> = FxHashMap::default();
    let mut first_parent_row: FxHashMap<u32, usize> = FxHashMap::default();
    let mut adjacency: FxHashMap<u32, SmallVec<[u32; 4]>> = FxHashMap::default();
    let mut seen_rows: FxHashSet<(u32, u32)> = FxHashSet::default();
    let mut out_of_range: Vec<u32> = Vec::new();

    for (row, e) in tree.edges.iter().enumerate() {
        if e.parent == 0 || e.child == 0 {
            violations.push(EdgeViolation::ZeroNodeId { row });
            continue;
        }
        if e.parent == e.child {
            violations.push(EdgeViolation::SelfLoop { row, node: e.parent });
            continue;
        }
        if !seen_rows.insert((e.parent, e.child)) {
            violations.push(EdgeViolation::DuplicateEdge {
                row,
                parent: e.parent,
                child: e.child,
            });
            continue;
        }
        for node in [e.parent, e.child] {
            if node > total {
                out_of_range.push(node);
            }
        }
        *child_count.entry(e.child).or_insert(0) += 1;
        *out_degree.entry(e.parent).or_insert(0) += 1;
        first_child_row.entry(e.child).or_insert(row);
        first_parent_row.entry(e.parent).or_insert(row);
        adjacency.entry(e.parent).or_default().push(e.child);
    }

    out_of_range.sort_unstable();
    out_of_range.dedup();
    for node in out_of_range {
        violations.push(EdgeViolation::NodeOutOfRange { node, max: total });
    }

    for tip in 1..=n {
        if let Some(&row) = first_parent_row.get(&tip) {
            violations.push(EdgeViolation::TipAsParent {
                tip,
                label: tree.tip_labels[(tip - 1) as usize].clone(),
                row,
            });
        }
        if !child_count.contains_key(&tip) {
            violations.push(EdgeViolation::TipMissing {
                tip,
                label: tree.tip_labels[(tip - 1) as usize].clone(),
            });
        }
    }

    if n > 0 {
        if let Some(&row) = first_child_row.get(&root) {
            violations.push(EdgeViolation::RootHasParent { root, row });
        }
    }

    let mut multi: Vec<(u32, usize)> = child_count
        .iter()
        .filter(|(node, count)| **count > 1 && **node != root)
        .map(|(node, count)| (*node, *count))
        .collect();
    multi.sort_unstable();
    for (node, count) in multi {
        violations.push(EdgeViolation::MultipleParents { node, count });
    }

    // An e-row table holds at most e + 1 nodes, so a declared internal
    // count past that is one violation, not one per missing id.
    if tree.internal_count as usize > tree.edges.len() + 1 {
        violations.push(EdgeViolation::InternalCountTooLarge {
            declared: tree.internal_count,
            edges: tree.edges.len(),
        });
    } else {
        for node in (n + 1)..=total {
            if !out_degree.contains_key(&node) {
                violations.push(EdgeViolation::UnusedInternal { node });
            }
        }
    }

    let expected = total.saturating_sub(1) as usize;
    if tree.edges.len() != expected {
        violations.push(EdgeViolation::EdgeCountMismatch {
            found: tree.edges.len(),
            nodes: total,
            expected,
        });
    }

    // Reachability sweep from the root over the well-formed rows.
    let mut visited: FxHashSet<u32> = FxHashSet::default();
    let mut stack: Vec<u32> = vec![root];
    while let Some(node) = stack.pop() {
        if !visited.insert(node) {
            continue;
        }
        if let Some(kids) = adjacency.get(&node) {
            stack.extend(kids.iter().copied());
        }
    }
    let mut unreached: Vec<u32> = child_count
        .keys()
        .chain(out_degree.keys())
        .copied()
        .filter(|node| !visited.contains(node))
        .collect();
    unreached.sort_unstable();
    unreached.dedup();
    for node in unreached {
        violations.push(EdgeViolation::Unreachable { node });
    }

    let mut single: Vec<u32> = out_degree
        .iter()
        .filter(|(node, degree)| **degree == 1 && **node > n)
        .map(|(node, _)| *node)
        .collect();
    single.sort_unstable();
    for node in single.drain(..) {
        // A one-tip tree is a bare root-to-tip edge; the root is exempt.
        if node == root && n == 1 {
            continue;
        }
        singletons.push(node);
    }

    if let Some(lens) = &tree.edge_lengths {
        if lens.len() != tree.edges.len() {
            violations.push(EdgeViolation::LengthCountMismatch {
                found: lens.len(),
                edges: tree.edges.len(),
            });
        }
        for (row, &value) in lens.iter().take(tree.edges.len()).enumerate() {
            if !value.is_finite() {
                violations.push(EdgeViolation::NonFiniteLength { row, value });
            } else if value < 0.0 {
                violations.push(EdgeViolation::NegativeLength { row, value });
            }
        }
    }

    EdgeReport {
        violations,
        singletons,
    }
}

/// Error out with the full report unless the edge table is clean.
pub fn assert_clean(tree: &PhyloTree) -> anyhow::Result<()> {
    let report = check_edges(tree);
    if report.is_clean() {
        Ok(())
    } else {
        anyhow::bail!("edge table failed checks:\n{}", report.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Edge;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn clean_four_tip() -> PhyloTree {
        PhyloTree::from_parts(
            vec![
                Edge::new(5, 6),
                Edge::new(6, 1),
                Edge::new(6, 2),
                Edge::new(5, 7),
                Edge::new(7, 3),
                Edge::new(7, 4),
            ],
            Some(vec![1.0, 2.0, 2.5, 1.5, 3.0, 0.5]),
            labels(&["A", "B", "C", "D"]),
            3,
        )
    }

    #[test]
    fn clean_tree_passes() {
        let report = check_edges(&clean_four_tip());
        assert!(report.is_clean(), "unexpected: {}", report.summary());
        assert!(report.is_canonical());
        assert!(assert_clean(&clean_four_tip()).is_ok());
    }

    #[test]
    fn polytomy_is_clean() {
        // (A,B,C) as a single trichotomy
        let t = PhyloTree::from_parts(
            vec![Edge::new(4, 1), Edge::new(4, 2), Edge::new(4, 3)],
            None,
            labels(&["A", "B", "C"]),
            1,
        );
        let report = check_edges(&t);
        assert!(report.is_clean(), "unexpected: {}", report.summary());
    }

    #[test]
    fn single_tip_tree_is_canonical() {
        let t = PhyloTree::from_parts(
            vec![Edge::new(2, 1)],
            Some(vec![4.5]),
            labels(&["Only"]),
            1,
        );
        let report = check_edges(&t);
        assert!(report.is_clean(), "unexpected: {}", report.summary());
        assert!(report.singletons.is_empty());
    }

    #[test]
    fn empty_edge_table() {
        let t = PhyloTree::from_parts(vec![], None, labels(&["A"]), 1);
        let report = check_edges(&t);
        assert!(report
            .violations
            .contains(&EdgeViolation::EmptyEdgeTable));
    }

    #[test]
    fn no_tips_reported() {
        let t = PhyloTree::from_parts(vec![Edge::new(2, 1)], None, vec![], 2);
        let report = check_edges(&t);
        assert!(report.violations.contains(&EdgeViolation::NoTips));
    }

    #[test]
    fn duplicate_tip_label() {
        let mut t = clean_four_tip();
        t.tip_labels[3] = "A".into();
        let report = check_edges(&t);
        assert!(report.violations.iter().any(|v| matches!(
            v,
            EdgeViolation::DuplicateTipLabel { first: 1, second: 4, .. }
        )));
    }

    #[test]
    fn zero_id_and_self_loop() {
        let mut t = clean_four_tip();
        t.edges[1] = Edge::new(6, 0);
        t.edges[4] = Edge::new(7, 7);
        let report = check_edges(&t);
        assert!(report
            .violations
            .contains(&EdgeViolation::ZeroNodeId { row: 1 }));
        assert!(report
            .violations
            .contains(&EdgeViolation::SelfLoop { row: 4, node: 7 }));
    }

    #[test]
    fn duplicate_edge_row() {
        let mut t = clean_four_tip();
        t.edges[2] = Edge::new(6, 1);
        let report = check_edges(&t);
        assert!(report.violations.contains(&EdgeViolation::DuplicateEdge {
            row: 2,
            parent: 6,
            child: 1
        }));
    }

    #[test]
    fn node_out_of_declared_range() {
        let mut t = clean_four_tip();
        t.edges[5] = Edge::new(7, 11);
        let report = check_edges(&t);
        assert!(report
            .violations
            .contains(&EdgeViolation::NodeOutOfRange { node: 11, max: 7 }));
        // tip 4 is now never a child
        assert!(report.violations.iter().any(|v| matches!(
            v,
            EdgeViolation::TipMissing { tip: 4, .. }
        )));
    }

    #[test]
    fn tip_used_as_parent() {
        let mut t = clean_four_tip();
        t.edges[5] = Edge::new(1, 4);
        let report = check_edges(&t);
        assert!(report.violations.iter().any(|v| matches!(
            v,
            EdgeViolation::TipAsParent { tip: 1, row: 5, .. }
        )));
    }

    #[test]
    fn root_with_a_parent() {
        let mut t = clean_four_tip();
        t.edges[5] = Edge::new(7, 5);
        let report = check_edges(&t);
        assert!(report.violations.iter().any(|v| matches!(
            v,
            EdgeViolation::RootHasParent { root: 5, .. }
        )));
    }

    #[test]
    fn node_with_two_parents() {
        let mut t = clean_four_tip();
        t.edges[5] = Edge::new(7, 1);
        let report = check_edges(&t);
        assert!(report
            .violations
            .contains(&EdgeViolation::MultipleParents { node: 1, count: 2 }));
    }

    #[test]
    fn declared_internal_never_used() {
        // internal_count says four internals but only 5..=7 parent anything
        let mut t = clean_four_tip();
        t.internal_count = 4;
        let report = check_edges(&t);
        assert!(report
            .violations
            .contains(&EdgeViolation::UnusedInternal { node: 8 }));
        assert!(report.violations.iter().any(|v| matches!(
            v,
            EdgeViolation::EdgeCountMismatch { found: 6, expected: 7, .. }
        )));
    }

    #[test]
    fn absurd_internal_count_is_a_single_violation() {
        // a corrupt file can declare any count; the sweep must not run it out
        let t = PhyloTree::from_parts(vec![Edge::new(2, 1)], None, labels(&["A"]), u32::MAX);
        let report = check_edges(&t);
        assert!(report
            .violations
            .contains(&EdgeViolation::InternalCountTooLarge {
                declared: u32::MAX,
                edges: 1,
            }));
        assert!(!report
            .violations
            .iter()
            .any(|v| matches!(v, EdgeViolation::UnusedInternal { .. })));
    }

    #[test]
    fn detached_component_is_unreachable() {
        // nodes 6 and 2 hang off each other, not off the root
        let t = PhyloTree::from_parts(
            vec![
                Edge::new(4, 1),
                Edge::new(4, 3),
                Edge::new(6, 2),
            ],
            None,
            labels(&["A", "B", "C"]),
            3,
        );
        let report = check_edges(&t);
        assert!(report
            .violations
            .contains(&EdgeViolation::Unreachable { node: 2 }));
        assert!(report
            .violations
            .contains(&EdgeViolation::Unreachable { node: 6 }));
    }

    #[test]
    fn edge_count_off_by_one() {
        let mut t = clean_four_tip();
        t.edges.pop();
        t.edge_lengths = None;
        let report = check_edges(&t);
        assert!(report.violations.iter().any(|v| matches!(
            v,
            EdgeViolation::EdgeCountMismatch { found: 5, expected: 6, .. }
        )));
    }

    #[test]
    fn length_problems() {
        let mut t = clean_four_tip();
        t.edge_lengths = Some(vec![1.0, -0.5, f64::NAN, 1.5, 3.0, 0.5]);
        let report = check_edges(&t);
        assert!(report.violations.iter().any(|v| matches!(
            v,
            EdgeViolation::NegativeLength { row: 1, .. }
        )));
        assert!(report.violations.iter().any(|v| matches!(
            v,
            EdgeViolation::NonFiniteLength { row: 2, .. }
        )));

        t.edge_lengths = Some(vec![1.0, 2.0]);
        let report = check_edges(&t);
        assert!(report
            .violations
            .contains(&EdgeViolation::LengthCountMismatch { found: 2, edges: 6 }));
    }

    #[test]
    fn zero_length_branches_are_legal() {
        let mut t = clean_four_tip();
        t.edge_lengths = Some(vec![1.0, 0.0, 2.5, 0.0, 3.0, 0.5]);
        let report = check_edges(&t);
        assert!(report.is_clean(), "unexpected: {}", report.summary());
        assert!(report.is_canonical());
    }

    #[test]
    fn singleton_chain_reported_but_clean() {
        // root 3 -> 4 -> 1, root 3 -> 2; node 4 is a singleton
        let t = PhyloTree::from_parts(
            vec![Edge::new(3, 4), Edge::new(4, 1), Edge::new(3, 2)],
            Some(vec![1.0, 2.0, 3.5]),
            labels(&["A", "B"]),
            2,
        );
        let report = check_edges(&t);
        assert!(report.is_clean(), "unexpected: {}", report.summary());
        assert!(!report.is_canonical());
        assert_eq!(report.singletons, vec![4]);
        assert!(report.summary().contains("singleton internal nodes"));
    }

    #[test]
    fn assert_clean_message_names_findings() {
        let mut t = clean_four_tip();
        t.edges[5] = Edge::new(7, 5);
        let err = assert_clean(&t).unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("root 5 has a parent"), "got: {}", msg);
    }
}
