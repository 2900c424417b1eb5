//! `constraint` command generation for fixed-topology runs.

use anyhow::{bail, Result};

use crate::tree::validate::check_edges;
use crate::tree::PhyloTree;

/// Render one hard `constraint` command per internal clade of a tree, plus
/// the `prset topologypr` line that applies them all.
///
/// The root clade is skipped (the full taxon set constrains nothing).
/// Constraint names are `node<id>` under the canonical numbering, so the
/// tree must pass [`check_edges`] and carry no singleton internal nodes.
pub fn topology_constraints(tree: &PhyloTree) -> Result<String> {
    let report = check_edges(tree);
    if !report.is_clean() {
        bail!("tree failed edge checks:\n{}", report.summary());
    }
    if !report.singletons.is_empty() {
        bail!("tree has singleton internal nodes; repair it before constraining the topology");
    }

    let total = tree.node_total();
    let mut lines: Vec<String> = Vec::new();
    let mut names: Vec<String> = Vec::new();
    lines.push("[one hard constraint per internal clade]".to_string());
    for node in (tree.root_id() + 1)..=total {
        let mut tips: Vec<u32> = Vec::new();
        collect_tips(tree, node, &mut tips);
        tips.sort_unstable();
        let labels: Vec<&str> = tips.iter().filter_map(|t| tree.tip_label(*t)).collect();
        let name = format!("node{}", node);
        lines.push(format!("constraint {} = {};", name, labels.join(" ")));
        names.push(name);
    }
    if names.is_empty() {
        bail!("tree has no internal clades below the root; nothing to constrain");
    }
    lines.push(String::new());
    lines.push(format!(
        "prset topologypr = constraints({});",
        names.join(",")
    ));
    Ok(lines.join("\n"))
}

fn collect_tips(tree: &PhyloTree, node: u32, out: &mut Vec<u32>) {
    for child in tree.children(node) {
        if tree.is_tip(child) {
            out.push(child);
        } else {
            collect_tips(tree, child, out);
        }
    }
}
