//! File loading for age tables, timescales, and trees.
//!
//! Tables come in as CSV with a header row. Trees come in by file
//! extension: `.json` holds the edge-table serialization of
//! [`PhyloTree`], while `.nwk`, `.tre`, and `.newick` hold Newick text.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use polars::prelude::*;

use crate::ages::{Interval, IntervalAssignment, TaxonAges, TipAgeTable};
use crate::newick;
use crate::tree::PhyloTree;

fn read_csv(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .with_context(|| format!("failed to open CSV: {}", path.display()))?
        .finish()
        .with_context(|| format!("failed to read CSV: {}", path.display()))
}

fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|s| s.to_string()).collect()
}

fn require_columns(df: &DataFrame, required: &[&str], path: &Path) -> Result<()> {
    let available = column_names(df);
    for &name in required {
        if !available.iter().any(|c| c.as_str() == name) {
            bail!(
                "{}: missing required column '{}' (found: {})",
                path.display(),
                name,
                available.join(", ")
            );
        }
    }
    Ok(())
}

fn float_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let col = df
        .column(name)
        .with_context(|| format!("column '{}' not found", name))?;
    // the cast is non-strict, so an unparseable cell comes back as null
    let casted = col
        .cast(&DataType::Float64)
        .with_context(|| format!("column '{}' is not numeric", name))?;
    Ok(casted.f64()?.into_iter().collect())
}

fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let col = df
        .column(name)
        .with_context(|| format!("column '{}' not found", name))?;
    let strs = col
        .str()
        .with_context(|| format!("column '{}' is not text", name))?;
    Ok(strs.into_iter().map(|v| v.map(|s| s.to_string())).collect())
}

fn cell_error(path: &Path, row: usize, name: &str, what: &str) -> anyhow::Error {
    // +2: one for the header line, one for 1-based numbering
    anyhow::anyhow!(
        "{}: `{}` (line {}): {}",
        path.display(),
        name,
        row + 2,
        what
    )
}

/// Load a taxon age table from CSV and validate it.
///
/// Required columns: `taxon`, `fad_max`, `fad_min`. The `lad_max` and
/// `lad_min` columns are optional but must appear together; blank cells in
/// them mean the taxon has no recorded last appearance.
pub fn load_tip_ages(path: &Path) -> Result<TipAgeTable> {
    let df = read_csv(path)?;
    require_columns(&df, &["taxon", "fad_max", "fad_min"], path)?;
    let names = column_names(&df);
    let has_lad_max = names.iter().any(|c| c.as_str() == "lad_max");
    let has_lad_min = names.iter().any(|c| c.as_str() == "lad_min");
    if has_lad_max != has_lad_min {
        bail!(
            "{}: lad_max and lad_min must be present together",
            path.display()
        );
    }

    let taxa = string_values(&df, "taxon")?;
    let fad_max = float_values(&df, "fad_max")?;
    let fad_min = float_values(&df, "fad_min")?;
    let (lad_max, lad_min) = if has_lad_max {
        (float_values(&df, "lad_max")?, float_values(&df, "lad_min")?)
    } else {
        (vec![None; df.height()], vec![None; df.height()])
    };

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let taxon = taxa[i]
            .clone()
            .ok_or_else(|| cell_error(path, i, "?", "missing taxon"))?;
        let row_fad_max = fad_max[i]
            .ok_or_else(|| cell_error(path, i, &taxon, "missing or non-numeric fad_max"))?;
        let row_fad_min = fad_min[i]
            .ok_or_else(|| cell_error(path, i, &taxon, "missing or non-numeric fad_min"))?;
        rows.push(TaxonAges {
            taxon,
            fad_max: row_fad_max,
            fad_min: row_fad_min,
            lad_max: lad_max[i],
            lad_min: lad_min[i],
        });
    }
    let table = TipAgeTable::new(rows);
    table
        .validate()
        .with_context(|| format!("invalid age table: {}", path.display()))?;
    Ok(table)
}

/// Load a timescale from CSV with columns `interval`, `start`, `end`.
pub fn load_intervals(path: &Path) -> Result<Vec<Interval>> {
    let df = read_csv(path)?;
    require_columns(&df, &["interval", "start", "end"], path)?;
    let interval_names = string_values(&df, "interval")?;
    let starts = float_values(&df, "start")?;
    let ends = float_values(&df, "end")?;

    let mut out = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let name = interval_names[i]
            .clone()
            .ok_or_else(|| cell_error(path, i, "?", "missing interval"))?;
        let start =
            starts[i].ok_or_else(|| cell_error(path, i, &name, "missing or non-numeric start"))?;
        let end = ends[i].ok_or_else(|| cell_error(path, i, &name, "missing or non-numeric end"))?;
        out.push(Interval { name, start, end });
    }
    Ok(out)
}

/// Load interval assignments from CSV with columns `taxon`,
/// `first_interval`, `last_interval`.
pub fn load_interval_assignments(path: &Path) -> Result<Vec<IntervalAssignment>> {
    let df = read_csv(path)?;
    require_columns(&df, &["taxon", "first_interval", "last_interval"], path)?;
    let taxa = string_values(&df, "taxon")?;
    let firsts = string_values(&df, "first_interval")?;
    let lasts = string_values(&df, "last_interval")?;

    let mut out = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let taxon = taxa[i]
            .clone()
            .ok_or_else(|| cell_error(path, i, "?", "missing taxon"))?;
        let first = firsts[i]
            .clone()
            .ok_or_else(|| cell_error(path, i, &taxon, "missing first_interval"))?;
        let last = lasts[i]
            .clone()
            .ok_or_else(|| cell_error(path, i, &taxon, "missing last_interval"))?;
        out.push(IntervalAssignment { taxon, first, last });
    }
    Ok(out)
}

/// Load a timescale and per-taxon interval assignments, resolving them into
/// a validated age table.
pub fn load_interval_ages(intervals_path: &Path, assignments_path: &Path) -> Result<TipAgeTable> {
    let intervals = load_intervals(intervals_path)?;
    let assignments = load_interval_assignments(assignments_path)?;
    let table = TipAgeTable::from_intervals(&intervals, &assignments).with_context(|| {
        format!(
            "resolving {} against {}",
            assignments_path.display(),
            intervals_path.display()
        )
    })?;
    Ok(table)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Read a tree file, dispatching on extension.
pub fn read_tree(path: &Path) -> Result<PhyloTree> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read tree file: {}", path.display()))?;
    match extension_of(path).as_deref() {
        Some("json") => serde_json::from_str(&text)
            .with_context(|| format!("failed to parse tree JSON: {}", path.display())),
        Some("nwk") | Some("tre") | Some("newick") => newick::parse(&text)
            .with_context(|| format!("failed to parse Newick: {}", path.display())),
        _ => bail!(
            "{}: unrecognized tree file extension (expected .json, .nwk, .tre or .newick)",
            path.display()
        ),
    }
}

/// Write a tree file, dispatching on extension.
pub fn write_tree(path: &Path, tree: &PhyloTree) -> Result<()> {
    let text = match extension_of(path).as_deref() {
        Some("json") => {
            serde_json::to_string_pretty(tree).context("failed to serialize tree")?
        }
        Some("nwk") | Some("tre") | Some("newick") => newick::write(tree),
        _ => bail!(
            "{}: unrecognized tree file extension (expected .json, .nwk, .tre or .newick)",
            path.display()
        ),
    };
    fs::write(path, format!("{}\n", text))
        .with_context(|| format!("failed to write tree file: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Edge;
    use approx::assert_relative_eq;
    use std::path::PathBuf;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_age_table_with_lad_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "ages.csv",
            "taxon,fad_max,fad_min,lad_max,lad_min\n\
             Acernaspis_orestes,443.8,440.8,438.5,433.4\n\
             Dalmanites_limulurus,433.4,430.5,,\n",
        );
        let table = load_tip_ages(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_relative_eq!(table.rows[0].fad_max, 443.8);
        assert_relative_eq!(table.rows[0].lad_min.unwrap(), 433.4);
        assert!(table.rows[1].lad_max.is_none());
        assert!(table.rows[1].lad_min.is_none());
    }

    #[test]
    fn loads_age_table_without_lad_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "ages.csv",
            "taxon,fad_max,fad_min\nTaxon_a,10.5,9.5\nTaxon_b,8,8\n",
        );
        let table = load_tip_ages(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.rows[0].lad_max.is_none());
        assert_relative_eq!(table.rows[1].fad_max, 8.0);
    }

    #[test]
    fn missing_column_is_reported_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "ages.csv", "taxon,fad_max\nTaxon_a,10.5\n");
        let err = load_tip_ages(&path).unwrap_err();
        assert!(format!("{}", err).contains("fad_min"));
    }

    #[test]
    fn one_sided_lad_columns_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "ages.csv",
            "taxon,fad_max,fad_min,lad_max\nTaxon_a,10.5,9.5,8\n",
        );
        let err = load_tip_ages(&path).unwrap_err();
        assert!(format!("{}", err).contains("present together"));
    }

    #[test]
    fn invalid_rows_fail_validation_with_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "ages.csv",
            "taxon,fad_max,fad_min\nTaxon_a,8,10\n",
        );
        let err = load_tip_ages(&path).unwrap_err();
        let chain = format!("{:#}", err);
        assert!(chain.contains("invalid age table"), "got: {}", chain);
        assert!(chain.contains("older than maximum"), "got: {}", chain);
    }

    #[test]
    fn blank_numeric_cell_names_the_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "ages.csv",
            "taxon,fad_max,fad_min\nTaxon_a,10,9\nTaxon_b,,8\n",
        );
        let err = load_tip_ages(&path).unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("Taxon_b"), "got: {}", msg);
        assert!(msg.contains("line 3"), "got: {}", msg);
    }

    #[test]
    fn non_numeric_age_cell_is_called_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "ages.csv",
            "taxon,fad_max,fad_min\nTaxon_a,abc,9\n",
        );
        let err = load_tip_ages(&path).unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("missing or non-numeric fad_max"), "got: {}", msg);
        assert!(msg.contains("Taxon_a"), "got: {}", msg);
    }

    #[test]
    fn interval_tables_resolve_to_ages() {
        let dir = tempfile::tempdir().unwrap();
        let intervals = write_file(
            &dir,
            "intervals.csv",
            "interval,start,end\n\
             Tournaisian,358.9,346.7\n\
             Visean,346.7,330.9\n\
             Serpukhovian,330.9,323.2\n",
        );
        let assignments = write_file(
            &dir,
            "assignments.csv",
            "taxon,first_interval,last_interval\n\
             Spanning_taxon,Tournaisian,Serpukhovian\n\
             Confined_taxon,Visean,Visean\n",
        );
        let table = load_interval_ages(&intervals, &assignments).unwrap();
        assert_eq!(table.len(), 2);
        assert_relative_eq!(table.rows[0].fad_max, 358.9);
        assert_relative_eq!(table.rows[0].lad_min.unwrap(), 323.2);
        assert_relative_eq!(table.rows[1].fad_min, 330.9);
    }

    #[test]
    fn unknown_interval_reference_carries_file_context() {
        let dir = tempfile::tempdir().unwrap();
        let intervals = write_file(
            &dir,
            "intervals.csv",
            "interval,start,end\nVisean,346.7,330.9\n",
        );
        let assignments = write_file(
            &dir,
            "assignments.csv",
            "taxon,first_interval,last_interval\nT,Tournaisian,Visean\n",
        );
        let err = load_interval_ages(&intervals, &assignments).unwrap_err();
        let chain = format!("{:#}", err);
        assert!(chain.contains("Tournaisian"), "got: {}", chain);
        assert!(chain.contains("resolving"), "got: {}", chain);
    }

    #[test]
    fn tree_json_round_trips_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let tree = PhyloTree::from_parts(
            vec![Edge::new(3, 1), Edge::new(3, 2)],
            Some(vec![1.0, 2.0]),
            vec!["A".into(), "B".into()],
            1,
        );
        let path = dir.path().join("tree.json");
        write_tree(&path, &tree).unwrap();
        let back = read_tree(&path).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn newick_files_read_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "tree.nwk", "(A:1.5,(B:2,C:2.5):0.5);\n");
        let tree = read_tree(&path).unwrap();
        assert_eq!(tree.tip_labels, vec!["A", "B", "C"]);

        let out = dir.path().join("out.tre");
        write_tree(&out, &tree).unwrap();
        let text = fs::read_to_string(&out).unwrap();
        assert_eq!(text, "(A:1.5,(B:2,C:2.5):0.5);\n");
    }

    #[test]
    fn unknown_tree_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "tree.xml", "<tree/>\n");
        assert!(read_tree(&path).is_err());
        let tree = PhyloTree::from_parts(
            vec![Edge::new(3, 1), Edge::new(3, 2)],
            None,
            vec!["A".into(), "B".into()],
            1,
        );
        assert!(write_tree(&dir.path().join("tree.xml"), &tree).is_err());
    }
}
