//! Files read and written by the jobs.
//!
//! JSON maps are pretty-printed with two-space indentation and sorted keys.
//! Workbooks follow the layouts below; the multi-repository column wraps.
//!
//! | File | Sheet | Columns |
//! |------|-------|---------|
//! | raw map | `Sheet1` | `CI Number`, `Repository` (one row per pair) |
//! | consolidated map | `CI to Repo Map` | `CI Number`, `Repositories` |
//! | mapping (input) | first sheet | configured repo and CI columns |

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::merge::MappingConflict;
use crate::models::{CiRepoMap, SpreadsheetMapping};
use crate::workbook::{self, Sheet};

pub const RAW_SHEET_TITLE: &str = "Sheet1";
pub const CONSOLIDATED_SHEET_TITLE: &str = "CI to Repo Map";

/// Write any serializable value as pretty JSON, creating parent directories.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), "wrote JSON");
    Ok(())
}

/// One row per `(CI, repository)` pair.
pub fn raw_map_sheet(map: &CiRepoMap) -> Sheet {
    let mut sheet = Sheet::new(RAW_SHEET_TITLE, &["CI Number", "Repository"]);
    for (ci, repo) in map.pairs() {
        sheet.push_row(vec![ci.to_string(), repo.to_string()]);
    }
    sheet
}

/// One row per CI with its repositories joined by newlines.
pub fn consolidated_sheet(map: &CiRepoMap) -> Sheet {
    let mut sheet =
        Sheet::new(CONSOLIDATED_SHEET_TITLE, &["CI Number", "Repositories"]).wrap_column(1);
    for (ci, repos) in map.iter() {
        let joined = repos.iter().map(String::as_str).collect::<Vec<_>>().join("\n");
        sheet.push_row(vec![ci.to_string(), joined]);
    }
    sheet
}

pub fn write_raw_outputs(map: &CiRepoMap, json_path: &Path, xlsx_path: &Path) -> Result<()> {
    write_json(json_path, map)?;
    workbook::write_xlsx(xlsx_path, &raw_map_sheet(map))?;
    tracing::info!(path = %xlsx_path.display(), "wrote raw workbook");
    Ok(())
}

pub fn write_consolidated_outputs(
    map: &CiRepoMap,
    json_path: &Path,
    xlsx_path: &Path,
) -> Result<()> {
    write_json(json_path, map)?;
    workbook::write_xlsx(xlsx_path, &consolidated_sheet(map))?;
    tracing::info!(path = %xlsx_path.display(), "wrote consolidated workbook");
    Ok(())
}

pub fn write_conflicts(conflicts: &[MappingConflict], path: &Path) -> Result<()> {
    write_json(path, conflicts)
}

/// Read the maintained repository → CI spreadsheet.
///
/// Fails if either configured column is missing from the header row; rows
/// with a blank repository are ignored.
pub fn load_spreadsheet_mapping(
    path: &Path,
    repo_column: &str,
    ci_column: &str,
) -> Result<SpreadsheetMapping> {
    let records = workbook::read_records_from_path(path)?;
    let mut mapping = SpreadsheetMapping::new();
    if let Some(first) = records.first() {
        for col in [repo_column, ci_column] {
            if !first.contains_key(col) {
                bail!(
                    "mapping workbook {} has no '{}' column",
                    path.display(),
                    col
                );
            }
        }
    }
    for record in &records {
        let repo = record.get(repo_column).map(String::as_str).unwrap_or("");
        let ci = record.get(ci_column).map(String::as_str).unwrap_or("");
        mapping.insert_row(repo, ci);
    }
    tracing::info!(path = %path.display(), rows = mapping.len(), "loaded spreadsheet mapping");
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CiId;

    fn sample() -> CiRepoMap {
        let mut map = CiRepoMap::new();
        map.insert(CiId::new("CI2"), "b");
        map.insert(CiId::new("CI1"), "z");
        map.insert(CiId::new("CI1"), "a");
        map
    }

    #[test]
    fn raw_sheet_has_one_row_per_pair() {
        let sheet = raw_map_sheet(&sample());
        assert_eq!(
            sheet.rows,
            vec![
                vec!["CI1".to_string(), "a".to_string()],
                vec!["CI1".to_string(), "z".to_string()],
                vec!["CI2".to_string(), "b".to_string()],
            ]
        );
    }

    #[test]
    fn consolidated_sheet_joins_repos() {
        let sheet = consolidated_sheet(&sample());
        assert_eq!(sheet.title, "CI to Repo Map");
        assert_eq!(sheet.rows[0], vec!["CI1".to_string(), "a\nz".to_string()]);
        assert_eq!(sheet.wrap_columns, vec![1]);
    }

    #[test]
    fn outputs_round_trip_through_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let json = dir.path().join("data/map.json");
        let xlsx = dir.path().join("data/map.xlsx");
        write_consolidated_outputs(&sample(), &json, &xlsx).unwrap();

        assert_eq!(CiRepoMap::load_json(&json).unwrap(), sample());
        let rows = workbook::read_first_sheet(&std::fs::read(&xlsx).unwrap()).unwrap();
        assert_eq!(rows[1], vec!["CI1", "a\nz"]);
    }

    #[test]
    fn mapping_loader_checks_columns() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mapping.xlsx");
        let mut sheet = Sheet::new("Mapping", &["Repo Name", "Owner"]);
        sheet.push_row(vec!["a".into(), "team".into()]);
        workbook::write_xlsx(&path, &sheet).unwrap();

        let err = load_spreadsheet_mapping(&path, "Repo Name", "Related CI Nums").unwrap_err();
        assert!(err.to_string().contains("Related CI Nums"));
    }

    #[test]
    fn mapping_loader_reads_rows() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mapping.xlsx");
        let mut sheet = Sheet::new("Mapping", &["Repo Name", "Related CI Nums"]);
        sheet.push_row(vec!["acme/a".into(), "ci1111".into()]);
        sheet.push_row(vec!["b".into(), "N/A".into()]);
        workbook::write_xlsx(&path, &sheet).unwrap();

        let mapping = load_spreadsheet_mapping(&path, "Repo Name", "Related CI Nums").unwrap();
        assert_eq!(mapping.get("a"), Some(&Some(CiId::new("CI1111"))));
        assert_eq!(mapping.get("b"), Some(&None));
    }
}
