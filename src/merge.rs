//! Consolidation of the discovered CI map with the spreadsheet mapping.
//!
//! The discovered map (CI → repos, from code search) seeds the result.
//! Spreadsheet rows with a CI add their repository under it; rows without
//! one fall back to whatever CIs code search already associated with the
//! repository. Excluded CIs are removed last, so no source can reintroduce
//! them.
//!
//! A repository that the spreadsheet assigns to one CI while code search
//! lists it under another is a [`MappingConflict`]. Conflicts are always
//! reported; [`ConflictPolicy`] decides whether the discovered association
//! survives.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::models::{CiId, CiRepoMap, ExclusionSet, SpreadsheetMapping};

/// What to do when the two sources disagree about a repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Keep both associations and report the conflict.
    #[default]
    Flag,
    /// Keep only the spreadsheet's CI for the repository and report the conflict.
    PreferSpreadsheet,
}

/// A repository the two sources map to different CIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingConflict {
    pub repo: String,
    pub spreadsheet_ci: CiId,
    pub discovered_cis: BTreeSet<CiId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub map: CiRepoMap,
    pub conflicts: Vec<MappingConflict>,
    /// Repositories whose CI came from the discovered-map fallback.
    pub recovered: Vec<String>,
}

/// Merge `discovered` with `sheet` into the canonical map.
pub fn merge_mappings(
    discovered: &CiRepoMap,
    sheet: &SpreadsheetMapping,
    excluded: &ExclusionSet,
    policy: ConflictPolicy,
) -> MergeOutcome {
    let mut combined = CiRepoMap::new();
    for (ci, repo) in discovered.pairs() {
        combined.insert(CiId::new(ci.as_str()), repo);
    }

    // Built from the normalized seed so lookups match trimmed names.
    let discovered_index = combined.repo_index();
    let mut conflicts = Vec::new();
    let mut recovered = Vec::new();

    for (repo, ci) in sheet.iter() {
        let known: BTreeSet<CiId> = discovered_index
            .get(repo)
            .map(|cis| cis.iter().filter(|c| !excluded.contains(c)).cloned().collect())
            .unwrap_or_default();

        match ci {
            Some(ci) => {
                if excluded.contains(ci) {
                    continue;
                }
                combined.insert(ci.clone(), repo);

                let others: BTreeSet<CiId> = known.into_iter().filter(|c| c != ci).collect();
                if others.is_empty() {
                    continue;
                }
                tracing::warn!(
                    repo,
                    spreadsheet_ci = %ci,
                    discovered = ?others.iter().map(CiId::as_str).collect::<Vec<_>>(),
                    ?policy,
                    "spreadsheet and code search disagree on CI"
                );
                if policy == ConflictPolicy::PreferSpreadsheet {
                    for other in &others {
                        combined.remove_repo(other, repo);
                    }
                }
                conflicts.push(MappingConflict {
                    repo: repo.to_string(),
                    spreadsheet_ci: ci.clone(),
                    discovered_cis: others,
                });
            }
            None => {
                if known.is_empty() {
                    tracing::debug!(repo, "no CI in spreadsheet or code search");
                    continue;
                }
                for ci in known {
                    combined.insert(ci, repo);
                }
                recovered.push(repo.to_string());
            }
        }
    }

    combined.retain_allowed(excluded);
    MergeOutcome {
        map: combined,
        conflicts,
        recovered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &[&str])]) -> CiRepoMap {
        let mut m = CiRepoMap::new();
        for (ci, repos) in entries {
            for r in *repos {
                m.insert(CiId::new(ci), r);
            }
        }
        m
    }

    fn sheet(rows: &[(&str, &str)]) -> SpreadsheetMapping {
        let mut s = SpreadsheetMapping::new();
        for (repo, ci) in rows {
            s.insert_row(repo, ci);
        }
        s
    }

    fn repos<'a>(m: &'a CiRepoMap, ci: &str) -> Vec<&'a str> {
        m.get(&CiId::new(ci))
            .map(|s| s.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    #[test]
    fn fallback_recovers_discovered_ci() {
        let discovered = map(&[("CI1", &["r1"])]);
        let out = merge_mappings(
            &discovered,
            &sheet(&[("r1", "N/A")]),
            &ExclusionSet::default(),
            ConflictPolicy::Flag,
        );
        assert_eq!(repos(&out.map, "CI1"), vec!["r1"]);
        assert_eq!(out.recovered, vec!["r1"]);
        assert!(out.conflicts.is_empty());
    }

    #[test]
    fn spreadsheet_rows_add_repos() {
        let discovered = map(&[("CI1111", &["a"])]);
        let out = merge_mappings(
            &discovered,
            &sheet(&[("org/b", "ci1111"), ("c", "CI2222")]),
            &ExclusionSet::default(),
            ConflictPolicy::Flag,
        );
        assert_eq!(repos(&out.map, "CI1111"), vec!["a", "b"]);
        assert_eq!(repos(&out.map, "CI2222"), vec!["c"]);
    }

    #[test]
    fn excluded_ids_never_survive() {
        let excluded = ExclusionSet::new(["CI000000001234"]);
        let discovered = map(&[("ci000000001234", &["a"]), ("CI5555", &["a"])]);
        let out = merge_mappings(
            &discovered,
            &sheet(&[("b", "CI000000001234"), ("a", "n/a")]),
            &excluded,
            ConflictPolicy::Flag,
        );
        assert!(!out.map.contains_key(&CiId::new("CI000000001234")));
        assert_eq!(repos(&out.map, "CI5555"), vec!["a"]);
        assert_eq!(out.map.len(), 1);
    }

    #[test]
    fn excluded_discovered_ci_is_not_a_conflict() {
        let excluded = ExclusionSet::new(["CI9999"]);
        let discovered = map(&[("CI9999", &["a"])]);
        let out = merge_mappings(
            &discovered,
            &sheet(&[("a", "CI1111")]),
            &excluded,
            ConflictPolicy::Flag,
        );
        assert!(out.conflicts.is_empty());
        assert_eq!(repos(&out.map, "CI1111"), vec!["a"]);
    }

    #[test]
    fn keys_and_repos_are_normalized() {
        let mut discovered = CiRepoMap::new();
        discovered.insert(CiId::new("apm12345"), "  spaced ");
        let out = merge_mappings(
            &discovered,
            &SpreadsheetMapping::new(),
            &ExclusionSet::default(),
            ConflictPolicy::Flag,
        );
        assert_eq!(repos(&out.map, "APM12345"), vec!["spaced"]);
    }

    #[test]
    fn merge_is_idempotent() {
        let discovered = map(&[("CI1", &["r2", "r1"]), ("CI2", &["r3"])]);
        let s = sheet(&[("r1", "CI2"), ("r3", ""), ("r4", "CI1")]);
        let excluded = ExclusionSet::new(["CI3"]);
        let first = merge_mappings(&discovered, &s, &excluded, ConflictPolicy::Flag);
        let second = merge_mappings(&discovered, &s, &excluded, ConflictPolicy::Flag);
        assert_eq!(first, second);

        // Feeding the result back in adds nothing new.
        let again = merge_mappings(&first.map, &s, &excluded, ConflictPolicy::Flag);
        assert_eq!(again.map, first.map);
    }

    #[test]
    fn conflict_flagged_keeps_both() {
        let discovered = map(&[("CI1", &["r1"])]);
        let out = merge_mappings(
            &discovered,
            &sheet(&[("r1", "CI2")]),
            &ExclusionSet::default(),
            ConflictPolicy::Flag,
        );
        assert_eq!(repos(&out.map, "CI1"), vec!["r1"]);
        assert_eq!(repos(&out.map, "CI2"), vec!["r1"]);
        assert_eq!(out.conflicts.len(), 1);
        assert_eq!(out.conflicts[0].repo, "r1");
        assert_eq!(out.conflicts[0].spreadsheet_ci, CiId::new("CI2"));
        assert!(out.conflicts[0].discovered_cis.contains(&CiId::new("CI1")));
    }

    #[test]
    fn conflict_prefer_spreadsheet_drops_discovered() {
        let discovered = map(&[("CI1", &["r1", "r9"])]);
        let out = merge_mappings(
            &discovered,
            &sheet(&[("r1", "CI2")]),
            &ExclusionSet::default(),
            ConflictPolicy::PreferSpreadsheet,
        );
        assert_eq!(repos(&out.map, "CI1"), vec!["r9"]);
        assert_eq!(repos(&out.map, "CI2"), vec!["r1"]);
        assert_eq!(out.conflicts.len(), 1);
    }

    #[test]
    fn prefer_spreadsheet_removes_emptied_keys() {
        let discovered = map(&[("CI1", &["r1"])]);
        let out = merge_mappings(
            &discovered,
            &sheet(&[("r1", "CI2")]),
            &ExclusionSet::default(),
            ConflictPolicy::PreferSpreadsheet,
        );
        assert!(!out.map.contains_key(&CiId::new("CI1")));
    }

    #[test]
    fn agreement_is_not_a_conflict() {
        let discovered = map(&[("CI1", &["r1"])]);
        let out = merge_mappings(
            &discovered,
            &sheet(&[("r1", "ci1")]),
            &ExclusionSet::default(),
            ConflictPolicy::Flag,
        );
        assert!(out.conflicts.is_empty());
        assert_eq!(out.map.len(), 1);
    }
}
