//! Core data models used throughout the CI map pipeline.
//!
//! These types represent the identifiers, relations, and report rows that
//! flow between discovery, consolidation, and reporting. The JSON produced
//! from [`CiRepoMap`] is the only state shared between the two jobs.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

/// A configuration-item identifier, trimmed and uppercased.
///
/// Construction always normalizes, so two identifiers that differ only in
/// case or surrounding whitespace compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CiId(String);

impl CiId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CiId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(CiId::new(raw))
    }
}

/// Trim a repository name and strip any `owner/` prefix.
pub fn short_repo_name(raw: &str) -> String {
    raw.trim()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// CI identifiers that must never appear in any output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet(BTreeSet<CiId>);

impl ExclusionSet {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(ids.into_iter().map(CiId::new).collect())
    }

    pub fn contains(&self, ci: &CiId) -> bool {
        self.0.contains(ci)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Mapping from CI identifier to the set of repositories carrying it.
///
/// Keys and repository sets are ordered, so serialization is stable and
/// repositories come out deduplicated and sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CiRepoMap(BTreeMap<CiId, BTreeSet<String>>);

impl CiRepoMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `repo` under `ci`. Blank repository names are ignored.
    pub fn insert(&mut self, ci: CiId, repo: &str) -> bool {
        let repo = repo.trim();
        if repo.is_empty() {
            return false;
        }
        self.0.entry(ci).or_default().insert(repo.to_string())
    }

    pub fn get(&self, ci: &CiId) -> Option<&BTreeSet<String>> {
        self.0.get(ci)
    }

    pub fn contains_key(&self, ci: &CiId) -> bool {
        self.0.contains_key(ci)
    }

    /// Remove `repo` from the set under `ci`, dropping the key if it empties.
    pub fn remove_repo(&mut self, ci: &CiId, repo: &str) {
        if let Some(repos) = self.0.get_mut(ci) {
            repos.remove(repo);
            if repos.is_empty() {
                self.0.remove(ci);
            }
        }
    }

    /// Drop every excluded key and every key left without repositories.
    pub fn retain_allowed(&mut self, excluded: &ExclusionSet) {
        self.0
            .retain(|ci, repos| !excluded.contains(ci) && !repos.is_empty());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CiId, &BTreeSet<String>)> {
        self.0.iter()
    }

    /// Every `(ci, repo)` pair in key order.
    pub fn pairs(&self) -> impl Iterator<Item = (&CiId, &str)> {
        self.0
            .iter()
            .flat_map(|(ci, repos)| repos.iter().map(move |r| (ci, r.as_str())))
    }

    /// Inverse relation: repository → CIs it appears under.
    pub fn repo_index(&self) -> BTreeMap<String, BTreeSet<CiId>> {
        let mut index: BTreeMap<String, BTreeSet<CiId>> = BTreeMap::new();
        for (ci, repo) in self.pairs() {
            index.entry(repo.to_string()).or_default().insert(ci.clone());
        }
        index
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a map from a JSON file. Keys are normalized and repository
    /// names trimmed on the way in.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read CI map: {}", path.display()))?;
        let raw: BTreeMap<String, Vec<String>> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse CI map: {}", path.display()))?;
        let mut map = CiRepoMap::new();
        for (ci, repos) in raw {
            let ci = CiId::new(ci);
            for repo in repos {
                map.insert(ci.clone(), &repo);
            }
        }
        Ok(map)
    }
}

/// Spreadsheet-maintained mapping: repository → single CI or nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpreadsheetMapping(BTreeMap<String, Option<CiId>>);

/// Cell values that mean "no CI recorded".
const CI_PLACEHOLDERS: &[&str] = &["", "N/A", "NA", "NAN", "NONE", "-"];

impl SpreadsheetMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a row. The repository is reduced to its short name; a later
    /// row for the same repository replaces an earlier one.
    pub fn insert_row(&mut self, repo: &str, ci_cell: &str) {
        let repo = short_repo_name(repo);
        if repo.is_empty() {
            return;
        }
        self.0.insert(repo, parse_ci_cell(ci_cell));
    }

    pub fn get(&self, repo: &str) -> Option<&Option<CiId>> {
        self.0.get(repo)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&CiId>)> {
        self.0.iter().map(|(r, ci)| (r.as_str(), ci.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn parse_ci_cell(cell: &str) -> Option<CiId> {
    let ci = CiId::new(cell);
    if CI_PLACEHOLDERS.contains(&ci.as_str()) {
        None
    } else {
        Some(ci)
    }
}

/// A tag as returned by the code host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    pub name: String,
    /// Tagger timestamp (RFC 3339). `None` for lightweight tags.
    pub tagger_date: Option<String>,
}

/// One line of the final report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub ci: CiId,
    pub ticket: String,
    pub repositories: BTreeSet<String>,
    pub dates: BTreeSet<NaiveDate>,
}

impl ReportRow {
    pub fn repositories_display(&self) -> String {
        self.repositories
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn dates_display(&self) -> String {
        self.dates
            .iter()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
