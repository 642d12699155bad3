//! Organization-wide code search scan for CI tokens.
//!
//! For each search term, pages through code search results scoped to the
//! organization and the metadata file name, fetches every matched file from
//! its repository's default branch, and records the CI tokens found under
//! the repository's short name.
//!
//! Failures are contained: a non-2xx search response ends pagination for
//! that term with whatever was collected, and a failed file lookup or fetch
//! only drops that file.

use std::collections::{HashMap, HashSet};
use std::thread;
use std::time::Duration;

use crate::config::DiscoveryConfig;
use crate::extract::TokenPattern;
use crate::github::CodeHost;
use crate::models::{CiRepoMap, ExclusionSet};

/// Counters for one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub pages: u32,
    pub files_scanned: u32,
    pub files_failed: u32,
    pub searches_aborted: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub map: CiRepoMap,
    pub stats: ScanStats,
}

/// Inputs for a scan, resolved from configuration.
pub struct ScanRequest<'a> {
    pub org: &'a str,
    pub discovery: &'a DiscoveryConfig,
    pub pattern: &'a TokenPattern,
    pub excluded: &'a ExclusionSet,
}

/// Code search query for one term.
pub fn search_query(term: &str, metadata_file: &str, org: &str) -> String {
    format!("{} filename:{} org:{}", term.trim(), metadata_file.trim(), org.trim())
}

/// Run the scan against `host`.
pub fn scan_organization(host: &dyn CodeHost, req: &ScanRequest<'_>) -> ScanOutcome {
    let mut map = CiRepoMap::new();
    let mut stats = ScanStats::default();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut branches: HashMap<String, Option<String>> = HashMap::new();
    let delay = Duration::from_millis(req.discovery.page_delay_ms);

    for term in req.discovery.search_terms.iter().filter(|t| !t.trim().is_empty()) {
        let query = search_query(term, &req.discovery.metadata_file, req.org);
        let mut page = 1u32;

        loop {
            tracing::info!(term = %term, page, "searching code");
            let result = match host.search_code(&query, page, req.discovery.per_page) {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(term = %term, page, error = %e, "code search failed; keeping partial results");
                    stats.searches_aborted += 1;
                    break;
                }
            };
            stats.pages += 1;

            if result.items.is_empty() {
                break;
            }

            for item in &result.items {
                if !seen.insert((item.repo_full_name.clone(), item.path.clone())) {
                    continue;
                }

                let branch = branches
                    .entry(item.repo_full_name.clone())
                    .or_insert_with(|| match host.default_branch(&item.repo_full_name) {
                        Ok(b) => Some(b),
                        Err(e) => {
                            tracing::warn!(repo = %item.repo_full_name, error = %e, "failed to resolve default branch");
                            None
                        }
                    })
                    .clone();
                let Some(branch) = branch else {
                    stats.files_failed += 1;
                    continue;
                };

                let content = match host.raw_file(&item.repo_full_name, &branch, &item.path) {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(
                            repo = %item.repo_full_name,
                            path = %item.path,
                            error = %e,
                            "failed to fetch file"
                        );
                        stats.files_failed += 1;
                        continue;
                    }
                };
                stats.files_scanned += 1;

                let mut found = 0usize;
                for ci in req.pattern.extract(&content) {
                    if req.excluded.contains(&ci) {
                        continue;
                    }
                    if map.insert(ci, &item.repo_name) {
                        found += 1;
                    }
                }
                tracing::debug!(repo = %item.repo_name, path = %item.path, new_pairs = found, "scanned file");
            }

            if !result.has_next {
                break;
            }
            page += 1;
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
    }

    tracing::info!(
        cis = map.len(),
        files = stats.files_scanned,
        failed = stats.files_failed,
        "code search scan complete"
    );
    ScanOutcome { map, stats }
}
