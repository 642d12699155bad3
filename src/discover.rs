//! The discovery job: scan, consolidate, write, publish.
//!
//! # Workflow
//!
//! 1. Scan the organization's metadata files for CI tokens ([`crate::scan`]).
//! 2. Write the raw map as JSON and as a workbook.
//! 3. Load the maintained spreadsheet mapping and merge ([`crate::merge`]).
//! 4. Write the consolidated map (JSON + workbook) and any conflicts.
//! 5. Commit the raw and consolidated files to the publish repository.
//!
//! `cimap merge` runs steps 3–4 alone against the raw JSON already on disk.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::export;
use crate::github::CodeHost;
use crate::merge::{merge_mappings, MergeOutcome};
use crate::models::CiRepoMap;
use crate::publish::{publish_files, PublishSummary};
use crate::scan::{scan_organization, ScanRequest, ScanStats};

/// Result of a discovery run.
#[derive(Debug, Clone, Default)]
pub struct DiscoverySummary {
    pub raw_cis: usize,
    pub consolidated_cis: usize,
    pub conflicts: usize,
    pub scan: ScanStats,
    pub publish: Option<PublishSummary>,
}

/// Merge `raw` with the configured spreadsheet and write the consolidated
/// outputs. Conflicts are written only when there are any; a stale
/// conflicts file from an earlier run is removed.
pub fn consolidate(config: &Config, raw: &CiRepoMap) -> Result<MergeOutcome> {
    let paths = &config.paths;
    let sheet = export::load_spreadsheet_mapping(
        &paths.local(&paths.mapping_xlsx),
        &config.mapping.repo_column,
        &config.mapping.ci_column,
    )?;

    let outcome = merge_mappings(
        raw,
        &sheet,
        &config.discovery.exclusions(),
        config.mapping.conflict_policy,
    );
    tracing::info!(
        cis = outcome.map.len(),
        conflicts = outcome.conflicts.len(),
        recovered = outcome.recovered.len(),
        "merged spreadsheet mapping"
    );

    export::write_consolidated_outputs(
        &outcome.map,
        &paths.local(&paths.consolidated_json),
        &paths.local(&paths.consolidated_xlsx),
    )?;

    let conflicts_path = paths.local(&paths.conflicts_json);
    if outcome.conflicts.is_empty() {
        if conflicts_path.exists() {
            std::fs::remove_file(&conflicts_path)?;
        }
    } else {
        export::write_conflicts(&outcome.conflicts, &conflicts_path)?;
    }
    Ok(outcome)
}

/// Run the full discovery job against `host`.
///
/// `commit_repo` is `None` when publishing is disabled.
pub fn run_discover(
    config: &Config,
    host: &dyn CodeHost,
    commit_repo: Option<&str>,
) -> Result<DiscoverySummary> {
    let org = config.require_org()?;
    let pattern = config.discovery.token_pattern()?;
    let excluded = config.discovery.exclusions();
    let paths = &config.paths;

    tracing::info!(org, "starting CI-to-repo scan");
    let scan = scan_organization(
        host,
        &ScanRequest {
            org,
            discovery: &config.discovery,
            pattern: &pattern,
            excluded: &excluded,
        },
    );
    export::write_raw_outputs(
        &scan.map,
        &paths.local(&paths.raw_json),
        &paths.local(&paths.raw_xlsx),
    )?;

    let outcome = consolidate(config, &scan.map)?;

    let mut summary = DiscoverySummary {
        raw_cis: scan.map.len(),
        consolidated_cis: outcome.map.len(),
        conflicts: outcome.conflicts.len(),
        scan: scan.stats,
        publish: None,
    };

    if let Some(repo) = commit_repo {
        let files = [
            paths.raw_json.as_str(),
            paths.raw_xlsx.as_str(),
            paths.consolidated_json.as_str(),
            paths.consolidated_xlsx.as_str(),
        ];
        let published = publish_files(host, repo, &config.publish.branch, paths, &files);
        let failed = published.failed.len();
        summary.publish = Some(published);
        if failed > 0 {
            bail!("{} of {} output files failed to commit to {}", failed, files.len(), repo);
        }
    }

    Ok(summary)
}

/// Offline consolidation from the raw JSON already on disk.
pub fn run_merge(config: &Config) -> Result<MergeOutcome> {
    let raw = CiRepoMap::load_json(&config.paths.local(&config.paths.raw_json))?;
    consolidate(config, &raw)
}

pub fn print_discovery_summary(summary: &DiscoverySummary) {
    println!("discover ok");
    println!("  pages searched:    {}", summary.scan.pages);
    println!("  files scanned:     {}", summary.scan.files_scanned);
    println!("  files failed:      {}", summary.scan.files_failed);
    println!("  raw CIs:           {}", summary.raw_cis);
    println!("  consolidated CIs:  {}", summary.consolidated_cis);
    println!("  conflicts:         {}", summary.conflicts);
    if let Some(p) = &summary.publish {
        println!("  files created:     {}", p.created.len());
        println!("  files updated:     {}", p.updated.len());
    }
}

pub fn print_merge_summary(outcome: &MergeOutcome) {
    println!("merge ok");
    println!("  consolidated CIs:  {}", outcome.map.len());
    println!("  recovered repos:   {}", outcome.recovered.len());
    println!("  conflicts:         {}", outcome.conflicts.len());
    for c in &outcome.conflicts {
        let discovered: Vec<&str> = c.discovered_cis.iter().map(|ci| ci.as_str()).collect();
        println!(
            "    {}: spreadsheet {} vs discovered {}",
            c.repo,
            c.spreadsheet_ci,
            discovered.join(", ")
        );
    }
}
