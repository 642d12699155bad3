//! Change/incident ticket report.
//!
//! Walks every `(CI, repository)` pair of the consolidated map, reads the
//! repository's tags, and keeps tags named after a change or incident
//! ticket whose tagger date falls inside the report window. Rows group
//! repositories and dates per `(CI, ticket)`.

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::Config;
use crate::github::CodeHost;
use crate::models::{CiId, CiRepoMap, ReportRow, TagRecord};
use crate::publish::{publish_files, PublishSummary};
use crate::window::DateWindow;
use crate::workbook::{self, Sheet};

pub const REPORT_SHEET_TITLE: &str = "CI Tag Report";
pub const REPORT_HEADERS: [&str; 4] = ["CI Number", "Change ticket", "Repository", "Date"];

/// Recognizes ticket tags and pulls out the ticket identifier.
#[derive(Debug, Clone)]
pub struct TicketMatcher {
    prefixes: Vec<String>,
    leading: Regex,
}

impl TicketMatcher {
    pub fn new<S: AsRef<str>>(prefixes: &[S]) -> Result<Self> {
        let prefixes: Vec<String> = prefixes
            .iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if prefixes.is_empty() {
            bail!("at least one ticket prefix is required");
        }
        let alternation = prefixes
            .iter()
            .map(|p| regex::escape(p))
            .collect::<Vec<_>>()
            .join("|");
        let leading = Regex::new(&format!(r"^((?:{})\d+)", alternation))?;
        Ok(Self { prefixes, leading })
    }

    /// Whether the tag name starts with a recognized prefix.
    pub fn is_candidate(&self, tag: &str) -> bool {
        self.prefixes.iter().any(|p| tag.starts_with(p.as_str()))
    }

    /// The leading `PREFIX<digits>` ticket identifier, if any.
    pub fn ticket(&self, tag: &str) -> Option<String> {
        self.leading
            .captures(tag)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// Calendar date of a tagger timestamp in `tz`.
pub fn tag_date(raw: &str, tz: &Tz) -> Result<NaiveDate> {
    let dt = DateTime::parse_from_rfc3339(raw.trim())?;
    Ok(dt.with_timezone(tz).date_naive())
}

type Grouped = BTreeMap<CiId, BTreeMap<String, BTreeMap<NaiveDate, BTreeSet<String>>>>;

/// Accumulates matching tags into report rows.
pub struct ReportBuilder<'a> {
    matcher: &'a TicketMatcher,
    window: DateWindow,
    tz: Tz,
    grouped: Grouped,
    pub tags_matched: usize,
    pub tags_skipped: usize,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(matcher: &'a TicketMatcher, window: DateWindow, tz: Tz) -> Self {
        Self {
            matcher,
            window,
            tz,
            grouped: BTreeMap::new(),
            tags_matched: 0,
            tags_skipped: 0,
        }
    }

    /// Consider every tag of `repo` for `ci`.
    pub fn add_tags(&mut self, ci: &CiId, repo: &str, tags: &[TagRecord]) {
        for tag in tags {
            if !self.matcher.is_candidate(&tag.name) {
                continue;
            }
            let Some(raw_date) = tag.tagger_date.as_deref() else {
                continue;
            };
            let Some(ticket) = self.matcher.ticket(&tag.name) else {
                continue;
            };
            let date = match tag_date(raw_date, &self.tz) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(repo, tag = %tag.name, error = %e, "failed processing tag");
                    self.tags_skipped += 1;
                    continue;
                }
            };
            if !self.window.contains(date) {
                continue;
            }
            self.tags_matched += 1;
            self.grouped
                .entry(ci.clone())
                .or_default()
                .entry(ticket)
                .or_default()
                .entry(date)
                .or_default()
                .insert(repo.to_string());
        }
    }

    /// Collapse into rows ordered by CI, then ticket.
    pub fn finish(self) -> Vec<ReportRow> {
        let mut rows = Vec::new();
        for (ci, tickets) in self.grouped {
            for (ticket, dates) in tickets {
                let mut repositories = BTreeSet::new();
                let mut all_dates = BTreeSet::new();
                for (date, repos) in dates {
                    all_dates.insert(date);
                    repositories.extend(repos);
                }
                rows.push(ReportRow {
                    ci: ci.clone(),
                    ticket,
                    repositories,
                    dates: all_dates,
                });
            }
        }
        rows
    }
}

/// Build the report by querying tags for each repository in `map`.
///
/// Tags are fetched once per repository even when it appears under
/// several CIs. A repository whose tag query fails contributes nothing.
pub fn build_report(
    host: &dyn CodeHost,
    owner: &str,
    map: &CiRepoMap,
    window: DateWindow,
    tz: Tz,
    matcher: &TicketMatcher,
) -> Vec<ReportRow> {
    let mut builder = ReportBuilder::new(matcher, window, tz);
    let mut cache: HashMap<String, Vec<TagRecord>> = HashMap::new();

    for (ci, repo) in map.pairs() {
        if !cache.contains_key(repo) {
            let tags = match host.repository_tags(owner, repo) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(repo, error = %e, "failed to fetch tags");
                    Vec::new()
                }
            };
            tracing::debug!(repo, tags = tags.len(), "fetched tags");
            cache.insert(repo.to_string(), tags);
        }
        if let Some(tags) = cache.get(repo) {
            builder.add_tags(ci, repo, tags);
        }
    }

    tracing::info!(
        repos = cache.len(),
        matched = builder.tags_matched,
        skipped = builder.tags_skipped,
        "tag scan complete"
    );
    builder.finish()
}

/// Render report rows as the report worksheet.
pub fn report_sheet(rows: &[ReportRow]) -> Sheet {
    let mut sheet = Sheet::new(REPORT_SHEET_TITLE, &REPORT_HEADERS).wrap_column(2);
    for row in rows {
        sheet.push_row(vec![
            row.ci.to_string(),
            row.ticket.clone(),
            row.repositories_display(),
            row.dates_display(),
        ]);
    }
    sheet
}

/// Result of a report run.
#[derive(Debug, Clone)]
pub struct ReportSummary {
    pub window: DateWindow,
    pub cis: usize,
    pub rows: Vec<ReportRow>,
    pub publish: Option<PublishSummary>,
}

/// Run the report job: load the consolidated map, collect ticket tags in
/// `window`, write the workbook, and optionally commit it to `commit_repo`.
pub fn run_report(
    config: &Config,
    host: &dyn CodeHost,
    window: DateWindow,
    commit_repo: Option<&str>,
) -> Result<ReportSummary> {
    let owner = config.require_org()?;
    let tz = config.report.tz()?;
    let matcher = TicketMatcher::new(&config.report.ticket_prefixes)?;
    let paths = &config.paths;

    let map = CiRepoMap::load_json(&paths.local(&paths.consolidated_json))?;
    tracing::info!(%window, cis = map.len(), "building ticket report");

    let rows = build_report(host, owner, &map, window, tz, &matcher);
    let out = paths.local(&paths.report_xlsx);
    workbook::write_xlsx(&out, &report_sheet(&rows))?;
    tracing::info!(path = %out.display(), rows = rows.len(), "wrote report workbook");

    let publish = match commit_repo {
        Some(repo) => {
            let published = publish_files(
                host,
                repo,
                &config.publish.branch,
                paths,
                &[paths.report_xlsx.as_str()],
            );
            if !published.is_success() {
                bail!("report workbook failed to commit to {}", repo);
            }
            Some(published)
        }
        None => None,
    };

    Ok(ReportSummary {
        window,
        cis: map.len(),
        rows,
        publish,
    })
}

pub fn print_report_summary(summary: &ReportSummary) {
    println!("report ok");
    println!("  window:    {}", summary.window);
    println!("  CIs:       {}", summary.cis);
    println!("  rows:      {}", summary.rows.len());
    if let Some(p) = &summary.publish {
        println!("  published: {}", p.created.len() + p.updated.len());
    }
}
