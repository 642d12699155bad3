//! Configuration loading and validation.
//!
//! Static settings come from an optional TOML file; secrets and trigger
//! information come from the process environment via [`JobEnv`]. Both are
//! combined and validated once at startup, before any job runs.
//!
//! ```toml
//! [github]
//! org = "acme"
//!
//! [discovery]
//! excluded_cis = ["CI000000001234"]
//!
//! [mapping]
//! conflict_policy = "flag"
//!
//! [report]
//! time_zone = "US/Eastern"
//!
//! [paths]
//! root = "."
//! ```

use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::extract::TokenPattern;
use crate::merge::ConflictPolicy;
use crate::models::ExclusionSet;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub github: GitHubConfig,
    pub discovery: DiscoveryConfig,
    pub mapping: MappingConfig,
    pub report: ReportConfig,
    pub publish: PublishConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GitHubConfig {
    pub org: Option<String>,
    pub api_url: String,
    pub raw_url: String,
    pub graphql_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            org: None,
            api_url: "https://api.github.com".to_string(),
            raw_url: "https://raw.githubusercontent.com".to_string(),
            graphql_url: "https://api.github.com/graphql".to_string(),
            timeout_secs: 30,
            user_agent: concat!("cimap/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub search_terms: Vec<String>,
    pub metadata_file: String,
    pub ci_prefixes: Vec<String>,
    pub min_digits: usize,
    pub per_page: u32,
    pub page_delay_ms: u64,
    pub excluded_cis: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            search_terms: vec!["CI".to_string(), "APM".to_string()],
            metadata_file: "repo.metadata".to_string(),
            ci_prefixes: vec!["CI".to_string(), "APM".to_string()],
            min_digits: 4,
            per_page: 100,
            page_delay_ms: 1000,
            excluded_cis: vec!["CI000000001234".to_string(), "CI000000005678".to_string()],
        }
    }
}

impl DiscoveryConfig {
    pub fn exclusions(&self) -> ExclusionSet {
        ExclusionSet::new(&self.excluded_cis)
    }

    pub fn token_pattern(&self) -> Result<TokenPattern> {
        TokenPattern::new(&self.ci_prefixes, self.min_digits)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MappingConfig {
    pub repo_column: String,
    pub ci_column: String,
    pub conflict_policy: ConflictPolicy,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            repo_column: "Repo Name".to_string(),
            ci_column: "Related CI Nums".to_string(),
            conflict_policy: ConflictPolicy::Flag,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReportConfig {
    pub time_zone: String,
    pub ticket_prefixes: Vec<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            time_zone: "US/Eastern".to_string(),
            ticket_prefixes: vec!["CHG".to_string(), "INC".to_string()],
        }
    }
}

impl ReportConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.time_zone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("report.time_zone '{}' is invalid: {}", self.time_zone, e))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PublishConfig {
    pub branch: String,
    /// `owner/name` of the repository receiving output files.
    pub repo: Option<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            branch: "develop".to_string(),
            repo: None,
        }
    }
}

/// Output and input file locations. Every path except `root` is relative
/// to `root` and doubles as the path inside the publish repository.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PathsConfig {
    pub root: PathBuf,
    pub raw_json: String,
    pub raw_xlsx: String,
    pub mapping_xlsx: String,
    pub consolidated_json: String,
    pub consolidated_xlsx: String,
    pub conflicts_json: String,
    pub report_xlsx: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            raw_json: "data/ci_repo_map_raw.json".to_string(),
            raw_xlsx: "data/ci_repo_map_raw.xlsx".to_string(),
            mapping_xlsx: "data/GWAM_github_repo_CI_mapping.xlsx".to_string(),
            consolidated_json: "data/consolidated_ci_repo_map.json".to_string(),
            consolidated_xlsx: "data/consolidated_ci_repo_map.xlsx".to_string(),
            conflicts_json: "data/ci_repo_map_conflicts.json".to_string(),
            report_xlsx: "data/final_ci_report.xlsx".to_string(),
        }
    }
}

impl PathsConfig {
    /// Resolve a configured relative path against `root`.
    pub fn local(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    fn all(&self) -> [(&'static str, &str); 7] {
        [
            ("paths.raw_json", &self.raw_json),
            ("paths.raw_xlsx", &self.raw_xlsx),
            ("paths.mapping_xlsx", &self.mapping_xlsx),
            ("paths.consolidated_json", &self.consolidated_json),
            ("paths.consolidated_xlsx", &self.consolidated_xlsx),
            ("paths.conflicts_json", &self.conflicts_json),
            ("paths.report_xlsx", &self.report_xlsx),
        ]
    }
}

/// Snapshot of the environment variables the jobs read.
#[derive(Debug, Clone, Default)]
pub struct JobEnv {
    pub token: Option<String>,
    pub org: Option<String>,
    pub event_name: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub commit_repo: Option<String>,
}

impl JobEnv {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            token: get("GITHUB_TOKEN"),
            org: get("GITHUB_ORG"),
            event_name: get("GITHUB_EVENT_NAME"),
            from_date: get("FROM_DATE"),
            to_date: get("TO_DATE"),
            commit_repo: get("COMMIT_REPO"),
        }
    }

    /// The access token, or a fatal error naming the variable.
    pub fn require_token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .context("GITHUB_TOKEN environment variable not set")
    }
}

impl Config {
    /// Fold environment overrides into the file configuration.
    pub fn apply_env(&mut self, env: &JobEnv) {
        if let Some(org) = &env.org {
            self.github.org = Some(org.clone());
        }
        if let Some(repo) = &env.commit_repo {
            self.publish.repo = Some(repo.clone());
        }
    }

    /// The organization, or a fatal error when none is configured.
    pub fn require_org(&self) -> Result<&str> {
        self.github
            .org
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .context("GitHub organization not set (github.org or GITHUB_ORG)")
    }

    /// The publish repository, or a fatal error when none is configured.
    pub fn require_commit_repo(&self) -> Result<&str> {
        let repo = self
            .publish
            .repo
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .context("COMMIT_REPO environment variable not set")?;
        if repo.split('/').filter(|s| !s.is_empty()).count() != 2 {
            bail!("COMMIT_REPO must be 'owner/name', got '{}'", repo);
        }
        Ok(repo)
    }

    fn validate(&self) -> Result<()> {
        let d = &self.discovery;
        if d.search_terms.iter().all(|t| t.trim().is_empty()) {
            bail!("discovery.search_terms must contain at least one term");
        }
        if d.metadata_file.trim().is_empty() {
            bail!("discovery.metadata_file must not be empty");
        }
        if !(1..=100).contains(&d.per_page) {
            bail!("discovery.per_page must be in [1, 100]");
        }
        d.token_pattern().context("invalid discovery.ci_prefixes / min_digits")?;

        if self.mapping.repo_column.trim().is_empty() || self.mapping.ci_column.trim().is_empty() {
            bail!("mapping.repo_column and mapping.ci_column must not be empty");
        }

        self.report.tz()?;
        if self.report.ticket_prefixes.iter().all(|p| p.trim().is_empty()) {
            bail!("report.ticket_prefixes must contain at least one prefix");
        }

        if self.publish.branch.trim().is_empty() {
            bail!("publish.branch must not be empty");
        }

        if self.github.timeout_secs == 0 {
            bail!("github.timeout_secs must be > 0");
        }

        for (key, value) in self.paths.all() {
            let p = Path::new(value);
            if value.trim().is_empty() || p.is_absolute() {
                bail!("{} must be a non-empty relative path, got '{}'", key, value);
            }
        }
        Ok(())
    }
}

/// Load configuration from an optional TOML file, apply the environment,
/// and validate the result.
pub fn load_config(path: Option<&Path>, env: &JobEnv) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        }
        None => Config::default(),
    };
    config.apply_env(env);
    config.validate()?;
    Ok(config)
}
