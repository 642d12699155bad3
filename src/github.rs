//! Code host access.
//!
//! [`CodeHost`] is the seam between the jobs and the remote platform. Jobs
//! only ever talk to a `&dyn CodeHost`, so tests can drive the full
//! pipeline with an in-memory host. [`GitHubClient`] is the production
//! implementation over the GitHub REST and GraphQL APIs.
//!
//! # Endpoints
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | code search | `GET /search/code?q=..&per_page=..&page=..` |
//! | default branch | `GET /repos/{owner}/{name}` |
//! | raw file | `GET {raw_url}/{owner}/{name}/{branch}/{path}` |
//! | tags | `POST /graphql` (refs under `refs/tags/`, 100 per page) |
//! | file sha | `GET /repos/{owner}/{name}/contents/{path}?ref={branch}` |
//! | create/update file | `PUT /repos/{owner}/{name}/contents/{path}` |
//!
//! All calls are blocking and issued one at a time. There is no retry: a
//! failed call surfaces as an error and the caller decides whether to skip
//! the item or stop.

use anyhow::{bail, Context, Result};
use base64::Engine;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::GitHubConfig;
use crate::models::TagRecord;

/// One code search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeMatch {
    /// `owner/name`.
    pub repo_full_name: String,
    /// Short repository name.
    pub repo_name: String,
    pub path: String,
}

/// One page of code search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub items: Vec<CodeMatch>,
    pub has_next: bool,
}

/// A file to create or update in a repository.
#[derive(Debug, Clone)]
pub struct FileCommit<'a> {
    pub path: &'a str,
    pub branch: &'a str,
    pub message: String,
    pub content: &'a [u8],
    /// Blob SHA of the existing file; `None` creates it.
    pub sha: Option<String>,
}

/// Operations the jobs need from the code host.
pub trait CodeHost {
    /// Run one page of a code search query.
    fn search_code(&self, query: &str, page: u32, per_page: u32) -> Result<SearchPage>;

    /// Default branch of `owner/name`.
    fn default_branch(&self, repo_full_name: &str) -> Result<String>;

    /// Raw text of a file at a branch.
    fn raw_file(&self, repo_full_name: &str, branch: &str, path: &str) -> Result<String>;

    /// All tags of `owner/name`, newest first. A failure on the first page
    /// is an error; a failure on a later page returns the tags collected so
    /// far.
    fn repository_tags(&self, owner: &str, name: &str) -> Result<Vec<TagRecord>>;

    /// Blob SHA of a file on a branch, or `None` if it does not exist.
    fn file_sha(&self, repo_full_name: &str, path: &str, branch: &str) -> Result<Option<String>>;

    /// Create or update a file with a single commit.
    fn put_file(&self, repo_full_name: &str, commit: &FileCommit<'_>) -> Result<()>;
}

/// GitHub REST + GraphQL client. Construct once per job run.
pub struct GitHubClient {
    http: Client,
    api_url: String,
    raw_url: String,
    graphql_url: String,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .context("GITHUB_TOKEN contains invalid header characters")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("invalid github.user_agent")?,
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );

        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            raw_url: config.raw_url.trim_end_matches('/').to_string(),
            graphql_url: config.graphql_url.clone(),
        })
    }
}

/// Fail with status and a bounded slice of the body for non-2xx responses.
fn ensure_success(resp: Response, what: &str) -> Result<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().unwrap_or_default();
    bail!(
        "{} failed (HTTP {}): {}",
        what,
        status,
        body.chars().take(500).collect::<String>()
    );
}

/// Whether a `Link` header advertises a `rel="next"` page.
pub fn link_has_next(link: &str) -> bool {
    link.split(',').any(|part| {
        part.split(';')
            .skip(1)
            .any(|param| param.trim().replace(' ', "") == "rel=\"next\"")
    })
}

/// Encode each path segment for use in a URL.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            seg.bytes()
                .map(|b| match b {
                    b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                        (b as char).to_string()
                    }
                    _ => format!("%{:02X}", b),
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    path: String,
    repository: SearchRepository,
}

#[derive(Deserialize)]
struct SearchRepository {
    full_name: String,
    name: String,
}

#[derive(Deserialize)]
struct RepoResponse {
    default_branch: String,
}

#[derive(Deserialize)]
struct ContentResponse {
    sha: String,
}

const TAGS_QUERY: &str = r#"
query ($owner: String!, $name: String!, $cursor: String) {
  repository(owner: $owner, name: $name) {
    refs(refPrefix: "refs/tags/", first: 100, after: $cursor, orderBy: {field: TAG_COMMIT_DATE, direction: DESC}) {
      nodes {
        name
        target {
          ... on Tag {
            tagger {
              date
            }
          }
        }
      }
      pageInfo {
        hasNextPage
        endCursor
      }
    }
  }
}
"#;

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<GraphQlData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct GraphQlData {
    repository: Option<GraphQlRepository>,
}

#[derive(Deserialize)]
struct GraphQlRepository {
    refs: Option<RefConnection>,
}

#[derive(Deserialize)]
struct RefConnection {
    #[serde(default)]
    nodes: Vec<RefNode>,
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
}

#[derive(Deserialize)]
struct RefNode {
    name: Option<String>,
    target: Option<RefTarget>,
}

#[derive(Deserialize)]
struct RefTarget {
    tagger: Option<Tagger>,
}

#[derive(Deserialize)]
struct Tagger {
    date: Option<String>,
}

#[derive(Deserialize)]
struct PageInfo {
    #[serde(rename = "hasNextPage")]
    has_next_page: bool,
    #[serde(rename = "endCursor")]
    end_cursor: Option<String>,
}

impl GitHubClient {
    /// One page of the tag query. Transport errors, non-2xx statuses and
    /// undecodable bodies are all errors.
    fn tag_page(
        &self,
        owner: &str,
        name: &str,
        payload: &serde_json::Value,
    ) -> Result<GraphQlResponse> {
        let resp = self
            .http
            .post(&self.graphql_url)
            .json(payload)
            .send()
            .with_context(|| format!("tag query request failed for {}/{}", owner, name))?;
        let resp = ensure_success(resp, &format!("tag query {}/{}", owner, name))?;
        resp.json().context("invalid tag query response")
    }
}

impl CodeHost for GitHubClient {
    fn search_code(&self, query: &str, page: u32, per_page: u32) -> Result<SearchPage> {
        let url = format!("{}/search/code", self.api_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("q", query.to_string()),
                ("per_page", per_page.to_string()),
                ("page", page.to_string()),
            ])
            .send()
            .with_context(|| format!("code search request failed: {}", query))?;
        let resp = ensure_success(resp, "code search")?;

        let has_next = resp
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .map(link_has_next)
            .unwrap_or(false);
        let body: SearchResponse = resp.json().context("invalid code search response")?;

        Ok(SearchPage {
            items: body
                .items
                .into_iter()
                .map(|i| CodeMatch {
                    repo_full_name: i.repository.full_name,
                    repo_name: i.repository.name,
                    path: i.path,
                })
                .collect(),
            has_next,
        })
    }

    fn default_branch(&self, repo_full_name: &str) -> Result<String> {
        let url = format!("{}/repos/{}", self.api_url, repo_full_name);
        let resp = self.http.get(&url).send()?;
        let resp = ensure_success(resp, &format!("repository lookup {}", repo_full_name))?;
        let repo: RepoResponse = resp.json()?;
        Ok(repo.default_branch)
    }

    fn raw_file(&self, repo_full_name: &str, branch: &str, path: &str) -> Result<String> {
        let url = format!(
            "{}/{}/{}/{}",
            self.raw_url,
            repo_full_name,
            encode_path(branch),
            encode_path(path)
        );
        let resp = self.http.get(&url).send()?;
        let resp = ensure_success(resp, &format!("raw fetch {}", url))?;
        Ok(resp.text()?)
    }

    fn repository_tags(&self, owner: &str, name: &str) -> Result<Vec<TagRecord>> {
        let mut tags = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let payload = json!({
                "query": TAGS_QUERY,
                "variables": { "owner": owner, "name": name, "cursor": cursor },
            });
            let body = match self.tag_page(owner, name, &payload) {
                Ok(body) => body,
                Err(e) if cursor.is_none() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        repo = name,
                        fetched = tags.len(),
                        error = %format!("{:#}", e),
                        "tag query failed; keeping tags fetched so far"
                    );
                    break;
                }
            };
            for err in &body.errors {
                tracing::warn!(repo = name, error = %err.message, "tag query reported an error");
            }
            let Some(refs) = body.data.and_then(|d| d.repository).and_then(|r| r.refs) else {
                tracing::debug!(repo = name, "repository not found or has no refs");
                break;
            };

            for node in refs.nodes {
                let Some(tag_name) = node.name else { continue };
                let tagger_date = node.target.and_then(|t| t.tagger).and_then(|t| t.date);
                tags.push(TagRecord {
                    name: tag_name,
                    tagger_date,
                });
            }

            match (refs.page_info.has_next_page, refs.page_info.end_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }

        Ok(tags)
    }

    fn file_sha(&self, repo_full_name: &str, path: &str, branch: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/repos/{}/contents/{}",
            self.api_url,
            repo_full_name,
            encode_path(path)
        );
        let resp = self.http.get(&url).query(&[("ref", branch)]).send()?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = ensure_success(resp, &format!("contents lookup {}", path))?;
        let content: ContentResponse = resp.json()?;
        Ok(Some(content.sha))
    }

    fn put_file(&self, repo_full_name: &str, commit: &FileCommit<'_>) -> Result<()> {
        let url = format!(
            "{}/repos/{}/contents/{}",
            self.api_url,
            repo_full_name,
            encode_path(commit.path)
        );
        let mut payload = json!({
            "message": commit.message,
            "content": base64::engine::general_purpose::STANDARD.encode(commit.content),
            "branch": commit.branch,
        });
        if let Some(sha) = &commit.sha {
            payload["sha"] = json!(sha);
        }
        let resp = self.http.put(&url).json(&payload).send()?;
        ensure_success(resp, &format!("commit {}", commit.path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_header_next_detection() {
        let link = r#"<https://api.github.com/search/code?q=x&page=2>; rel="next", <https://api.github.com/search/code?q=x&page=10>; rel="last""#;
        assert!(link_has_next(link));

        let last_page = r#"<https://api.github.com/search/code?q=x&page=1>; rel="prev", <https://api.github.com/search/code?q=x&page=1>; rel="first""#;
        assert!(!link_has_next(last_page));
        assert!(!link_has_next(""));
    }

    #[test]
    fn path_segments_are_encoded() {
        assert_eq!(encode_path("data/ci map.json"), "data/ci%20map.json");
        assert_eq!(encode_path("feature/x#1"), "feature/x%231");
        assert_eq!(encode_path("a/b-c_d.e~f"), "a/b-c_d.e~f");
    }

    #[test]
    fn graphql_tags_parse_with_lightweight_and_missing_repo() {
        let body = r#"{"data":{"repository":{"refs":{"nodes":[
            {"name":"CHG0001_rel","target":{"tagger":{"date":"2024-05-02T10:00:00-04:00"}}},
            {"name":"v1.0","target":{}}
        ],"pageInfo":{"hasNextPage":false,"endCursor":null}}}}}"#;
        let parsed: GraphQlResponse = serde_json::from_str(body).unwrap();
        let refs = parsed.data.unwrap().repository.unwrap().refs.unwrap();
        assert_eq!(refs.nodes.len(), 2);
        assert!(refs.nodes[1].target.as_ref().unwrap().tagger.is_none());
        assert!(!refs.page_info.has_next_page);

        let missing: GraphQlResponse = serde_json::from_str(
            r#"{"data":{"repository":null},"errors":[{"message":"Could not resolve"}]}"#,
        )
        .unwrap();
        assert!(missing.data.unwrap().repository.is_none());
        assert_eq!(missing.errors.len(), 1);
    }

    #[test]
    fn search_response_parses() {
        let body = r#"{"total_count":1,"items":[{"name":"repo.metadata","path":"repo.metadata",
            "repository":{"name":"payments","full_name":"acme/payments"}}]}"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.items[0].repository.full_name, "acme/payments");
        assert_eq!(parsed.items[0].path, "repo.metadata");
    }
}
