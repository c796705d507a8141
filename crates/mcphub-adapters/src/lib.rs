//! Source lookup contracts + the catalog and GitHub adapters behind them.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use mcphub_core::ResourceType;
use mcphub_storage::{FetchError, HttpClientConfig, HttpFetcher, TokenBucketConfig};
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub const CRATE_NAME: &str = "mcphub-adapters";

pub const GITHUB_SOURCE_NAME: &str = "GitHub";
pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";

const BUILTIN_CATALOG: &str = include_str!("../../../catalog.yaml");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterContext {
    pub run_id: Uuid,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// One match from the primary source. Editorial fields are optional; the
/// collector derives whatever is missing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebHit {
    pub title: String,
    pub url: String,
    pub description: String,
    pub source: String,
    #[serde(default, rename = "type")]
    pub resource_type: Option<ResourceType>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub rating: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHit {
    pub name: String,
    pub html_url: String,
    pub description: String,
    pub stars: u64,
    pub language: Option<String>,
}

#[async_trait]
pub trait PrimarySource: Send + Sync {
    fn source_id(&self) -> &'static str;

    async fn search(&self, ctx: &AdapterContext, term: &str) -> Result<Vec<WebHit>, AdapterError>;
}

/// Code-repository index queried with the fixed secondary term set.
#[async_trait]
pub trait RepositoryIndex: Send + Sync {
    /// Provenance label stamped on every mapped resource.
    fn source_name(&self) -> &str;

    async fn search(
        &self,
        ctx: &AdapterContext,
        term: &str,
    ) -> Result<Vec<RepositoryHit>, AdapterError>;
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    entries: Vec<WebHit>,
}

/// Editorial catalog standing in for a web search engine.
#[derive(Debug, Clone)]
pub struct CatalogSource {
    entries: Vec<WebHit>,
    haystacks: Vec<String>,
}

impl CatalogSource {
    pub fn builtin() -> Result<Self> {
        Self::from_yaml_str(BUILTIN_CATALOG).context("parsing built-in catalog.yaml")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&yaml).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(yaml)?;
        Ok(Self::new(file.entries))
    }

    pub fn new(entries: Vec<WebHit>) -> Self {
        let haystacks = entries
            .iter()
            .map(|entry| {
                let tags = entry.tags.as_deref().unwrap_or_default().join(" ");
                format!("{} {} {}", entry.title, entry.description, tags).to_lowercase()
            })
            .collect();
        Self { entries, haystacks }
    }

    pub fn entries(&self) -> &[WebHit] {
        &self.entries
    }

    /// Case-insensitive: the whole term, or any of its whitespace-split tokens,
    /// occurring in title + description + tags.
    pub fn lookup(&self, term: &str) -> Vec<WebHit> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let tokens = needle.split_whitespace().collect::<Vec<_>>();
        self.entries
            .iter()
            .zip(&self.haystacks)
            .filter(|(_, haystack)| {
                haystack.contains(&needle) || tokens.iter().any(|token| haystack.contains(token))
            })
            .map(|(entry, _)| entry.clone())
            .collect()
    }
}

#[async_trait]
impl PrimarySource for CatalogSource {
    fn source_id(&self) -> &'static str {
        "catalog"
    }

    async fn search(&self, ctx: &AdapterContext, term: &str) -> Result<Vec<WebHit>, AdapterError> {
        let hits = self.lookup(term);
        debug!(run_id = %ctx.run_id, term, hits = hits.len(), "catalog lookup");
        Ok(hits)
    }
}

#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub api_base: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_GITHUB_API_BASE.to_string(),
            user_agent: "mcphub-bot/0.1".to_string(),
            timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GithubSearchResponse {
    #[serde(default)]
    items: Vec<GithubRepository>,
}

#[derive(Debug, Deserialize)]
struct GithubRepository {
    name: String,
    html_url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    language: Option<String>,
}

impl From<GithubRepository> for RepositoryHit {
    fn from(repo: GithubRepository) -> Self {
        Self {
            name: repo.name,
            html_url: repo.html_url,
            description: repo.description.unwrap_or_default(),
            stars: repo.stargazers_count,
            language: repo.language.filter(|l| !l.trim().is_empty()),
        }
    }
}

/// Unauthenticated GitHub repository search (10 requests/minute upstream).
#[derive(Debug, Clone)]
pub struct GithubRepositoryIndex {
    http: Arc<HttpFetcher>,
    api_base: String,
}

impl GithubRepositoryIndex {
    pub fn new(config: GithubConfig) -> Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: config.timeout,
            user_agent: Some(config.user_agent.clone()),
            default_headers: vec![
                ("accept".to_string(), "application/vnd.github+json".to_string()),
                ("x-github-api-version".to_string(), "2022-11-28".to_string()),
            ],
            token_bucket: Some(TokenBucketConfig {
                capacity: 10,
                refill_every: Duration::from_secs(6),
            }),
            ..Default::default()
        })?;
        Ok(Self::with_fetcher(Arc::new(http), config.api_base))
    }

    pub fn with_fetcher(http: Arc<HttpFetcher>, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into(),
        }
    }

    pub fn search_url(&self, term: &str) -> Result<Url, AdapterError> {
        let endpoint = format!("{}/search/repositories", self.api_base.trim_end_matches('/'));
        Url::parse_with_params(
            &endpoint,
            &[
                (
                    "q",
                    format!("{term} language:python OR language:typescript").as_str(),
                ),
                ("sort", "stars"),
                ("order", "desc"),
                ("per_page", "30"),
            ],
        )
        .map_err(|e| AdapterError::Message(format!("invalid search url {endpoint}: {e}")))
    }
}

#[async_trait]
impl RepositoryIndex for GithubRepositoryIndex {
    fn source_name(&self) -> &str {
        GITHUB_SOURCE_NAME
    }

    async fn search(
        &self,
        ctx: &AdapterContext,
        term: &str,
    ) -> Result<Vec<RepositoryHit>, AdapterError> {
        let url = self.search_url(term)?;
        let response: GithubSearchResponse = self
            .http
            .fetch_json(ctx.run_id, "github", url.as_str())
            .await?;
        Ok(response.items.into_iter().map(RepositoryHit::from).collect())
    }
}

/// Canned repository hits keyed by term; used when the network is off-limits.
#[derive(Debug, Clone, Default)]
pub struct StaticRepositoryIndex {
    name: String,
    hits: Vec<(String, Vec<RepositoryHit>)>,
}

impl StaticRepositoryIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hits: Vec::new(),
        }
    }

    pub fn with_hits(mut self, term: impl Into<String>, hits: Vec<RepositoryHit>) -> Self {
        self.hits.push((term.into(), hits));
        self
    }
}

#[async_trait]
impl RepositoryIndex for StaticRepositoryIndex {
    fn source_name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        _ctx: &AdapterContext,
        term: &str,
    ) -> Result<Vec<RepositoryHit>, AdapterError> {
        Ok(self
            .hits
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(term))
            .flat_map(|(_, hits)| hits.iter().cloned())
            .collect())
    }
}
