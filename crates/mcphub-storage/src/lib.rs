//! HTTP fetch utilities + the favorites key-value store for the MCP hub.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "mcphub-storage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    /// Sent on every request, e.g. `("accept", "application/vnd.github+json")`.
    pub default_headers: Vec<(String, String)>,
    pub global_concurrency: usize,
    pub per_source_concurrency: usize,
    pub backoff: BackoffPolicy,
    pub token_bucket: Option<TokenBucketConfig>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            default_headers: Vec::new(),
            global_concurrency: 4,
            per_source_concurrency: 1,
            backoff: BackoffPolicy::default(),
            token_bucket: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TokenBucketConfig {
    pub capacity: u32,
    pub refill_every: Duration,
}

/// Request pacing for upstreams with published rate limits.
#[derive(Debug)]
pub struct SimpleTokenBucket {
    capacity: u32,
    refill_every: Duration,
    state: Mutex<TokenBucketState>,
}

#[derive(Debug, Clone, Copy)]
struct TokenBucketState {
    tokens: u32,
    last_refill: Instant,
}

impl SimpleTokenBucket {
    pub fn new(capacity: u32, refill_every: Duration) -> Self {
        Self {
            capacity,
            refill_every,
            state: Mutex::new(TokenBucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub async fn take(&self) {
        loop {
            let mut state = self.state.lock().await;
            let elapsed = state.last_refill.elapsed();
            if elapsed >= self.refill_every && self.refill_every.as_millis() > 0 {
                let refills = (elapsed.as_millis() / self.refill_every.as_millis()) as u32;
                state.tokens = state.tokens.saturating_add(refills).min(self.capacity);
                state.last_refill = Instant::now();
            }

            if state.tokens > 0 {
                state.tokens -= 1;
                return;
            }

            let sleep_for = self.refill_every;
            drop(state);
            tokio::time::sleep(sleep_for).await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("decoding response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("fetcher closed")]
    Closed,
}

/// Shared outbound client: global + per-source concurrency caps, optional token
/// bucket, bounded retries with exponential backoff.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    global_limit: Arc<Semaphore>,
    per_source_limit: usize,
    per_source: Mutex<HashMap<String, Arc<Semaphore>>>,
    token_bucket: Option<Arc<SimpleTokenBucket>>,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        if !config.default_headers.is_empty() {
            let mut headers = HeaderMap::new();
            for (name, value) in &config.default_headers {
                headers.insert(
                    HeaderName::from_bytes(name.as_bytes())
                        .with_context(|| format!("invalid header name {name}"))?,
                    HeaderValue::from_str(value)
                        .with_context(|| format!("invalid value for header {name}"))?,
                );
            }
            builder = builder.default_headers(headers);
        }

        let client = builder.build().context("building reqwest client")?;
        let token_bucket = config
            .token_bucket
            .map(|c| Arc::new(SimpleTokenBucket::new(c.capacity, c.refill_every)));

        Ok(Self {
            client,
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
            per_source_limit: config.per_source_concurrency.max(1),
            per_source: Mutex::new(HashMap::new()),
            token_bucket,
            backoff: config.backoff,
        })
    }

    async fn per_source_semaphore(&self, source_id: &str) -> Arc<Semaphore> {
        let mut map = self.per_source.lock().await;
        map.entry(source_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_source_limit)))
            .clone()
    }

    pub async fn fetch_bytes(
        &self,
        run_id: Uuid,
        source_id: &str,
        url: &str,
    ) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", %run_id, source_id, url);
        self.fetch_bytes_inner(source_id, url).instrument(span).await
    }

    async fn fetch_bytes_inner(
        &self,
        source_id: &str,
        url: &str,
    ) -> Result<FetchedResponse, FetchError> {
        let _global = self
            .global_limit
            .acquire()
            .await
            .map_err(|_| FetchError::Closed)?;
        let per_source = self.per_source_semaphore(source_id).await;
        let _source = per_source.acquire().await.map_err(|_| FetchError::Closed)?;

        if let Some(bucket) = &self.token_bucket {
            bucket.take().await;
        }

        let mut attempt = 0;
        loop {
            match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();

                    if status.is_success() {
                        let body = resp.bytes().await?.to_vec();
                        debug!(status = status.as_u16(), bytes = body.len(), "fetched");
                        return Ok(FetchedResponse {
                            status,
                            final_url,
                            body,
                        });
                    }

                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }

                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchError::Request(err));
                }
            }
        }
    }

    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        run_id: Uuid,
        source_id: &str,
        url: &str,
    ) -> Result<T, FetchError> {
        let resp = self.fetch_bytes(run_id, source_id, url).await?;
        serde_json::from_slice(&resp.body).map_err(|source| FetchError::Decode {
            url: resp.final_url,
            source,
        })
    }
}

/// Persistence seam for bookmarked resources, keyed by resource URL.
#[async_trait]
pub trait FavoriteStore: Send + Sync {
    async fn load(&self) -> anyhow::Result<BTreeSet<String>>;
    async fn save(&self, urls: &BTreeSet<String>) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryFavoriteStore {
    urls: Mutex<BTreeSet<String>>,
}

#[async_trait]
impl FavoriteStore for MemoryFavoriteStore {
    async fn load(&self) -> anyhow::Result<BTreeSet<String>> {
        Ok(self.urls.lock().await.clone())
    }

    async fn save(&self, urls: &BTreeSet<String>) -> anyhow::Result<()> {
        *self.urls.lock().await = urls.clone();
        Ok(())
    }
}

/// JSON array on disk. A missing file reads as an empty set; writes go through
/// a temp file + rename so readers never observe a partial file.
#[derive(Debug, Clone)]
pub struct JsonFileFavoriteStore {
    path: PathBuf,
}

impl JsonFileFavoriteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FavoriteStore for JsonFileFavoriteStore {
    async fn load(&self) -> anyhow::Result<BTreeSet<String>> {
        if !fs::try_exists(&self.path)
            .await
            .with_context(|| format!("checking favorites file {}", self.path.display()))?
        {
            return Ok(BTreeSet::new());
        }
        let data = fs::read(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        serde_json::from_slice(&data).with_context(|| format!("parsing {}", self.path.display()))
    }

    async fn save(&self, urls: &BTreeSet<String>) -> anyhow::Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating favorites directory {}", parent.display()))?;

        let bytes = serde_json::to_vec_pretty(urls).context("encoding favorites")?;
        let temp_path = parent.join(format!(".{}.favorites.tmp", Uuid::new_v4()));

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp favorites file {}", temp_path.display()))?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("writing temp favorites file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp favorites file {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "renaming temp favorites {} -> {}",
                    temp_path.display(),
                    self.path.display()
                )
            });
        }
        Ok(())
    }
}

/// Favorites over an explicit store. Every mutation loads, edits and saves.
pub struct Favorites<S: FavoriteStore> {
    store: S,
}

impl<S: FavoriteStore> Favorites<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> anyhow::Result<BTreeSet<String>> {
        self.store.load().await
    }

    pub async fn is_favorite(&self, url: &str) -> anyhow::Result<bool> {
        Ok(self.store.load().await?.contains(url))
    }

    /// Returns whether `url` is a favorite after the call.
    pub async fn toggle(&self, url: &str) -> anyhow::Result<bool> {
        let mut urls = self.store.load().await?;
        let now_favorite = if urls.remove(url) {
            false
        } else {
            urls.insert(url.to_string());
            true
        };
        self.store.save(&urls).await?;
        Ok(now_favorite)
    }

    /// Returns false when `url` was already present.
    pub async fn add(&self, url: &str) -> anyhow::Result<bool> {
        let mut urls = self.store.load().await?;
        let inserted = urls.insert(url.to_string());
        if inserted {
            self.store.save(&urls).await?;
        }
        Ok(inserted)
    }

    /// Returns false when `url` was not present.
    pub async fn remove(&self, url: &str) -> anyhow::Result<bool> {
        let mut urls = self.store.load().await?;
        let removed = urls.remove(url);
        if removed {
            self.store.save(&urls).await?;
        }
        Ok(removed)
    }
}
