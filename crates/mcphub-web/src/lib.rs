//! Axum HTTP surface: collection, progress SSE, export and the HTML report.

use std::convert::Infallible;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use askama::Template;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures::StreamExt;
use mcphub_adapters::{CatalogSource, GithubConfig, GithubRepositoryIndex};
use mcphub_collect::export::{self, export_file_name, top_tags};
use mcphub_collect::progress::FAILURE_MESSAGE;
use mcphub_collect::{CollectorConfig, EmitterConfig, ProgressEmitter, ResourceCollector};
use mcphub_core::{CollectRequest, CollectionResult, InputError, ProgressEvent};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

pub const CRATE_NAME: &str = "mcphub-web";
pub const API_VERSION: &str = "1.0.0";

const COLLECT_FAILURE: &str = "Failed to collect MCP resources";
const REPORT_TOP_TAGS: usize = 10;

/// Runtime settings read from `MCPHUB_*` environment variables.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub port: u16,
    pub github_api_base: String,
    pub user_agent: String,
    pub http_timeout: Duration,
    pub term_delay: Duration,
    pub secondary_delay: Duration,
    pub catalog_path: Option<PathBuf>,
    pub favorites_path: PathBuf,
}

impl Default for HubConfig {
    fn default() -> Self {
        let github = GithubConfig::default();
        Self {
            port: 3000,
            github_api_base: github.api_base,
            user_agent: github.user_agent,
            http_timeout: github.timeout,
            term_delay: Duration::from_millis(1000),
            secondary_delay: Duration::from_millis(1000),
            catalog_path: None,
            favorites_path: PathBuf::from("./favorites.json"),
        }
    }
}

impl HubConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse("MCPHUB_WEB_PORT").unwrap_or(defaults.port),
            github_api_base: std::env::var("MCPHUB_GITHUB_API_BASE").unwrap_or(defaults.github_api_base),
            user_agent: std::env::var("MCPHUB_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout: env_parse("MCPHUB_HTTP_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            term_delay: env_parse("MCPHUB_TERM_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.term_delay),
            secondary_delay: env_parse("MCPHUB_SECONDARY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.secondary_delay),
            catalog_path: std::env::var_os("MCPHUB_CATALOG_PATH").map(PathBuf::from),
            favorites_path: std::env::var_os("MCPHUB_FAVORITES_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.favorites_path),
        }
    }

    pub fn emitter_config(&self) -> EmitterConfig {
        EmitterConfig {
            term_delay: self.term_delay,
            completion_delay: self.term_delay / 2,
        }
    }

    /// Catalog-backed primary source plus the live GitHub index.
    pub fn build_collector(&self) -> anyhow::Result<ResourceCollector> {
        let catalog = match &self.catalog_path {
            Some(path) => CatalogSource::from_path(path)?,
            None => CatalogSource::builtin()?,
        };
        let github = GithubRepositoryIndex::new(GithubConfig {
            api_base: self.github_api_base.clone(),
            user_agent: self.user_agent.clone(),
            timeout: self.http_timeout,
        })
        .context("building GitHub client")?;
        Ok(ResourceCollector::new(Arc::new(catalog), Arc::new(github)).with_config(CollectorConfig {
            secondary_delay: self.secondary_delay,
        }))
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<ResourceCollector>,
    pub emitter: EmitterConfig,
}

impl AppState {
    pub fn new(collector: ResourceCollector, emitter: EmitterConfig) -> Self {
        Self {
            collector: Arc::new(collector),
            emitter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Html,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Html => "html",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv; charset=utf-8",
            Self::Html => "text/html; charset=utf-8",
        }
    }

    pub fn render(self, result: &CollectionResult) -> anyhow::Result<String> {
        match self {
            Self::Json => Ok(export::to_json(result)?),
            Self::Csv => Ok(export::to_csv(&result.resources)),
            Self::Html => render_report(result),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "html" => Ok(Self::Html),
            other => Err(format!("unsupported export format `{other}` (expected json, csv or html)")),
        }
    }
}

#[derive(Debug, Clone)]
struct ResourceCard {
    title: String,
    url: String,
    resource_type: String,
    source: String,
    language: String,
    rating: u8,
    description: String,
    tags: Vec<String>,
    date_found: String,
}

#[derive(Template)]
#[template(path = "report.html")]
struct ReportTemplate {
    collected_at: String,
    total: usize,
    by_type: Vec<(String, usize)>,
    by_source: Vec<(String, usize)>,
    by_language: Vec<(String, usize)>,
    top_tags: Vec<(String, usize)>,
    cards: Vec<ResourceCard>,
}

pub fn render_report(result: &CollectionResult) -> anyhow::Result<String> {
    let pairs = |map: &std::collections::BTreeMap<String, usize>| {
        map.iter().map(|(k, v)| (k.clone(), *v)).collect::<Vec<_>>()
    };
    let tpl = ReportTemplate {
        collected_at: result.collected_at.format("%Y-%m-%d %H:%M UTC").to_string(),
        total: result.stats.total_resources,
        by_type: pairs(&result.stats.by_type),
        by_source: pairs(&result.stats.by_source),
        by_language: pairs(&result.stats.by_language),
        top_tags: top_tags(&result.stats, REPORT_TOP_TAGS),
        cards: result
            .resources
            .iter()
            .map(|r| ResourceCard {
                title: r.title.clone(),
                url: r.url.clone(),
                resource_type: r.resource_type.to_string(),
                source: r.source.clone(),
                language: r.language.clone(),
                rating: r.rating,
                description: r.description.clone(),
                tags: r.tags.iter().cloned().collect(),
                date_found: r.date_found.format("%Y-%m-%d").to_string(),
            })
            .collect(),
    };
    Ok(tpl.render()?)
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/mcp-collect", post(collect_handler).get(collect_probe_handler))
        .route(
            "/api/mcp-collect-progress",
            post(progress_handler).get(progress_probe_handler),
        )
        .route("/api/mcp-export", post(export_handler))
        .route("/healthz", get(|| async { "ok" }))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .with_state(Arc::new(state))
}

pub async fn serve(config: HubConfig) -> anyhow::Result<()> {
    let state = AppState::new(config.build_collector()?, config.emitter_config());
    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;
    info!(port = config.port, "mcphub web listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    serve(HubConfig::from_env()).await
}

async fn collect_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = match CollectRequest::from_json_slice(&body) {
        Ok(request) => request,
        Err(err) => return input_error(err),
    };
    let collector = state.collector.clone();
    match tokio::spawn(async move { collector.collect(&request).await }).await {
        Ok(result) => Json(json!({ "success": true, "data": result })).into_response(),
        Err(err) => {
            error!(error = %err, "collection task failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, COLLECT_FAILURE)
        }
    }
}

async fn collect_probe_handler() -> Json<serde_json::Value> {
    Json(json!({
        "message": "MCP resource collection API",
        "endpoints": {
            "POST /api/mcp-collect": "Collect MCP resources for the given terms",
            "POST /api/mcp-collect-progress": "Stream collection progress as Server-Sent Events",
            "POST /api/mcp-export": "Export a collection result as json, csv or html",
        },
        "methods": ["GET", "POST"],
        "version": API_VERSION,
    }))
}

async fn progress_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = match CollectRequest::from_json_slice(&body) {
        Ok(request) => request,
        Err(err) => return input_error(err),
    };
    info!(
        terms = request.terms().len(),
        total_steps = request.total_steps(),
        "progress stream opened"
    );
    let events = ProgressEmitter::new(&request, state.emitter.clone())
        .into_stream()
        .scan(false, |failed, event| {
            let frame = if *failed {
                None
            } else {
                Some(Ok::<_, Infallible>(sse_frame(&event, failed)))
            };
            futures::future::ready(frame)
        });

    let mut response = Sse::new(events).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

/// Serializes one event; a failure yields the terminal error frame and marks the stream done.
fn sse_frame(event: &ProgressEvent, failed: &mut bool) -> Event {
    match Event::default().json_data(event) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(error = %err, "progress event serialization failed");
            *failed = true;
            Event::default().data(
                json!({
                    "step": "error",
                    "progress": 0,
                    "total_steps": 0,
                    "collected_count": 0,
                    "message": FAILURE_MESSAGE,
                })
                .to_string(),
            )
        }
    }
}

async fn progress_probe_handler() -> Json<serde_json::Value> {
    Json(json!({
        "message": "MCP resource collection progress stream",
        "description": "POST collection terms to receive step-by-step progress events",
        "methods": ["GET", "POST"],
        "format": "Server-Sent Events (SSE)",
        "version": API_VERSION,
    }))
}

#[derive(Debug, Deserialize, Default)]
struct ExportQuery {
    format: Option<String>,
}

async fn export_handler(Query(query): Query<ExportQuery>, body: Bytes) -> Response {
    let format = match query.format.as_deref().unwrap_or("json").parse::<ExportFormat>() {
        Ok(format) => format,
        Err(message) => return failure(StatusCode::BAD_REQUEST, &message),
    };
    let result = match std::str::from_utf8(&body)
        .map_err(|err| err.to_string())
        .and_then(|text| export::from_json(text).map_err(|err| err.to_string()))
    {
        Ok(result) => result,
        Err(message) => return failure(StatusCode::BAD_REQUEST, &message),
    };
    match format.render(&result) {
        Ok(content) => {
            let disposition = format!(
                "attachment; filename=\"{}\"",
                export_file_name(Utc::now(), format.extension())
            );
            (
                [
                    (header::CONTENT_TYPE, format.content_type().to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                content,
            )
                .into_response()
        }
        Err(err) => {
            error!(error = %err, format = format.extension(), "export rendering failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to export MCP resources")
        }
    }
}

fn input_error(err: InputError) -> Response {
    warn!(error = %err, "rejected request body");
    failure(StatusCode::BAD_REQUEST, &err.to_string())
}

fn failure(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "error": message }))).into_response()
}
