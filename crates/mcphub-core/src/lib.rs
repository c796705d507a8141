//! Core domain model for the MCP resource hub.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

pub const CRATE_NAME: &str = "mcphub-core";

/// Terms searched when a request names none.
pub const DEFAULT_TERMS: [&str; 5] = [
    "Model Context Protocol MCP",
    "MCP tutorial",
    "MCP server implementation",
    "MCP client examples",
    "Anthropic MCP",
];

/// Fixed query set for the repository index; independent of the request terms.
pub const SECONDARY_TERMS: [&str; 5] = [
    "MCP",
    "model-context-protocol",
    "anthropic mcp",
    "mcp server",
    "mcp client",
];

pub const MAX_TERMS: usize = 50;
pub const MAX_TERM_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Tutorial,
    Documentation,
    Service,
    Tool,
    Example,
    News,
    Article,
    Video,
    Resource,
    Community,
    Other,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Tutorial => "tutorial",
            ResourceType::Documentation => "documentation",
            ResourceType::Service => "service",
            ResourceType::Tool => "tool",
            ResourceType::Example => "example",
            ResourceType::News => "news",
            ResourceType::Article => "article",
            ResourceType::Video => "video",
            ResourceType::Resource => "resource",
            ResourceType::Community => "community",
            ResourceType::Other => "other",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered, classified item. Field names match the export format consumed
/// by the CSV/JSON/HTML report generators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub title: String,
    /// Identity key within a collection result.
    pub url: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub description: String,
    pub date_found: DateTime<Utc>,
    pub source: String,
    pub tags: BTreeSet<String>,
    pub language: String,
    pub rating: u8,
}

/// Aggregates over one deduplicated resource list. `top_tags` holds the full
/// frequency map; truncation happens at presentation time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CollectionStats {
    pub total_resources: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, usize>,
    pub by_language: BTreeMap<String, usize>,
    #[serde(rename = "top_tags")]
    pub tag_frequencies: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionResult {
    pub resources: Vec<Resource>,
    pub stats: CollectionStats,
    #[serde(rename = "collectedAt", alias = "collected_at")]
    pub collected_at: DateTime<Utc>,
}

/// Phase names as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressStep {
    #[serde(rename = "web_search")]
    PrimarySearch,
    #[serde(rename = "github_search")]
    SecondarySearch,
    #[serde(rename = "deduplication")]
    Deduplication,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "error")]
    Error,
}

impl ProgressStep {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProgressStep::Completed | ProgressStep::Error)
    }
}

/// One frame of the phased-execution status stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub step: ProgressStep,
    pub progress: usize,
    pub total_steps: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_keyword: Option<String>,
    pub collected_count: u64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("request body is not valid JSON: {0}")]
    MalformedJson(String),
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("`terms` must be an array of strings")]
    TermsNotArray,
    #[error("`terms[{index}]` must be a string")]
    TermNotString { index: usize },
    #[error("`includeSecondarySource` must be a boolean")]
    FlagNotBool,
    #[error("too many terms: {count} (max {max})", max = MAX_TERMS)]
    TooManyTerms { count: usize },
    #[error("term {index} exceeds {max} characters", max = MAX_TERM_CHARS)]
    TermTooLong { index: usize },
}

/// Validated input shared by the collection and progress invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectRequest {
    terms: Vec<String>,
    #[serde(rename = "includeSecondarySource")]
    include_secondary_source: bool,
}

impl Default for CollectRequest {
    fn default() -> Self {
        Self {
            terms: DEFAULT_TERMS.iter().map(|t| t.to_string()).collect(),
            include_secondary_source: true,
        }
    }
}

impl CollectRequest {
    /// Trims terms and drops blank ones; an empty list falls back to [`DEFAULT_TERMS`].
    pub fn new<I, S>(terms: I, include_secondary_source: bool) -> Result<Self, InputError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized = Vec::new();
        for (index, term) in terms.into_iter().enumerate() {
            let term = term.as_ref().trim();
            if term.is_empty() {
                continue;
            }
            if term.chars().count() > MAX_TERM_CHARS {
                return Err(InputError::TermTooLong { index });
            }
            normalized.push(term.to_string());
        }
        if normalized.len() > MAX_TERMS {
            return Err(InputError::TooManyTerms {
                count: normalized.len(),
            });
        }
        if normalized.is_empty() {
            normalized = DEFAULT_TERMS.iter().map(|t| t.to_string()).collect();
        }
        Ok(Self {
            terms: normalized,
            include_secondary_source,
        })
    }

    /// Parses a request body. Accepts `terms`/`keywords` and
    /// `includeSecondarySource`/`includeGithub`; an empty body means all defaults.
    pub fn from_json_slice(body: &[u8]) -> Result<Self, InputError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let value: JsonValue =
            serde_json::from_slice(body).map_err(|e| InputError::MalformedJson(e.to_string()))?;
        let JsonValue::Object(map) = value else {
            return Err(InputError::NotAnObject);
        };

        let terms = match map.get("terms").or_else(|| map.get("keywords")) {
            None | Some(JsonValue::Null) => Vec::new(),
            Some(JsonValue::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    item.as_str()
                        .map(ToString::to_string)
                        .ok_or(InputError::TermNotString { index })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(InputError::TermsNotArray),
        };

        let include_secondary_source = match map
            .get("includeSecondarySource")
            .or_else(|| map.get("includeGithub"))
        {
            None | Some(JsonValue::Null) => true,
            Some(JsonValue::Bool(flag)) => *flag,
            Some(_) => return Err(InputError::FlagNotBool),
        };

        Self::new(terms, include_secondary_source)
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn include_secondary_source(&self) -> bool {
        self.include_secondary_source
    }

    /// Step count shared by every search, dedup and completion event of a run.
    pub fn total_steps(&self) -> usize {
        self.terms.len()
            + if self.include_secondary_source {
                SECONDARY_TERMS.len()
            } else {
                0
            }
    }
}
