//! Resource collection: classification, tagging, dedup, stats, plus the
//! simulated progress stream that fronts a collection run.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mcphub_adapters::{AdapterContext, PrimarySource, RepositoryHit, RepositoryIndex, WebHit};
use mcphub_core::{CollectRequest, CollectionResult, CollectionStats, Resource, ResourceType, SECONDARY_TERMS};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod export;
pub mod progress;

pub use progress::{CountSource, EmitterConfig, ProgressEmitter, RandomCounts};

pub const CRATE_NAME: &str = "mcphub-collect";

/// Prefix marking protocol-concept tags apart from technology tags.
pub const CONCEPT_TAG_PREFIX: &str = "mcp";

const TUTORIAL_KEYWORDS: &[&str] = &["tutorial", "教程", "guide", "指南", "how to"];
const DOCUMENTATION_KEYWORDS: &[&str] = &["documentation", "文档", "docs", "api"];
const SERVICE_KEYWORDS: &[&str] = &["server", "service", "服务", "integration"];
const EXAMPLE_KEYWORDS: &[&str] = &["example", "demo", "sample"];
const NEWS_KEYWORDS: &[&str] = &["news", "新闻", "announcement", "发布"];
const ARTICLE_KEYWORDS: &[&str] = &["blog", "博客", "article", "文章"];

const TECH_TAGS: &[&str] = &[
    "python",
    "typescript",
    "javascript",
    "nodejs",
    "claude",
    "anthropic",
    "openai",
    "chatgpt",
    "llm",
    "ai",
    "sdk",
    "api",
    "rest",
    "websocket",
];
const CONCEPT_TAGS: &[&str] = &[
    "server",
    "client",
    "protocol",
    "integration",
    "tool",
    "resource",
    "prompt",
];

fn contains_any(content: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| content.contains(needle))
}

fn is_repository_url(url: &str) -> bool {
    url.contains("github.com")
}

fn is_video_url(url: &str) -> bool {
    url.contains("youtube.com") || url.contains("youtu.be")
}

/// First matching rule wins; the order below is load-bearing.
pub fn classify_resource_type(title: &str, description: &str, url: &str) -> ResourceType {
    let content = format!("{title} {description}").to_lowercase();

    if contains_any(&content, TUTORIAL_KEYWORDS) {
        ResourceType::Tutorial
    } else if contains_any(&content, DOCUMENTATION_KEYWORDS) {
        ResourceType::Documentation
    } else if contains_any(&content, SERVICE_KEYWORDS) {
        ResourceType::Service
    } else if is_repository_url(url) && contains_any(&content, EXAMPLE_KEYWORDS) {
        ResourceType::Example
    } else if is_repository_url(url) {
        ResourceType::Tool
    } else if contains_any(&content, NEWS_KEYWORDS) {
        ResourceType::News
    } else if contains_any(&content, ARTICLE_KEYWORDS) {
        ResourceType::Article
    } else if is_video_url(url) || content.contains("video") {
        ResourceType::Video
    } else {
        ResourceType::Other
    }
}

pub fn extract_tags(title: &str, description: &str) -> BTreeSet<String> {
    let content = format!("{title} {description}").to_lowercase();
    let mut tags = TECH_TAGS
        .iter()
        .filter(|tag| content.contains(*tag))
        .map(|tag| tag.to_string())
        .collect::<BTreeSet<_>>();
    tags.extend(
        CONCEPT_TAGS
            .iter()
            .filter(|tag| content.contains(*tag))
            .map(|tag| format!("{CONCEPT_TAG_PREFIX}-{tag}")),
    );
    tags
}

/// `zh` when the title carries a CJK unified ideograph, `en` otherwise.
pub fn detect_language(title: &str) -> &'static str {
    if title.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c)) {
        "zh"
    } else {
        "en"
    }
}

pub fn rating_from_stars(stars: u64) -> u8 {
    (stars / 10).min(5) as u8
}

/// Keeps the first resource seen for each URL, preserving discovery order.
pub fn remove_duplicates(resources: Vec<Resource>) -> Vec<Resource> {
    let mut seen_urls = HashSet::new();
    resources
        .into_iter()
        .filter(|resource| seen_urls.insert(resource.url.clone()))
        .collect()
}

pub fn compute_stats(resources: &[Resource]) -> CollectionStats {
    let mut stats = CollectionStats {
        total_resources: resources.len(),
        ..Default::default()
    };
    for resource in resources {
        *stats
            .by_type
            .entry(resource.resource_type.as_str().to_string())
            .or_default() += 1;
        *stats.by_source.entry(resource.source.clone()).or_default() += 1;
        *stats
            .by_language
            .entry(resource.language.clone())
            .or_default() += 1;
        for tag in &resource.tags {
            *stats.tag_frequencies.entry(tag.clone()).or_default() += 1;
        }
    }
    stats
}

pub fn resource_from_web_hit(hit: WebHit, found_at: DateTime<Utc>) -> Resource {
    let resource_type = hit
        .resource_type
        .unwrap_or_else(|| classify_resource_type(&hit.title, &hit.description, &hit.url));
    let tags = match &hit.tags {
        Some(tags) => tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect(),
        None => extract_tags(&hit.title, &hit.description),
    };
    let language = hit
        .language
        .clone()
        .unwrap_or_else(|| detect_language(&hit.title).to_string());
    let source = if hit.source.trim().is_empty() {
        "web".to_string()
    } else {
        hit.source
    };
    Resource {
        title: hit.title,
        url: hit.url,
        resource_type,
        description: hit.description,
        date_found: found_at,
        source,
        tags,
        language,
        rating: hit.rating.unwrap_or(0).min(5),
    }
}

pub fn resource_from_repository_hit(
    hit: RepositoryHit,
    source_name: &str,
    found_at: DateTime<Utc>,
) -> Resource {
    let mut tags = extract_tags(&hit.name, &hit.description);
    let resource_type = match &hit.language {
        Some(language) => {
            tags.insert(language.to_lowercase());
            ResourceType::Tool
        }
        None => ResourceType::Example,
    };
    Resource {
        title: hit.name,
        url: hit.html_url,
        resource_type,
        description: hit.description,
        date_found: found_at,
        source: source_name.to_string(),
        tags,
        language: "en".to_string(),
        rating: rating_from_stars(hit.stars),
    }
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Pause between successive repository-index calls.
    pub secondary_delay: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            secondary_delay: Duration::from_secs(1),
        }
    }
}

/// Produces the finished resource list for a request in one call. Per-term
/// failures are logged and contribute nothing; they never abort the run.
pub struct ResourceCollector {
    primary: Arc<dyn PrimarySource>,
    secondary: Arc<dyn RepositoryIndex>,
    config: CollectorConfig,
}

impl ResourceCollector {
    pub fn new(primary: Arc<dyn PrimarySource>, secondary: Arc<dyn RepositoryIndex>) -> Self {
        Self {
            primary,
            secondary,
            config: CollectorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CollectorConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn collect(&self, request: &CollectRequest) -> CollectionResult {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "collect",
            %run_id,
            terms = request.terms().len(),
            secondary = request.include_secondary_source()
        );
        self.run(run_id, request).instrument(span).await
    }

    async fn run(&self, run_id: Uuid, request: &CollectRequest) -> CollectionResult {
        let ctx = AdapterContext { run_id };
        let mut resources = Vec::new();

        for term in request.terms() {
            match self.primary.search(&ctx, term).await {
                Ok(hits) => {
                    let found_at = Utc::now();
                    resources.extend(hits.into_iter().map(|hit| resource_from_web_hit(hit, found_at)));
                }
                Err(err) => warn!(
                    source = self.primary.source_id(),
                    term = term.as_str(),
                    error = %err,
                    "primary search failed; skipping term"
                ),
            }
        }

        if request.include_secondary_source() {
            for (idx, term) in SECONDARY_TERMS.iter().enumerate() {
                if idx > 0 && !self.config.secondary_delay.is_zero() {
                    tokio::time::sleep(self.config.secondary_delay).await;
                }
                match self.secondary.search(&ctx, term).await {
                    Ok(hits) => {
                        let found_at = Utc::now();
                        let source_name = self.secondary.source_name();
                        resources.extend(
                            hits.into_iter()
                                .map(|hit| resource_from_repository_hit(hit, source_name, found_at)),
                        );
                    }
                    Err(err) => warn!(
                        source = self.secondary.source_name(),
                        term = *term,
                        error = %err,
                        "repository search failed; skipping term"
                    ),
                }
            }
        }

        let discovered = resources.len();
        let resources = remove_duplicates(resources);
        let stats = compute_stats(&resources);
        info!(
            discovered,
            unique = resources.len(),
            "collection finished"
        );

        CollectionResult {
            resources,
            stats,
            collected_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use mcphub_adapters::{AdapterError, CatalogSource, StaticRepositoryIndex};

    /// Counts calls and fails for selected terms.
    struct RecordingIndex {
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
        fail_on: Vec<&'static str>,
    }

    impl RecordingIndex {
        fn new(fail_on: Vec<&'static str>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                fail_on,
            }
        }
    }

    #[async_trait]
    impl RepositoryIndex for RecordingIndex {
        fn source_name(&self) -> &str {
            "GitHub"
        }

        async fn search(
            &self,
            _ctx: &AdapterContext,
            term: &str,
        ) -> Result<Vec<RepositoryHit>, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(term.to_string());
            if self.fail_on.iter().any(|f| *f == term) {
                return Err(AdapterError::Message("rate limited".into()));
            }
            let slug = term.replace(' ', "-");
            Ok(vec![
                RepositoryHit {
                    name: format!("{slug}-demo"),
                    html_url: format!("https://github.com/acme/{slug}-demo"),
                    description: "Example MCP server in Python".into(),
                    stars: 73,
                    language: Some("Python".into()),
                },
                RepositoryHit {
                    name: "shared".into(),
                    html_url: "https://github.com/acme/shared".into(),
                    description: String::new(),
                    stars: 4,
                    language: None,
                },
            ])
        }
    }

    struct FailingPrimary;

    #[async_trait]
    impl PrimarySource for FailingPrimary {
        fn source_id(&self) -> &'static str {
            "failing"
        }

        async fn search(
            &self,
            _ctx: &AdapterContext,
            _term: &str,
        ) -> Result<Vec<WebHit>, AdapterError> {
            Err(AdapterError::Message("search engine down".into()))
        }
    }

    fn no_delay() -> CollectorConfig {
        CollectorConfig {
            secondary_delay: Duration::ZERO,
        }
    }

    fn catalog() -> Arc<CatalogSource> {
        Arc::new(CatalogSource::builtin().expect("builtin catalog"))
    }

    fn assert_invariants(result: &CollectionResult) {
        let urls = result
            .resources
            .iter()
            .map(|r| r.url.as_str())
            .collect::<HashSet<_>>();
        assert_eq!(urls.len(), result.resources.len(), "duplicate urls");
        let stats = &result.stats;
        assert_eq!(stats.total_resources, result.resources.len());
        assert_eq!(stats.by_type.values().sum::<usize>(), stats.total_resources);
        assert_eq!(stats.by_source.values().sum::<usize>(), stats.total_resources);
        assert_eq!(stats.by_language.values().sum::<usize>(), stats.total_resources);
    }

    #[test]
    fn first_classification_rule_wins() {
        assert_eq!(
            classify_resource_type("MCP tutorial", "with full documentation", "https://x.dev"),
            ResourceType::Tutorial
        );
        assert_eq!(
            classify_resource_type("Server docs", "", "https://github.com/a/b"),
            ResourceType::Documentation
        );
        assert_eq!(
            classify_resource_type("Hosted service", "demo inside", "https://github.com/a/b"),
            ResourceType::Service
        );
        assert_eq!(
            classify_resource_type("mcp-demo", "sample project", "https://github.com/a/b"),
            ResourceType::Example
        );
        assert_eq!(
            classify_resource_type("mcp-kit", "news", "https://github.com/a/b"),
            ResourceType::Tool
        );
        assert_eq!(
            classify_resource_type("Launch announcement", "", "https://a.dev"),
            ResourceType::News
        );
        assert_eq!(
            classify_resource_type("Why context matters", "a blog", "https://a.dev"),
            ResourceType::Article
        );
        assert_eq!(
            classify_resource_type("Walkthrough", "", "https://www.youtube.com/watch?v=1"),
            ResourceType::Video
        );
        assert_eq!(
            classify_resource_type("MCP 开发教程", "", "https://a.dev"),
            ResourceType::Tutorial
        );
        assert_eq!(
            classify_resource_type("Misc", "nothing", "https://a.dev"),
            ResourceType::Other
        );
    }

    #[test]
    fn tags_split_technology_and_concept_vocabularies() {
        let tags = extract_tags("Python SDK", "Build an MCP Server and client");
        let expected = ["python", "sdk", "mcp-server", "mcp-client"]
            .into_iter()
            .map(String::from)
            .collect::<BTreeSet<_>>();
        assert_eq!(tags, expected);
    }

    #[test]
    fn language_follows_cjk_in_title() {
        assert_eq!(detect_language("模型上下文协议"), "zh");
        assert_eq!(detect_language("MCP 最佳实践"), "zh");
        assert_eq!(detect_language("Model Context Protocol"), "en");
    }

    #[test]
    fn star_rating_is_capped() {
        assert_eq!(rating_from_stars(0), 0);
        assert_eq!(rating_from_stars(19), 1);
        assert_eq!(rating_from_stars(10_000), 5);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let now = Utc::now();
        let mk = |title: &str, url: &str| {
            resource_from_web_hit(
                WebHit {
                    title: title.into(),
                    url: url.into(),
                    description: String::new(),
                    source: String::new(),
                    resource_type: None,
                    tags: None,
                    language: None,
                    rating: None,
                },
                now,
            )
        };
        let out = remove_duplicates(vec![
            mk("first", "https://a.dev"),
            mk("other", "https://b.dev"),
            mk("second", "https://a.dev"),
        ]);
        assert_eq!(
            out.iter().map(|r| r.title.as_str()).collect::<Vec<_>>(),
            ["first", "other"]
        );
        assert_eq!(out[0].source, "web");
    }

    #[test]
    fn canned_fields_take_precedence_over_derivation() {
        let resource = resource_from_web_hit(
            WebHit {
                title: "Docs".into(),
                url: "https://a.dev".into(),
                description: "api reference".into(),
                source: "Official".into(),
                resource_type: Some(ResourceType::Community),
                tags: Some(vec![" Official ".into(), "".into()]),
                language: Some("fr".into()),
                rating: Some(9),
            },
            Utc::now(),
        );
        assert_eq!(resource.resource_type, ResourceType::Community);
        assert_eq!(
            resource.tags.into_iter().collect::<Vec<_>>(),
            ["official".to_string()]
        );
        assert_eq!(resource.language, "fr");
        assert_eq!(resource.rating, 5);
    }

    #[tokio::test]
    async fn primary_only_run_makes_no_repository_calls() {
        let index = Arc::new(RecordingIndex::new(vec![]));
        let collector = ResourceCollector::new(catalog(), index.clone()).with_config(no_delay());
        let request = CollectRequest::new(["MCP tutorial"], false).expect("request");

        let result = collector.collect(&request).await;

        assert_eq!(index.calls.load(Ordering::SeqCst), 0);
        assert!(!result.resources.is_empty());
        let expected = catalog()
            .lookup("MCP tutorial")
            .into_iter()
            .map(|hit| hit.url)
            .collect::<HashSet<_>>();
        assert!(result.resources.iter().all(|r| expected.contains(&r.url)));
        assert_invariants(&result);
    }

    #[tokio::test]
    async fn anthropic_scenario_returns_relevant_unique_resources() {
        let collector = ResourceCollector::new(catalog(), Arc::new(StaticRepositoryIndex::new("GitHub")))
            .with_config(no_delay());
        let request = CollectRequest::new(["Anthropic MCP"], false).expect("request");

        let result = collector.collect(&request).await;

        assert!(!result.resources.is_empty());
        for resource in &result.resources {
            let text = format!(
                "{} {} {}",
                resource.title,
                resource.description,
                resource.tags.iter().cloned().collect::<Vec<_>>().join(" ")
            )
            .to_lowercase();
            assert!(text.contains("anthropic") || text.contains("mcp"), "{text}");
        }
        assert_invariants(&result);
    }

    #[tokio::test]
    async fn repository_failures_are_swallowed_per_term() {
        let index = Arc::new(RecordingIndex::new(vec!["mcp server"]));
        let collector = ResourceCollector::new(catalog(), index.clone()).with_config(no_delay());
        let request = CollectRequest::new(["Anthropic MCP"], true).expect("request");

        let result = collector.collect(&request).await;

        assert_eq!(index.calls.load(Ordering::SeqCst), SECONDARY_TERMS.len());
        assert_eq!(*index.seen.lock().unwrap(), SECONDARY_TERMS.to_vec());
        let github = result
            .resources
            .iter()
            .filter(|r| r.source == "GitHub" && r.url.starts_with("https://github.com/acme/"))
            .collect::<Vec<_>>();
        // four successful terms, one demo repo each, plus the shared repo once
        assert_eq!(github.len(), SECONDARY_TERMS.len() - 1 + 1);
        assert!(!github.iter().any(|r| r.url.contains("mcp-server-demo")));

        let demo = github
            .iter()
            .find(|r| r.url.ends_with("/MCP-demo"))
            .expect("demo repo");
        assert_eq!(demo.resource_type, ResourceType::Tool);
        assert_eq!(demo.rating, 5);
        assert_eq!(demo.language, "en");
        assert!(demo.tags.contains("python"));
        assert!(demo.tags.contains("mcp-server"));

        let shared = github
            .iter()
            .find(|r| r.url.ends_with("/shared"))
            .expect("shared repo");
        assert_eq!(shared.resource_type, ResourceType::Example);
        assert_eq!(shared.rating, 0);
        assert_invariants(&result);
    }

    #[tokio::test]
    async fn primary_failures_do_not_abort_the_run() {
        let collector = ResourceCollector::new(Arc::new(FailingPrimary), Arc::new(RecordingIndex::new(vec![])))
            .with_config(no_delay());
        let result = collector.collect(&CollectRequest::default()).await;
        assert!(result.resources.iter().all(|r| r.source == "GitHub"));
        assert_eq!(result.stats.by_source.get("GitHub"), Some(&result.resources.len()));
        assert_invariants(&result);
    }

    #[tokio::test]
    async fn invariants_hold_across_term_sets() {
        let collector = ResourceCollector::new(catalog(), Arc::new(RecordingIndex::new(vec![])))
            .with_config(no_delay());
        let cases: Vec<(Vec<&str>, bool)> = vec![
            (vec![], true),
            (vec!["mcp", "MCP", "server"], false),
            (vec!["模型上下文协议", "MCP开发教程"], true),
            (vec!["nothing-matches-this"], false),
        ];
        for (terms, secondary) in cases {
            let request = CollectRequest::new(terms, secondary).expect("request");
            let result = collector.collect(&request).await;
            assert_invariants(&result);
            let tag_total: usize = result.stats.tag_frequencies.values().sum();
            let expected: usize = result.resources.iter().map(|r| r.tags.len()).sum();
            assert_eq!(tag_total, expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn repository_calls_are_paced() {
        let collector = ResourceCollector::new(catalog(), Arc::new(RecordingIndex::new(vec![])))
            .with_config(CollectorConfig {
                secondary_delay: Duration::from_millis(250),
            });
        let started = tokio::time::Instant::now();
        collector
            .collect(&CollectRequest::new(["x"], true).expect("request"))
            .await;
        let expected = Duration::from_millis(250) * (SECONDARY_TERMS.len() as u32 - 1);
        let elapsed = started.elapsed();
        assert!(elapsed >= expected, "{elapsed:?}");
        assert!(elapsed < expected + Duration::from_millis(250), "{elapsed:?}");
    }
}
