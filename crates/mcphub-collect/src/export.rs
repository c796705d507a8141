//! JSON and CSV renderings of a collection result.

use chrono::{DateTime, Utc};
use mcphub_core::{CollectionResult, CollectionStats, Resource};
use thiserror::Error;

pub const CSV_HEADER: [&str; 8] = [
    "Title",
    "URL",
    "Type",
    "Description",
    "Source",
    "Language",
    "Rating",
    "Tags",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("json export failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn to_json(result: &CollectionResult) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(result)?)
}

pub fn from_json(text: &str) -> Result<CollectionResult, ExportError> {
    Ok(serde_json::from_str(text)?)
}

/// Every field is quoted; tags are joined with `;`.
pub fn to_csv(resources: &[Resource]) -> String {
    let mut lines = Vec::with_capacity(resources.len() + 1);
    lines.push(csv_row(CSV_HEADER.iter().map(|h| h.to_string())));
    for resource in resources {
        let tags = resource.tags.iter().map(String::as_str).collect::<Vec<_>>().join(";");
        lines.push(csv_row([
            resource.title.clone(),
            resource.url.clone(),
            resource.resource_type.to_string(),
            resource.description.clone(),
            resource.source.clone(),
            resource.language.clone(),
            resource.rating.to_string(),
            tags,
        ]));
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn csv_row(fields: impl IntoIterator<Item = String>) -> String {
    fields
        .into_iter()
        .map(|field| format!("\"{}\"", field.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Most frequent tags first, ties broken by name.
pub fn top_tags(stats: &CollectionStats, limit: usize) -> Vec<(String, usize)> {
    let mut tags = stats
        .tag_frequencies
        .iter()
        .map(|(tag, count)| (tag.clone(), *count))
        .collect::<Vec<_>>();
    tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    tags.truncate(limit);
    tags
}

/// `mcp-resources-YYYY-MM-DD.{extension}`
pub fn export_file_name(at: DateTime<Utc>, extension: &str) -> String {
    format!("mcp-resources-{}.{extension}", at.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compute_stats, resource_from_web_hit};
    use chrono::TimeZone;
    use mcphub_adapters::WebHit;

    fn hit(title: &str, url: &str, description: &str) -> WebHit {
        WebHit {
            title: title.to_string(),
            url: url.to_string(),
            description: description.to_string(),
            source: "Community".to_string(),
            resource_type: None,
            tags: None,
            language: None,
            rating: None,
        }
    }

    fn sample() -> CollectionResult {
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).single().expect("timestamp");
        let resources = vec![
            resource_from_web_hit(hit("MCP server tutorial", "https://a.example/1", "python sdk guide"), at),
            resource_from_web_hit(hit("MCP 终极指南", "https://b.example/2", "Chinese \"deep dive\", part 1"), at),
        ];
        let stats = compute_stats(&resources);
        CollectionResult {
            resources,
            stats,
            collected_at: at,
        }
    }

    #[test]
    fn json_export_reparses_to_equal_result() {
        let result = sample();
        let text = to_json(&result).expect("json");
        assert!(text.contains("\n  \"resources\""));
        assert!(text.contains("\"collectedAt\""));
        assert_eq!(from_json(&text).expect("parse"), result);
    }

    #[test]
    fn json_import_accepts_snake_case_timestamp() {
        let text = to_json(&sample()).expect("json").replace("collectedAt", "collected_at");
        assert_eq!(from_json(&text).expect("parse"), sample());
    }

    #[test]
    fn csv_quotes_every_field_and_doubles_inner_quotes() {
        let result = sample();
        let csv = to_csv(&result.resources);
        let lines = csv.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "\"Title\",\"URL\",\"Type\",\"Description\",\"Source\",\"Language\",\"Rating\",\"Tags\""
        );
        assert!(lines[1].starts_with("\"MCP server tutorial\",\"https://a.example/1\",\"tutorial\","));
        assert!(lines[1].contains("\"mcp-server;python;sdk\""), "{}", lines[1]);
        assert!(lines[2].contains("\"Chinese \"\"deep dive\"\", part 1\""));
        assert!(lines[2].contains(",\"zh\","));
    }

    #[test]
    fn top_tags_orders_by_count_then_name() {
        let mut stats = CollectionStats::default();
        for (tag, count) in [("sdk", 2), ("api", 2), ("python", 5), ("llm", 1)] {
            stats.tag_frequencies.insert(tag.to_string(), count);
        }
        assert_eq!(
            top_tags(&stats, 3),
            vec![("python".to_string(), 5), ("api".to_string(), 2), ("sdk".to_string(), 2)]
        );
        assert!(top_tags(&CollectionStats::default(), 10).is_empty());
    }

    #[test]
    fn file_name_uses_utc_date() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 23, 59, 0).single().expect("timestamp");
        assert_eq!(export_file_name(at, "csv"), "mcp-resources-2025-01-02.csv");
    }
}
