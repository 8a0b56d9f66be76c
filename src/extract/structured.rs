use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::app::TributaryError;
use crate::domain::{RawEvent, SourceConfig};
use crate::extract::{ExtractError, ExtractResult, Extraction, Extractor};
use crate::fetcher::{fetch_with_cancel, Fetcher, Page};
use crate::normalizer::Normalizer;

/// Tier 2: schema.org events embedded as JSON-LD. Only the seed page is read.
pub struct StructuredExtractor {
    fetcher: Arc<dyn Fetcher>,
    normalizer: Normalizer,
}

impl StructuredExtractor {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            normalizer: Normalizer::new(),
        }
    }

    /// Decode every JSON-LD event on the page. Unnamed events are dropped.
    pub fn extract_page(&self, page: &Page) -> Vec<RawEvent> {
        json_ld_events(&page.body)
            .iter()
            .map(|value| self.normalizer.from_json_ld(value, &page.url))
            .filter(|event| !event.name.is_empty())
            .collect()
    }
}

#[async_trait]
impl Extractor for StructuredExtractor {
    async fn extract(&self, source: &SourceConfig, cancel: &CancellationToken) -> ExtractResult {
        let url = Url::parse(&source.url).map_err(TributaryError::from)?;

        let page = fetch_with_cancel(self.fetcher.as_ref(), &url, cancel)
            .await
            .map_err(|e| ExtractError::new(Extraction::default(), e))?;

        let events = self.extract_page(&page);
        tracing::debug!(source = %source.name, events = events.len(), "parsed JSON-LD");

        Ok(Extraction {
            events,
            pages_fetched: 1,
        })
    }
}

/// Raw event objects from every `application/ld+json` script block.
pub fn json_ld_events(html: &str) -> Vec<Value> {
    let document = Html::parse_document(html);
    let Ok(scripts) = Selector::parse("script[type]") else {
        return Vec::new();
    };

    let mut events = Vec::new();
    for script in document.select(&scripts) {
        let is_json_ld = script
            .value()
            .attr("type")
            .map(|t| t.trim().eq_ignore_ascii_case("application/ld+json"))
            .unwrap_or(false);
        if !is_json_ld {
            continue;
        }

        let text = script.text().collect::<String>();
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(value) => collect_events(value, &mut events),
            Err(e) => tracing::debug!(error = %e, "skipping malformed JSON-LD block"),
        }
    }

    events
}

fn collect_events(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_events(item, out);
            }
        }
        Value::Object(mut obj) => {
            if let Some(graph) = obj.remove("@graph") {
                collect_events(graph, out);
                return;
            }

            let ty = obj.get("@type").cloned().unwrap_or(Value::Null);
            if has_type(&ty, is_event_type) {
                out.push(Value::Object(obj));
            } else if has_type(&ty, |t| t == "ItemList") {
                if let Some(Value::Array(elements)) = obj.remove("itemListElement") {
                    for mut element in elements {
                        // ListItem wrappers carry the event under "item"
                        match element.get_mut("item").map(Value::take) {
                            Some(item) => collect_events(item, out),
                            None => collect_events(element, out),
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

fn has_type(ty: &Value, pred: impl Fn(&str) -> bool) -> bool {
    match ty {
        Value::String(s) => pred(strip_schema_prefix(s)),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .any(|s| pred(strip_schema_prefix(s))),
        _ => false,
    }
}

fn strip_schema_prefix(ty: &str) -> &str {
    let ty = ty.trim();
    ["https://schema.org/", "http://schema.org/", "schema:"]
        .iter()
        .find_map(|prefix| ty.strip_prefix(prefix))
        .unwrap_or(ty)
}

fn is_event_type(ty: &str) -> bool {
    ty == "Event" || ty == "EventSeries" || ty.ends_with("Event")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Tier;
    use crate::testing::StubFetcher;

    fn wrap(json: &str) -> String {
        format!(
            r#"<html><head><script type="application/ld+json">{}</script></head><body></body></html>"#,
            json
        )
    }

    #[test]
    fn test_single_event_object() {
        let html = wrap(r#"{"@context":"https://schema.org","@type":"Event","name":"Gala"}"#);
        let events = json_ld_events(&html);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["name"], "Gala");
    }

    #[test]
    fn test_array_and_subtypes() {
        let html = wrap(
            r#"[{"@type":"MusicEvent","name":"A"},
                {"@type":["Thing","http://schema.org/TheaterEvent"],"name":"B"},
                {"@type":"Organization","name":"Not an event"}]"#,
        );
        let names: Vec<_> = json_ld_events(&html)
            .iter()
            .map(|e| e["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_graph_and_item_list() {
        let html = wrap(
            r#"{"@graph":[
                {"@type":"WebPage","name":"Listing"},
                {"@type":"ItemList","itemListElement":[
                    {"@type":"ListItem","position":1,"item":{"@type":"Event","name":"One"}},
                    {"@type":"Event","name":"Two"}
                ]}
            ]}"#,
        );
        let events = json_ld_events(&html);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["name"], "One");
        assert_eq!(events[1]["name"], "Two");
    }

    #[test]
    fn test_malformed_block_skipped() {
        let html = format!(
            "{}{}",
            wrap("{not json"),
            wrap(r#"{"@type":"Event","name":"Survivor"}"#)
        );
        let events = json_ld_events(&html);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["name"], "Survivor");
    }

    #[tokio::test]
    async fn test_page_without_records_yields_nothing() {
        let fetcher = Arc::new(StubFetcher::new().page("https://example.com/", "<p>hello</p>"));
        let extractor = StructuredExtractor::new(fetcher);
        let source = SourceConfig::new("plain", "https://example.com/", Tier::StructuredData);

        let out = extractor
            .extract(&source, &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.events.is_empty());
        assert_eq!(out.pages_fetched, 1);
    }

    #[tokio::test]
    async fn test_extract_normalizes_events() {
        let html = wrap(
            r#"{"@type":"Event","name":"Jazz","startDate":"2026-05-01","url":"/e/jazz"}"#,
        );
        let fetcher = Arc::new(StubFetcher::new().page("https://venue.example.com/", &html));
        let extractor = StructuredExtractor::new(fetcher);
        let source =
            SourceConfig::new("venue", "https://venue.example.com/", Tier::StructuredData);

        let out = extractor
            .extract(&source, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].url, "https://venue.example.com/e/jazz");
        assert_eq!(out.events[0].start_date, "2026-05-01");
    }

    #[tokio::test]
    async fn test_fetch_error_surfaces() {
        let fetcher = Arc::new(StubFetcher::new().status("https://example.com/", 403));
        let extractor = StructuredExtractor::new(fetcher);
        let source = SourceConfig::new("blocked", "https://example.com/", Tier::StructuredData);

        let err = extractor
            .extract(&source, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.error.status(), Some(403));
        assert!(err.partial.events.is_empty());
    }
}
