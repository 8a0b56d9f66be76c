use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::app::{Result, TributaryError};
use crate::domain::{RawEvent, SelectorSet, SourceConfig};
use crate::extract::{ExtractError, ExtractResult, Extraction, Extractor};
use crate::fetcher::{fetch_with_cancel, Fetcher, Page};
use crate::normalizer::Normalizer;

/// Tier 1: operator-authored CSS selectors with pagination.
pub struct SelectorExtractor {
    fetcher: Arc<dyn Fetcher>,
    normalizer: Normalizer,
}

/// Events from a single page plus the pagination link, if any.
#[derive(Debug, Default)]
pub struct PageEvents {
    pub events: Vec<RawEvent>,
    /// Nodes matched by `event_list`, including unnamed ones that were skipped.
    pub node_count: usize,
    pub next_url: Option<Url>,
}

struct CompiledSelectors {
    event_list: Selector,
    name: Option<Selector>,
    start_date: Option<Selector>,
    end_date: Option<Selector>,
    location: Option<Selector>,
    description: Option<Selector>,
    url: Option<Selector>,
    image: Option<Selector>,
    pagination: Option<Selector>,
}

impl CompiledSelectors {
    fn compile(set: &SelectorSet) -> Result<Self> {
        let event_list = set.event_list().ok_or_else(|| {
            TributaryError::InvalidSource("selectors.event_list: required for tier 1".into())
        })?;

        Ok(Self {
            event_list: parse_selector(event_list)?,
            name: optional(&set.name)?,
            start_date: optional(&set.start_date)?,
            end_date: optional(&set.end_date)?,
            location: optional(&set.location)?,
            description: optional(&set.description)?,
            url: optional(&set.url)?,
            image: optional(&set.image)?,
            pagination: optional(&set.pagination)?,
        })
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| TributaryError::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

fn optional(selector: &Option<String>) -> Result<Option<Selector>> {
    match selector.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => parse_selector(s).map(Some),
        _ => Ok(None),
    }
}

impl SelectorExtractor {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            normalizer: Normalizer::new(),
        }
    }

    /// Extract events from one already-fetched page.
    pub fn extract_page(&self, page: &Page, selectors: &SelectorSet) -> Result<PageEvents> {
        let compiled = CompiledSelectors::compile(selectors)?;
        let document = Html::parse_document(&page.body);

        let mut out = PageEvents::default();
        for node in document.select(&compiled.event_list) {
            out.node_count += 1;

            let name = self.text(node, compiled.name.as_ref());
            if name.is_empty() {
                continue;
            }

            out.events.push(RawEvent {
                name,
                start_date: self.date(node, compiled.start_date.as_ref()),
                end_date: self.date(node, compiled.end_date.as_ref()),
                location: self.text(node, compiled.location.as_ref()),
                description: self.text(node, compiled.description.as_ref()),
                url: self.link(node, compiled.url.as_ref(), &["href"], &page.url),
                image: self.link(node, compiled.image.as_ref(), &["src", "data-src"], &page.url),
                ..Default::default()
            });
        }

        out.next_url = compiled
            .pagination
            .as_ref()
            .and_then(|sel| document.select(sel).next())
            .and_then(|el| {
                el.value().attr("href").map(str::to_string).or_else(|| {
                    let anchor = Selector::parse("a").ok()?;
                    el.select(&anchor)
                        .next()
                        .and_then(|a| a.value().attr("href"))
                        .map(str::to_string)
                })
            })
            .filter(|href| !href.trim().is_empty())
            .and_then(|href| page.url.join(href.trim()).ok());

        Ok(out)
    }

    fn first<'a>(node: ElementRef<'a>, selector: Option<&Selector>) -> Option<ElementRef<'a>> {
        selector.and_then(|sel| node.select(sel).next())
    }

    fn text(&self, node: ElementRef<'_>, selector: Option<&Selector>) -> String {
        Self::first(node, selector)
            .map(|el| self.normalizer.collapse_whitespace(&el.text().collect::<String>()))
            .unwrap_or_default()
    }

    fn date(&self, node: ElementRef<'_>, selector: Option<&Selector>) -> String {
        let Some(el) = Self::first(node, selector) else {
            return String::new();
        };
        match el.value().attr("datetime").map(str::trim) {
            Some(dt) if !dt.is_empty() => dt.to_string(),
            _ => self
                .normalizer
                .collapse_whitespace(&el.text().collect::<String>()),
        }
    }

    fn link(
        &self,
        node: ElementRef<'_>,
        selector: Option<&Selector>,
        attrs: &[&str],
        base: &Url,
    ) -> String {
        Self::first(node, selector)
            .and_then(|el| {
                attrs
                    .iter()
                    .filter_map(|attr| el.value().attr(attr))
                    .find(|v| !v.trim().is_empty())
            })
            .map(|v| self.normalizer.resolve_url(base, v))
            .unwrap_or_default()
    }
}

#[async_trait]
impl Extractor for SelectorExtractor {
    async fn extract(&self, source: &SourceConfig, cancel: &CancellationToken) -> ExtractResult {
        let selectors = source.selectors.clone().unwrap_or_default();
        // Reject bad selectors before touching the network
        CompiledSelectors::compile(&selectors)?;

        let max_pages = source.max_pages.max(1) as usize;
        let seed = Url::parse(&source.url).map_err(TributaryError::from)?;
        let mut next = Some(seed.clone());
        let mut visited = HashSet::new();
        let mut out = Extraction::default();

        while let Some(url) = next.take() {
            if out.pages_fetched >= max_pages {
                tracing::debug!(source = %source.name, max_pages, "page limit reached");
                break;
            }
            if !visited.insert(url.to_string()) {
                tracing::debug!(source = %source.name, url = %url, "pagination loops back, stopping");
                break;
            }

            let page = match fetch_with_cancel(self.fetcher.as_ref(), &url, cancel).await {
                Ok(page) => page,
                Err(e) => return Err(ExtractError::new(out, e)),
            };
            out.pages_fetched += 1;

            let parsed = match self.extract_page(&page, &selectors) {
                Ok(parsed) => parsed,
                Err(e) => return Err(ExtractError::new(out, e)),
            };

            tracing::debug!(
                source = %source.name,
                page = out.pages_fetched,
                nodes = parsed.node_count,
                events = parsed.events.len(),
                "parsed page"
            );

            if parsed.node_count == 0 {
                break;
            }

            out.events.extend(parsed.events);
            next = parsed.next_url.filter(|url| {
                let same_host = url.host_str() == seed.host_str();
                if !same_host {
                    tracing::debug!(source = %source.name, url = %url, "pagination leaves the source host, stopping");
                }
                same_host
            });
        }

        Ok(out)
    }
}
