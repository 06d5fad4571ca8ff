//! Search fetcher
//!
//! Executes the configured web-search queries against a CSE-shaped
//! JSON API. Queries are templated with the current year, results are
//! merged across queries, and result URLs are normalised (tracking
//! params stripped, host lowercased). Search items carry zero
//! engagement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::SearchSourceConfig;
use crate::dedup::normalize_url;
use crate::fetch::{
    FetchContext, FetchError, FetchOutcome, FetchStats, Fetcher, RateLimiter, RetryPolicy,
    get_text, strip_html,
};
use crate::models::{Engagement, RawItem, SourceKind, content_hash};

const PAGE_SIZE: usize = 10;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    pagemap: Option<PageMap>,
}

#[derive(Debug, Deserialize)]
struct PageMap {
    #[serde(default)]
    metatags: Vec<serde_json::Map<String, serde_json::Value>>,
}

pub struct SearchFetcher {
    config: SearchSourceConfig,
    base_url: String,
    api_key: String,
    engine_id: String,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl SearchFetcher {
    pub fn new(
        config: SearchSourceConfig,
        base_url: String,
        api_key: String,
        engine_id: String,
    ) -> Self {
        let limiter = RateLimiter::new(config.rate_per_sec);
        Self {
            config,
            base_url,
            api_key,
            engine_id,
            limiter,
            retry: RetryPolicy::default(),
        }
    }

    fn page_url(&self, query: &str, start: usize) -> String {
        let num = PAGE_SIZE.min(self.config.results_per_query);
        format!(
            "{}/customsearch/v1?key={}&cx={}&q={}&num={}&dateRestrict={}&start={}",
            self.base_url.trim_end_matches('/'),
            self.api_key,
            self.engine_id,
            urlencode(query),
            num,
            self.config.date_restriction,
            start
        )
    }

    fn to_item(&self, query: &str, result: SearchResult, now: DateTime<Utc>) -> Option<RawItem> {
        if result.link.is_empty() {
            return None;
        }
        let title = strip_html(&result.title);
        let body = strip_html(&result.snippet);
        let posted_at = result
            .pagemap
            .as_ref()
            .and_then(published_time)
            .filter(|t| *t <= now)
            .unwrap_or(now);
        let item = RawItem {
            source_kind: SourceKind::Search,
            source_subchannel: query.to_string(),
            url: normalize_url(&result.link),
            engagement: Engagement::default(),
            content_hash: content_hash(&title, &body),
            title,
            body,
            posted_at,
        };
        item.is_admissible(now).then_some(item)
    }
}

fn published_time(pagemap: &PageMap) -> Option<DateTime<Utc>> {
    pagemap.metatags.iter().find_map(|tags| {
        tags.get("article:published_time")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    })
}

fn urlencode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[async_trait]
impl Fetcher for SearchFetcher {
    fn name(&self) -> &'static str {
        "search"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Search
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<FetchOutcome, FetchError> {
        if self.api_key.is_empty() {
            return Err(FetchError::MissingCredential("PRICEWATCH_SEARCH_API_KEY"));
        }
        if self.engine_id.is_empty() {
            return Err(FetchError::MissingCredential("PRICEWATCH_SEARCH_ENGINE_ID"));
        }

        let now = Utc::now();
        let year = now.format("%Y").to_string();
        let mut stats = FetchStats::default();
        let mut items = Vec::new();
        let mut successes = 0usize;
        let mut timed_out = false;
        let mut last_error: Option<FetchError> = None;

        'queries: for query_template in &self.config.queries {
            let query = query_template.replace("{year}", &year);
            let mut collected = 0usize;
            let mut start = 1usize;
            while collected < self.config.results_per_query {
                let url = self.page_url(&query, start);
                let body = match get_text(ctx, &self.limiter, &self.retry, &url, &[], &mut stats)
                    .await
                {
                    Ok(body) => body,
                    Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                    Err(FetchError::DeadlineExceeded) => {
                        warn!(query = %query, "per-source deadline hit, keeping partial results");
                        timed_out = true;
                        break 'queries;
                    }
                    Err(err) => {
                        warn!(query = %query, error = %err, "search query failed");
                        last_error = Some(err);
                        break;
                    }
                };
                let parsed: SearchResponse = match serde_json::from_str(&body) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        warn!(query = %query, error = %err, "search response did not parse");
                        last_error = Some(FetchError::Permanent(format!("schema drift: {err}")));
                        break;
                    }
                };
                successes += 1;
                let page_len = parsed.items.len();
                for result in parsed.items {
                    if collected >= self.config.results_per_query {
                        break;
                    }
                    match self.to_item(&query, result, now) {
                        Some(item) => {
                            items.push(item);
                            collected += 1;
                        }
                        None => stats.items_discarded += 1,
                    }
                }
                if page_len < PAGE_SIZE {
                    break;
                }
                start += PAGE_SIZE;
            }
        }

        if successes == 0 && !timed_out {
            return Err(last_error
                .unwrap_or_else(|| FetchError::Permanent("no queries configured".to_string())));
        }

        stats.items_emitted = items.len();
        debug!(items = items.len(), requests = stats.requests, "search fetch complete");
        Ok(FetchOutcome {
            items,
            stats,
            timed_out,
        })
    }
}
