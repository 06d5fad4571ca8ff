//! Forum fetcher
//!
//! Pulls posts from a Reddit-shaped public JSON API: every configured
//! sub-channel is queried across the hot/new/top/rising listings and
//! the results merged. A posted-at window filter (with a wider
//! fallback when the primary window is too thin) and an engagement
//! quality filter run at the fetch boundary.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ForumSourceConfig;
use crate::fetch::{
    FetchContext, FetchError, FetchOutcome, FetchStats, Fetcher, RateLimiter, RetryPolicy,
    get_text, strip_html,
};
use crate::models::{Engagement, RawItem, SourceKind, content_hash};
use crate::vendors::VendorDictionary;

const LISTINGS: &[&str] = &["hot", "new", "top", "rising"];

/// Public permalink prefix; API calls go through the configurable
/// base URL so tests can point at a mock server.
const PERMALINK_BASE: &str = "https://www.reddit.com";

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: PostData,
}

#[derive(Debug, Deserialize)]
struct PostData {
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    url: String,
    created_utc: Option<f64>,
    #[serde(default)]
    ups: i64,
    #[serde(default)]
    num_comments: i64,
}

pub struct ForumFetcher {
    config: ForumSourceConfig,
    base_url: String,
    user_agent: String,
    dict: Arc<VendorDictionary>,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl ForumFetcher {
    pub fn new(
        config: ForumSourceConfig,
        base_url: String,
        user_agent: String,
        dict: Arc<VendorDictionary>,
    ) -> Self {
        let limiter = RateLimiter::new(config.rate_per_sec);
        Self {
            config,
            base_url,
            user_agent,
            dict,
            limiter,
            retry: RetryPolicy::default(),
        }
    }

    fn listing_url(&self, sub_channel: &str, listing: &str) -> String {
        let mut url = format!(
            "{}/r/{}/{}.json?limit=100&raw_json=1",
            self.base_url.trim_end_matches('/'),
            sub_channel,
            listing
        );
        if listing == "top" {
            url.push_str("&t=day");
        }
        url
    }

    fn to_item(&self, sub_channel: &str, post: PostData, now: DateTime<Utc>) -> Option<RawItem> {
        let posted_at = post
            .created_utc
            .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())?;
        let url = if post.permalink.is_empty() {
            post.url.clone()
        } else {
            format!("{PERMALINK_BASE}{}", post.permalink)
        };
        let title = strip_html(&post.title);
        let body = strip_html(&post.selftext);
        let item = RawItem {
            source_kind: SourceKind::Forum,
            source_subchannel: sub_channel.to_string(),
            engagement: Engagement {
                upvotes: post.ups.max(0) as u32,
                comments: post.num_comments.max(0) as u32,
            },
            content_hash: content_hash(&title, &body),
            title,
            body,
            url,
            posted_at,
        };
        item.is_admissible(now).then_some(item)
    }

    /// Engagement floor, waived when a tier-1 vendor appears in the title.
    fn passes_quality(&self, item: &RawItem) -> bool {
        item.engagement.upvotes >= self.config.min_upvotes
            || item.engagement.comments >= self.config.min_comments
            || self.dict.tier1_in_text(&item.title)
    }
}

#[async_trait]
impl Fetcher for ForumFetcher {
    fn name(&self) -> &'static str {
        "forum"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Forum
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<FetchOutcome, FetchError> {
        let now = Utc::now();
        let mut stats = FetchStats::default();
        let mut collected: Vec<RawItem> = Vec::new();
        let mut successes = 0usize;
        let mut timed_out = false;
        let mut last_error: Option<FetchError> = None;

        'channels: for sub_channel in &self.config.sub_channels {
            for listing in LISTINGS {
                let url = self.listing_url(sub_channel, listing);
                let body = match get_text(
                    ctx,
                    &self.limiter,
                    &self.retry,
                    &url,
                    &[("user-agent", self.user_agent.as_str())],
                    &mut stats,
                )
                .await
                {
                    Ok(body) => body,
                    Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                    Err(FetchError::DeadlineExceeded) => {
                        warn!(sub_channel, listing, "per-source deadline hit, keeping partial results");
                        timed_out = true;
                        break 'channels;
                    }
                    Err(err) => {
                        warn!(sub_channel, listing, error = %err, "listing fetch failed");
                        last_error = Some(err);
                        continue;
                    }
                };
                let parsed: Listing = match serde_json::from_str(&body) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        // Schema drift from the upstream API.
                        warn!(sub_channel, listing, error = %err, "listing response did not parse");
                        last_error =
                            Some(FetchError::Permanent(format!("schema drift: {err}")));
                        continue;
                    }
                };
                successes += 1;
                for child in parsed.data.children {
                    match self.to_item(sub_channel, child.data, now) {
                        Some(item) => collected.push(item),
                        None => stats.items_discarded += 1,
                    }
                }
            }
        }

        if successes == 0 && !timed_out {
            return Err(last_error
                .unwrap_or_else(|| FetchError::Permanent("no sub-channels configured".to_string())));
        }

        // Primary window, widened to the fallback window when thin.
        let fallback_cutoff = now - Duration::hours(self.config.fallback_window_hours as i64);
        collected.retain(|item| item.posted_at >= fallback_cutoff);
        let primary_cutoff = now - Duration::hours(self.config.window_hours as i64);
        let in_primary = collected
            .iter()
            .filter(|item| item.posted_at >= primary_cutoff)
            .count();
        if in_primary >= self.config.fallback_threshold {
            collected.retain(|item| item.posted_at >= primary_cutoff);
        } else {
            info!(
                in_primary,
                threshold = self.config.fallback_threshold,
                window_hours = self.config.fallback_window_hours,
                "primary window too thin, using fallback window"
            );
        }

        let before_quality = collected.len();
        collected.retain(|item| self.passes_quality(item));
        stats.items_discarded += before_quality - collected.len();
        stats.items_emitted = collected.len();
        debug!(
            items = collected.len(),
            requests = stats.requests,
            "forum fetch complete"
        );

        Ok(FetchOutcome {
            items: collected,
            stats,
            timed_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vendors::{DictionaryFile, VendorEntry};
    use std::collections::BTreeMap;

    fn dict() -> Arc<VendorDictionary> {
        let mut vendors = BTreeMap::new();
        vendors.insert(
            "vmware".to_string(),
            VendorEntry {
                aliases: vec![],
                tier: 1,
                consolidator: false,
            },
        );
        Arc::new(
            VendorDictionary::from_file(DictionaryFile {
                vendors,
                acquisitions: vec![],
            })
            .unwrap(),
        )
    }

    fn fetcher() -> ForumFetcher {
        ForumFetcher::new(
            ForumSourceConfig::default(),
            "http://127.0.0.1:0".to_string(),
            "pricewatch-test/0.1".to_string(),
            dict(),
        )
    }

    #[test]
    fn listing_urls_are_shaped_correctly() {
        let f = fetcher();
        assert_eq!(
            f.listing_url("sysadmin", "hot"),
            "http://127.0.0.1:0/r/sysadmin/hot.json?limit=100&raw_json=1"
        );
        assert!(f.listing_url("msp", "top").ends_with("&t=day"));
    }

    #[test]
    fn quality_filter_waives_tier1_titles() {
        let f = fetcher();
        let weak = RawItem {
            source_kind: SourceKind::Forum,
            source_subchannel: "msp".to_string(),
            title: "Random question".to_string(),
            body: "text".to_string(),
            url: "https://www.reddit.com/r/msp/1".to_string(),
            posted_at: Utc::now(),
            engagement: Engagement {
                upvotes: 0,
                comments: 0,
            },
            content_hash: content_hash("Random question", "text"),
        };
        assert!(!f.passes_quality(&weak));

        let tier1 = RawItem {
            title: "VMware renewal shock".to_string(),
            ..weak.clone()
        };
        assert!(f.passes_quality(&tier1));
    }

    #[test]
    fn to_item_requires_timestamp_and_strips_html() {
        let f = fetcher();
        let post = PostData {
            title: "Price &amp; licensing".to_string(),
            selftext: "<p>body</p>".to_string(),
            permalink: "/r/msp/comments/1/thread".to_string(),
            url: String::new(),
            created_utc: Some(Utc::now().timestamp() as f64 - 3600.0),
            ups: 4,
            num_comments: 1,
        };
        let item = f.to_item("msp", post, Utc::now()).unwrap();
        assert_eq!(item.title, "Price & licensing");
        assert_eq!(item.body, "body");
        assert_eq!(item.url, "https://www.reddit.com/r/msp/comments/1/thread");

        let missing_ts = PostData {
            title: "x".to_string(),
            selftext: "y".to_string(),
            permalink: "/r/msp/2".to_string(),
            url: String::new(),
            created_utc: None,
            ups: 1,
            num_comments: 0,
        };
        assert!(f.to_item("msp", missing_ts, Utc::now()).is_none());
    }
}
