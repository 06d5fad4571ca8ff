//! Raw item model
//!
//! One post or article as collected by a fetcher, before scoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Which kind of source produced an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Forum,
    Search,
}

impl SourceKind {
    /// Canonical string representation, used for stats keys and logging.
    pub const fn as_str(self) -> &'static str {
        match self {
            SourceKind::Forum => "forum",
            SourceKind::Search => "search",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Community engagement counters. Zero for search results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub upvotes: u32,
    pub comments: u32,
}

impl Engagement {
    /// Weighted engagement used by dedup survivor selection and the
    /// selector's engagement normalisation. Comments count double.
    pub fn weighted(&self) -> u64 {
        u64::from(self.upvotes) + 2 * u64::from(self.comments)
    }

    pub fn is_zero(&self) -> bool {
        self.upvotes == 0 && self.comments == 0
    }
}

/// One post/article emitted by a fetcher.
///
/// Invariants enforced at the fetch boundary: `url` is non-empty,
/// `posted_at <= now`, and items with zero engagement and an empty body
/// are discarded before they enter the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub source_kind: SourceKind,
    /// Forum sub-name or the search query that produced this item.
    pub source_subchannel: String,
    pub title: String,
    /// Plain text; HTML is stripped by the fetchers.
    pub body: String,
    /// Canonical URL, primary dedup key.
    pub url: String,
    pub posted_at: DateTime<Utc>,
    pub engagement: Engagement,
    /// Stable hash of the normalised title+body, secondary dedup key.
    pub content_hash: String,
}

impl RawItem {
    /// True when the item passes the fetch-boundary invariants.
    pub fn is_admissible(&self, now: DateTime<Utc>) -> bool {
        if self.url.is_empty() || self.posted_at > now {
            return false;
        }
        !(self.engagement.is_zero() && self.body.trim().is_empty())
    }
}

/// Stable content hash over the normalised title and body.
///
/// Normalisation lowercases and collapses whitespace runs so that
/// cosmetic reformatting of a repost still collides.
pub fn content_hash(title: &str, body: &str) -> String {
    let mut normalised = String::with_capacity(title.len() + body.len() + 1);
    for (i, part) in [title, body].iter().enumerate() {
        if i > 0 {
            normalised.push('\n');
        }
        let mut last_was_space = false;
        for ch in part.trim().chars() {
            if ch.is_whitespace() {
                if !last_was_space {
                    normalised.push(' ');
                }
                last_was_space = true;
            } else {
                for lc in ch.to_lowercase() {
                    normalised.push(lc);
                }
                last_was_space = false;
            }
        }
    }
    let mut hasher = Sha256::new();
    hasher.update(normalised.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(url: &str, body: &str, engagement: Engagement) -> RawItem {
        RawItem {
            source_kind: SourceKind::Forum,
            source_subchannel: "sysadmin".to_string(),
            title: "title".to_string(),
            body: body.to_string(),
            url: url.to_string(),
            posted_at: Utc::now() - Duration::hours(1),
            engagement,
            content_hash: content_hash("title", body),
        }
    }

    #[test]
    fn content_hash_ignores_case_and_whitespace() {
        assert_eq!(
            content_hash("VMware  Price Hike", "Broadcom   raised\nprices"),
            content_hash("vmware price hike", "broadcom raised prices")
        );
    }

    #[test]
    fn content_hash_distinguishes_different_bodies() {
        assert_ne!(
            content_hash("title", "body one"),
            content_hash("title", "body two")
        );
    }

    #[test]
    fn empty_url_is_inadmissible() {
        let it = item("", "some body", Engagement { upvotes: 5, comments: 0 });
        assert!(!it.is_admissible(Utc::now()));
    }

    #[test]
    fn future_post_is_inadmissible() {
        let mut it = item("https://example.com/a", "body", Engagement::default());
        it.posted_at = Utc::now() + Duration::hours(2);
        assert!(!it.is_admissible(Utc::now()));
    }

    #[test]
    fn zero_engagement_empty_body_is_inadmissible() {
        let it = item("https://example.com/a", "   ", Engagement::default());
        assert!(!it.is_admissible(Utc::now()));
        let kept = item("https://example.com/a", "", Engagement { upvotes: 1, comments: 0 });
        assert!(kept.is_admissible(Utc::now()));
    }
}
