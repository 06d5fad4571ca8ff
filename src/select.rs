//! # Selector
//!
//! Produces the ranked top-K slice of scored items using a bucketed
//! priority hierarchy: business-critical first, then high
//! engagement+relevance, then high relevance, then best remaining
//! totals. Ordering inside each bucket blends relevance with
//! normalised engagement so a low-relevance viral post can never
//! outrank a strongly relevant one.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::models::{AppliedAdjustment, KeywordCategory, ScoredItem};
use crate::scoring::{BOOST_MA_INTEL, BOOST_PARTNER_TIER_CHANGE};

/// Bucket capacity shares of K.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BucketPct {
    pub critical: f64,
    pub engagement: f64,
    pub relevance: f64,
}

impl Default for BucketPct {
    fn default() -> Self {
        Self {
            critical: 0.4,
            engagement: 0.2,
            relevance: 0.3,
        }
    }
}

/// Selector thresholds and capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SelectorConfig {
    pub k: usize,
    pub bucket_pct: BucketPct,
    pub engagement_min_upvotes: u32,
    pub engagement_min_comments: u32,
    pub engagement_min_total: f64,
    pub relevance_min_total: f64,
    /// Weight of relevance vs normalised engagement in the in-bucket key.
    pub relevance_weight: f64,
    pub engagement_weight: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            k: 200,
            bucket_pct: BucketPct::default(),
            engagement_min_upvotes: 50,
            engagement_min_comments: 20,
            engagement_min_total: 4.0,
            relevance_min_total: 7.0,
            relevance_weight: 0.7,
            engagement_weight: 0.3,
        }
    }
}

/// Which selection bucket admitted an item. Ordered highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Bucket {
    BusinessCritical,
    EngagedRelevant,
    HighRelevance,
    Remainder,
}

/// A selected item with its admission bucket and composite rank key.
#[derive(Debug, Clone)]
pub struct Selected {
    pub item: ScoredItem,
    pub bucket: Bucket,
    pub rank_key: f64,
}

/// Select at most `config.k` items. The returned order is final:
/// bucket by bucket, composite key descending within each, ties broken
/// by `posted_at` (newer first) then `url` ascending.
pub fn select(candidates: Vec<ScoredItem>, config: &SelectorConfig) -> Vec<Selected> {
    if candidates.is_empty() || config.k == 0 {
        return Vec::new();
    }

    // Engagement normalised against the strongest candidate.
    let max_engagement = candidates
        .iter()
        .map(|c| (c.item.engagement.weighted() as f64).ln_1p())
        .fold(0.0_f64, f64::max);
    let norm = |item: &ScoredItem| -> f64 {
        if max_engagement <= 0.0 {
            0.0
        } else {
            (item.item.engagement.weighted() as f64).ln_1p() / max_engagement
        }
    };

    let rank_key = |item: &ScoredItem| -> f64 {
        config.relevance_weight * item.score.total + config.engagement_weight * norm(item)
    };

    let mut ranked: Vec<(ScoredItem, f64)> = candidates
        .into_iter()
        .map(|c| {
            let key = rank_key(&c);
            (c, key)
        })
        .collect();
    ranked.sort_by(|(a, ka), (b, kb)| compare_ranked(ka, a, kb, b));

    let cap = |pct: f64| -> usize { ((config.k as f64) * pct).floor() as usize };
    let mut selected: Vec<Selected> = Vec::with_capacity(config.k);
    let mut taken = vec![false; ranked.len()];

    let fill = |bucket: Bucket,
                    limit: usize,
                    taken: &mut Vec<bool>,
                    selected: &mut Vec<Selected>,
                    eligible: &dyn Fn(&ScoredItem) -> bool| {
        let mut admitted = 0;
        for (idx, (item, key)) in ranked.iter().enumerate() {
            if selected.len() >= config.k || admitted >= limit {
                break;
            }
            if taken[idx] || !eligible(item) {
                continue;
            }
            taken[idx] = true;
            admitted += 1;
            selected.push(Selected {
                item: item.clone(),
                bucket,
                rank_key: *key,
            });
        }
    };

    fill(
        Bucket::BusinessCritical,
        cap(config.bucket_pct.critical),
        &mut taken,
        &mut selected,
        &is_business_critical,
    );
    fill(
        Bucket::EngagedRelevant,
        cap(config.bucket_pct.engagement),
        &mut taken,
        &mut selected,
        &|item: &ScoredItem| {
            (item.item.engagement.upvotes >= config.engagement_min_upvotes
                || item.item.engagement.comments >= config.engagement_min_comments)
                && item.score.total >= config.engagement_min_total
        },
    );
    fill(
        Bucket::HighRelevance,
        cap(config.bucket_pct.relevance),
        &mut taken,
        &mut selected,
        &|item: &ScoredItem| item.score.total >= config.relevance_min_total,
    );
    let remaining = config.k.saturating_sub(selected.len());
    fill(
        Bucket::Remainder,
        remaining,
        &mut taken,
        &mut selected,
        &|_| true,
    );

    selected
}

/// An item is business-critical when business-impact terms matched, a
/// partner-tier change fired, or M&A/audit intelligence is present.
fn is_business_critical(item: &ScoredItem) -> bool {
    if item.score.matched_terms.contains_key(&KeywordCategory::BusinessImpact)
        || item.score.matched_terms.contains_key(&KeywordCategory::MaIntel)
    {
        return true;
    }
    item.score.multipliers_applied.iter().any(|a| {
        matches!(
            a,
            AppliedAdjustment::Boost { name, .. }
                if name == BOOST_PARTNER_TIER_CHANGE || name == BOOST_MA_INTEL
        )
    })
}

fn compare_ranked(ka: &f64, a: &ScoredItem, kb: &f64, b: &ScoredItem) -> Ordering {
    kb.partial_cmp(ka)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.item.posted_at.cmp(&a.item.posted_at))
        .then_with(|| a.item.url.cmp(&b.item.url))
}
