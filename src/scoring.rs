//! # Scoring Engine
//!
//! Pure scoring of raw items: additive keyword/vendor/recency
//! components, domain-specific boosts, the MSP context multiplier,
//! urgency classification, and the five-axis revenue-impact model.
//! Deterministic for a fixed (item, pattern table, dictionary,
//! constants) tuple.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    AppliedAdjustment, KeywordCategory, RawItem, RevenueImpact, RevenueImpactWeights, Score,
    ScoredItem, Urgency,
};
use crate::patterns::{PatternMatches, PatternSet};
use crate::vendors::VendorDictionary;

/// Audit names for boost additions and multipliers.
pub const BOOST_CLOUD_SECURITY: &str = "cloud_security_platform";
pub const BOOST_MA_INTEL: &str = "ma_intelligence";
pub const BOOST_PARTNERSHIP: &str = "partnership_change";
pub const BOOST_PARTNER_TIER_CHANGE: &str = "partner_tier_change";
pub const BOOST_BUSINESS_RELATIONSHIP: &str = "business_relationship_change";
pub const MULTIPLIER_MSP: &str = "msp_context";

/// Canonical vendors whose presence alongside cloud-security phrases
/// triggers the vendor-specific platform boost.
const CLOUD_SECURITY_VENDORS: &[&str] = &[
    "crowdstrike",
    "palo alto networks",
    "wiz",
    "zscaler",
    "sentinelone",
    "fortinet",
    "check point",
];

/// Every numeric constant of the scoring model, centralised and
/// overridable through configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScoringConfig {
    pub pricing_weight: f64,
    pub pricing_cap: f64,
    pub urgency_high_weight: f64,
    pub urgency_high_cap: f64,
    pub urgency_medium_weight: f64,
    pub urgency_medium_cap: f64,
    /// Weight per supply/strategy/technology hit; capped per category.
    pub context_weight: f64,
    pub context_cap: f64,
    pub vendor_weight: f64,
    pub vendor_cap: f64,
    pub tier1_vendor_bonus: f64,
    pub recency_24h_bonus: f64,
    pub recency_7d_bonus: f64,
    pub cloud_security_combo_boost: f64,
    pub cloud_security_vendor_boost: f64,
    pub ma_pattern_boost: f64,
    pub ma_consolidator_boost: f64,
    pub ma_cap: f64,
    pub partnership_boost: f64,
    pub partner_tier_change_boost: f64,
    pub business_relationship_boost: f64,
    pub partnership_cap: f64,
    pub msp_multiplier: f64,
    /// Pre-revenue total at or above which urgency is at least medium.
    pub urgency_medium_total_threshold: f64,
    pub revenue_weights: RevenueImpactWeights,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            pricing_weight: 1.0,
            pricing_cap: 5.0,
            urgency_high_weight: 2.0,
            urgency_high_cap: 6.0,
            urgency_medium_weight: 1.0,
            urgency_medium_cap: 3.0,
            context_weight: 0.5,
            context_cap: 2.0,
            vendor_weight: 1.5,
            vendor_cap: 6.0,
            tier1_vendor_bonus: 1.0,
            recency_24h_bonus: 1.5,
            recency_7d_bonus: 0.5,
            cloud_security_combo_boost: 3.0,
            cloud_security_vendor_boost: 1.0,
            ma_pattern_boost: 3.0,
            ma_consolidator_boost: 2.0,
            ma_cap: 6.5,
            partnership_boost: 2.0,
            partner_tier_change_boost: 4.0,
            business_relationship_boost: 3.0,
            partnership_cap: 8.0,
            msp_multiplier: 1.5,
            urgency_medium_total_threshold: 7.0,
            revenue_weights: RevenueImpactWeights::default(),
        }
    }
}

/// Score one item. Pure: `now` is passed in so recency is
/// reproducible in tests.
pub fn score(
    item: &RawItem,
    patterns: &PatternSet,
    dict: &VendorDictionary,
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> Score {
    let text = format!("{}\n{}", item.title, item.body);
    let matches = patterns.match_text(&text);
    let vendor_match = dict.match_text(&text);

    let mut adjustments = Vec::new();
    let mut total = 0.0;

    // 1. Keyword score, capped per category.
    total += capped(
        matches.count(KeywordCategory::Pricing) as f64 * config.pricing_weight,
        config.pricing_cap,
    );
    total += capped(
        matches.count(KeywordCategory::UrgencyHigh) as f64 * config.urgency_high_weight,
        config.urgency_high_cap,
    );
    total += capped(
        matches.count(KeywordCategory::UrgencyMedium) as f64 * config.urgency_medium_weight,
        config.urgency_medium_cap,
    );
    for category in [
        KeywordCategory::Supply,
        KeywordCategory::Strategy,
        KeywordCategory::Technology,
    ] {
        total += capped(
            matches.count(category) as f64 * config.context_weight,
            config.context_cap,
        );
    }

    // 2. Vendor score.
    total += capped(
        vendor_match.vendors.len() as f64 * config.vendor_weight,
        config.vendor_cap,
    );
    let any_tier1 = vendor_match.vendors.iter().any(|v| dict.tier(v) == Some(1));
    if any_tier1 {
        total += config.tier1_vendor_bonus;
    }

    // 3. Recency.
    let age = now.signed_duration_since(item.posted_at);
    if age <= Duration::hours(24) {
        total += config.recency_24h_bonus;
    } else if age <= Duration::days(7) {
        total += config.recency_7d_bonus;
    }

    // 4. Cloud-security platform boost.
    let cloud_boost =
        cloud_security_boost(&matches, &vendor_match.vendors, config);
    if cloud_boost > 0.0 {
        total += cloud_boost;
        adjustments.push(AppliedAdjustment::Boost {
            name: BOOST_CLOUD_SECURITY.to_string(),
            amount: cloud_boost,
        });
    }

    // 5. M&A intelligence boost.
    let ma_boost = ma_intelligence_boost(&matches, &vendor_match.vendors, dict, config);
    if ma_boost > 0.0 {
        total += ma_boost;
        adjustments.push(AppliedAdjustment::Boost {
            name: BOOST_MA_INTEL.to_string(),
            amount: ma_boost,
        });
    }

    // 6. Partnership boost: components recorded individually, the
    // capped sum is what lands in the total.
    let mut partnership = 0.0;
    if matches.has(KeywordCategory::Partnership) {
        partnership += config.partnership_boost;
        adjustments.push(AppliedAdjustment::Boost {
            name: BOOST_PARTNERSHIP.to_string(),
            amount: config.partnership_boost,
        });
    }
    if matches.partner_tier_change {
        partnership += config.partner_tier_change_boost;
        adjustments.push(AppliedAdjustment::Boost {
            name: BOOST_PARTNER_TIER_CHANGE.to_string(),
            amount: config.partner_tier_change_boost,
        });
    }
    if matches.business_relationship_change {
        partnership += config.business_relationship_boost;
        adjustments.push(AppliedAdjustment::Boost {
            name: BOOST_BUSINESS_RELATIONSHIP.to_string(),
            amount: config.business_relationship_boost,
        });
    }
    total += partnership.min(config.partnership_cap);

    // 7. MSP context multiplier, applied at most once, after all
    // additions and before urgency and revenue-impact.
    if matches.has(KeywordCategory::MspContext) {
        total *= config.msp_multiplier;
        adjustments.push(AppliedAdjustment::Multiplier {
            name: MULTIPLIER_MSP.to_string(),
            factor: config.msp_multiplier,
        });
    }

    // 8. Urgency classification over the pre-revenue total.
    let urgency = classify_urgency(&matches, total, config);

    // 9. Revenue-impact model.
    let revenue_impact = revenue_impact(
        &matches,
        vendor_match.vendors.len(),
        cloud_boost,
        ma_boost,
        partnership.min(config.partnership_cap),
        item,
        urgency,
    );
    total += revenue_impact.weighted(&config.revenue_weights);

    Score {
        total: total.max(0.0),
        urgency,
        matched_terms: matches.by_category.clone(),
        vendors_detected: vendor_match.vendors,
        revenue_impact,
        multipliers_applied: adjustments,
    }
}

/// Convenience: stamp an item with its score.
pub fn score_item(
    item: RawItem,
    patterns: &PatternSet,
    dict: &VendorDictionary,
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> ScoredItem {
    let score = score(&item, patterns, dict, config, now);
    ScoredItem { item, score }
}

fn capped(value: f64, cap: f64) -> f64 {
    value.min(cap)
}

fn cloud_security_boost(
    matches: &PatternMatches,
    vendors: &std::collections::BTreeSet<String>,
    config: &ScoringConfig,
) -> f64 {
    if !(matches.has(KeywordCategory::CloudSecurity) && matches.has(KeywordCategory::Pricing)) {
        return 0.0;
    }
    let mut boost = config.cloud_security_combo_boost;
    if vendors
        .iter()
        .any(|v| CLOUD_SECURITY_VENDORS.contains(&v.as_str()))
    {
        boost += config.cloud_security_vendor_boost;
    }
    boost
}

fn ma_intelligence_boost(
    matches: &PatternMatches,
    vendors: &std::collections::BTreeSet<String>,
    dict: &VendorDictionary,
    config: &ScoringConfig,
) -> f64 {
    let pattern_hit = matches.ma_audit || matches.has(KeywordCategory::MaIntel);
    if !pattern_hit {
        return 0.0;
    }
    let involved: Vec<&String> = vendors
        .iter()
        .filter(|v| dict.in_acquisition_edge(v))
        .collect();
    if involved.is_empty() {
        return 0.0;
    }
    let mut boost = config.ma_pattern_boost;
    // The acquirer side of any edge the detected vendors participate
    // in, directly or via their chains.
    let consolidator_acquirer = involved.iter().any(|v| {
        dict.acquisition_chain(v)
            .iter()
            .any(|acquirer| dict.tier(acquirer) == Some(1) && dict.is_consolidator(acquirer))
            || (dict.tier(v) == Some(1) && dict.is_consolidator(v))
    });
    if consolidator_acquirer {
        boost += config.ma_consolidator_boost;
    }
    boost.min(config.ma_cap)
}

fn classify_urgency(matches: &PatternMatches, pre_revenue_total: f64, config: &ScoringConfig) -> Urgency {
    if matches.has(KeywordCategory::UrgencyHigh) || (matches.time_deadline && matches.scale) {
        Urgency::High
    } else if matches.has(KeywordCategory::UrgencyMedium)
        || pre_revenue_total >= config.urgency_medium_total_threshold
    {
        Urgency::Medium
    } else {
        Urgency::Low
    }
}

fn revenue_impact(
    matches: &PatternMatches,
    vendor_count: usize,
    cloud_boost: f64,
    ma_boost: f64,
    partnership_boost: f64,
    item: &RawItem,
    urgency: Urgency,
) -> RevenueImpact {
    let axis = |v: f64| v.clamp(0.0, 10.0);

    let immediate = axis(
        matches.count(KeywordCategory::Pricing) as f64 * 2.0
            + matches.count(KeywordCategory::UrgencyHigh) as f64 * 3.0
            + (item.engagement.weighted() as f64).ln_1p(),
    );
    let margin = axis(
        matches.count(KeywordCategory::Supply) as f64 * 2.0
            + vendor_count as f64 * 1.5
            + cloud_boost,
    );
    let competitive = axis(partnership_boost + ma_boost);
    let strategic = axis(
        (matches.count(KeywordCategory::Strategy) + matches.count(KeywordCategory::Technology))
            as f64
            * 2.5,
    );

    RevenueImpact {
        immediate,
        margin,
        competitive,
        strategic,
        urgency: urgency.axis_value(),
    }
}
