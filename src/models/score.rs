//! Score model
//!
//! Output of the scoring engine: composite total, urgency class, the
//! matched-term inventory, detected vendors, and the revenue-impact
//! decomposition. Collections are ordered so serialised output is
//! deterministic across runs and platforms.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::item::RawItem;

/// Keyword categories recognised by the pattern compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordCategory {
    Pricing,
    UrgencyHigh,
    UrgencyMedium,
    Supply,
    Strategy,
    Technology,
    CloudSecurity,
    MaIntel,
    Partnership,
    MspContext,
    BusinessImpact,
}

impl KeywordCategory {
    pub const ALL: &'static [KeywordCategory] = &[
        KeywordCategory::Pricing,
        KeywordCategory::UrgencyHigh,
        KeywordCategory::UrgencyMedium,
        KeywordCategory::Supply,
        KeywordCategory::Strategy,
        KeywordCategory::Technology,
        KeywordCategory::CloudSecurity,
        KeywordCategory::MaIntel,
        KeywordCategory::Partnership,
        KeywordCategory::MspContext,
        KeywordCategory::BusinessImpact,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            KeywordCategory::Pricing => "pricing",
            KeywordCategory::UrgencyHigh => "urgency_high",
            KeywordCategory::UrgencyMedium => "urgency_medium",
            KeywordCategory::Supply => "supply",
            KeywordCategory::Strategy => "strategy",
            KeywordCategory::Technology => "technology",
            KeywordCategory::CloudSecurity => "cloud_security",
            KeywordCategory::MaIntel => "ma_intel",
            KeywordCategory::Partnership => "partnership",
            KeywordCategory::MspContext => "msp_context",
            KeywordCategory::BusinessImpact => "business_impact",
        }
    }

    /// Parse a category name as it appears in the keywords file.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for KeywordCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency classification of a scored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    /// Scalar mirror used by the revenue-impact urgency axis.
    pub const fn axis_value(self) -> f64 {
        match self {
            Urgency::High => 10.0,
            Urgency::Medium => 5.0,
            Urgency::Low => 1.0,
        }
    }
}

/// Five-axis revenue-impact decomposition, each axis in [0, 10].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueImpact {
    pub immediate: f64,
    pub margin: f64,
    pub competitive: f64,
    pub strategic: f64,
    pub urgency: f64,
}

impl RevenueImpact {
    /// Weighted contribution added to the composite total.
    pub fn weighted(&self, weights: &RevenueImpactWeights) -> f64 {
        weights.immediate * self.immediate
            + weights.margin * self.margin
            + weights.competitive * self.competitive
            + weights.strategic * self.strategic
            + weights.urgency * self.urgency
    }
}

/// Axis weights for the revenue-impact contribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RevenueImpactWeights {
    pub immediate: f64,
    pub margin: f64,
    pub competitive: f64,
    pub strategic: f64,
    pub urgency: f64,
}

impl Default for RevenueImpactWeights {
    fn default() -> Self {
        Self {
            immediate: 0.30,
            margin: 0.25,
            competitive: 0.20,
            strategic: 0.15,
            urgency: 0.10,
        }
    }
}

/// Audit record of a boost addition or multiplier applied to a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppliedAdjustment {
    Boost { name: String, amount: f64 },
    Multiplier { name: String, factor: f64 },
}

/// Full scoring result for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// Sum of all components, clamped to be non-negative.
    pub total: f64,
    pub urgency: Urgency,
    pub matched_terms: BTreeMap<KeywordCategory, Vec<String>>,
    pub vendors_detected: BTreeSet<String>,
    pub revenue_impact: RevenueImpact,
    pub multipliers_applied: Vec<AppliedAdjustment>,
}

/// A raw item stamped with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    #[serde(flatten)]
    pub item: RawItem,
    pub score: Score,
}
