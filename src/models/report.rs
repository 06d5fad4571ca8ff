//! Report model
//!
//! The typed run artifact: insights grouped by priority, the source
//! list ordered by SOURCE_ID, the vendor rollup, and run metadata.
//! This object is what the external HTML renderer and the JSON sink
//! both consume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::insight::{Insight, Priority};
use super::item::SourceKind;

/// One entry in the report's source list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_id: usize,
    pub url: String,
    pub title: String,
    pub source_kind: SourceKind,
    pub posted_at: DateTime<Utc>,
}

/// One row of the vendor rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorMention {
    pub vendor: String,
    /// Distinct selected items mentioning the vendor, plus acquisition
    /// co-credit (0.5 per transitively acquired target mention).
    pub mentions: f64,
    pub tier: u8,
    /// Mentions weighted by tier.
    pub ranking_score: f64,
}

/// One per-source failure recorded without failing the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialFailure {
    pub source: String,
    pub error: String,
    /// True when the source timed out and contributed what it had.
    #[serde(default)]
    pub timed_out: bool,
}

/// Run metadata carried in every report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub run_id: Uuid,
    pub items_fetched_per_source: BTreeMap<String, usize>,
    pub items_selected: usize,
    pub llm_tokens_used: u64,
    /// Set when the LLM call failed after the repair retry; the
    /// insight list is empty in that case, never synthesised.
    #[serde(default)]
    pub llm_failed: bool,
    /// Insights dropped by response validation (unknown source ids).
    #[serde(default)]
    pub llm_dropped: usize,
    pub duration_ms: u64,
    pub partial_failures: Vec<PartialFailure>,
}

impl RunStats {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            items_fetched_per_source: BTreeMap::new(),
            items_selected: 0,
            llm_tokens_used: 0,
            llm_failed: false,
            llm_dropped: 0,
            duration_ms: 0,
            partial_failures: Vec::new(),
        }
    }
}

/// The complete report for one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    /// All three priorities are present, empty lists included, so the
    /// renderer layout is stable. Iterate [`Priority::DISPLAY_ORDER`]
    /// for alpha-first presentation; the map itself orders keys by
    /// severity ascending.
    pub insights_by_priority: BTreeMap<Priority, Vec<Insight>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executive_summary: Option<String>,
    /// Ordered by `source_id`.
    pub sources: Vec<SourceRef>,
    pub vendor_rollup: Vec<VendorMention>,
    pub run_stats: RunStats,
}

impl Report {
    /// All insights across priorities, highest first.
    pub fn insights(&self) -> impl Iterator<Item = &Insight> {
        Priority::DISPLAY_ORDER
            .iter()
            .filter_map(|p| self.insights_by_priority.get(p))
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::insight::{Confidence, Role};
    use std::collections::BTreeSet;

    fn sample_report() -> Report {
        let mut insights_by_priority = BTreeMap::new();
        for p in Priority::DISPLAY_ORDER {
            insights_by_priority.insert(*p, Vec::new());
        }
        insights_by_priority.get_mut(&Priority::Alpha).unwrap().push(Insight {
            role: Role::Pricing,
            text: "VMware core licensing up 50% [SOURCE_ID:1]".to_string(),
            priority: Priority::Alpha,
            confidence: Confidence::Medium,
            cited_source_ids: BTreeSet::from([1]),
            redundant: false,
        });
        Report {
            generated_at: "2026-02-01T08:00:00Z".parse().unwrap(),
            insights_by_priority,
            executive_summary: Some("One paragraph.".to_string()),
            sources: vec![SourceRef {
                source_id: 1,
                url: "https://example.com/post".to_string(),
                title: "VMware price hike".to_string(),
                source_kind: SourceKind::Forum,
                posted_at: "2026-02-01T05:00:00Z".parse().unwrap(),
            }],
            vendor_rollup: vec![VendorMention {
                vendor: "vmware".to_string(),
                mentions: 1.0,
                tier: 1,
                ranking_score: 3.0,
            }],
            run_stats: RunStats::new(Uuid::nil()),
        }
    }

    #[test]
    fn serialisation_round_trips() {
        let report = sample_report();
        let json = serde_json::to_string(&report).unwrap();
        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
        // Idempotent: a second serialise of the parsed value is identical.
        assert_eq!(serde_json::to_string(&parsed).unwrap(), json);
    }

    #[test]
    fn insights_iterate_highest_priority_first() {
        let report = sample_report();
        let texts: Vec<_> = report.insights().map(|i| i.priority).collect();
        assert_eq!(texts, vec![Priority::Alpha]);
    }
}
