//! # Data Models
//!
//! This module contains the data model shared across the pipeline
//! stages: raw items, scores, insights, and the report artifact.

pub mod insight;
pub mod item;
pub mod report;
pub mod score;

pub use insight::{Confidence, Insight, Priority, Role};
pub use item::{Engagement, RawItem, SourceKind, content_hash};
pub use report::{PartialFailure, Report, RunStats, SourceRef, VendorMention};
pub use score::{
    AppliedAdjustment, KeywordCategory, RevenueImpact, RevenueImpactWeights, Score, ScoredItem,
    Urgency,
};
