//! Insight model
//!
//! A validated narrative insight produced by the summariser. Footnote
//! markers of the form `[SOURCE_ID:k]` embedded in the text refer to
//! the invocation-scoped source bindings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The persona an insight was produced under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Pricing,
    Procurement,
    Strategy,
}

impl Role {
    pub const ALL: &'static [Role] = &[Role::Pricing, Role::Procurement, Role::Strategy];

    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Pricing => "pricing",
            Role::Procurement => "procurement",
            Role::Strategy => "strategy",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived severity of an insight. Alpha is highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Gamma,
    Beta,
    Alpha,
}

impl Priority {
    /// Display order for the report: highest priority first.
    pub const DISPLAY_ORDER: &'static [Priority] =
        &[Priority::Alpha, Priority::Beta, Priority::Gamma];

    pub const fn as_str(self) -> &'static str {
        match self {
            Priority::Alpha => "alpha",
            Priority::Beta => "beta",
            Priority::Gamma => "gamma",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived confidence tier, never asked of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// A validated insight with source attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub role: Role,
    /// Narrative text containing `[SOURCE_ID:k]` footnote markers.
    pub text: String,
    pub priority: Priority,
    pub confidence: Confidence,
    /// Source ids cited in the text; always a subset of the bindings
    /// passed to the model.
    pub cited_source_ids: BTreeSet<usize>,
    /// Set when the insight names neither a vendor nor a quantifier.
    /// Flagged, not dropped; callers may filter.
    #[serde(default)]
    pub redundant: bool,
}
