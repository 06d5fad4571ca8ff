//! # Pattern Compiler
//!
//! Compiles per-category keyword phrase lists into case-insensitive
//! word-boundary matchers, evaluated once per item. Compilation
//! failures for individual phrases degrade to substring matching with
//! a warning; they never fail the pipeline.

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use crate::models::KeywordCategory;

/// Errors raised while loading the keywords file. Individual phrase
/// compile failures are warnings, not errors.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("failed to read keywords file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse keywords file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("unknown keyword category '{0}'")]
    UnknownCategory(String),
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct KeywordsFile(BTreeMap<String, Vec<String>>);

/// Load the category → phrases map, rejecting unknown category names.
pub fn load_keywords(
    path: &Path,
) -> Result<BTreeMap<KeywordCategory, Vec<String>>, PatternError> {
    let raw = fs::read_to_string(path).map_err(|source| PatternError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let file: KeywordsFile = serde_json::from_str(&raw).map_err(|source| PatternError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    let mut keywords = BTreeMap::new();
    for (name, phrases) in file.0 {
        let category = KeywordCategory::parse(&name)
            .ok_or_else(|| PatternError::UnknownCategory(name.clone()))?;
        keywords.insert(category, phrases);
    }
    Ok(keywords)
}

enum PhraseMatcher {
    Compiled(Regex),
    /// Fallback when regex compilation fails: lowercase substring.
    Substring(String),
}

struct CompiledPhrase {
    phrase: String,
    matcher: PhraseMatcher,
}

impl CompiledPhrase {
    fn compile(phrase: &str) -> Self {
        let matcher = match build_phrase_regex(phrase) {
            Ok(regex) => PhraseMatcher::Compiled(regex),
            Err(err) => {
                warn!(phrase, error = %err, "phrase failed to compile, falling back to substring match");
                PhraseMatcher::Substring(phrase.to_lowercase())
            }
        };
        Self {
            phrase: phrase.to_string(),
            matcher,
        }
    }

    fn is_match(&self, text: &str, text_lower: &str) -> bool {
        match &self.matcher {
            PhraseMatcher::Compiled(regex) => regex.is_match(text),
            PhraseMatcher::Substring(needle) => text_lower.contains(needle.as_str()),
        }
    }
}

/// Word-boundary anchors are only placed against word characters;
/// phrases that start or end with punctuation compare literally.
fn build_phrase_regex(phrase: &str) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(phrase.trim());
    let leading = phrase
        .trim()
        .chars()
        .next()
        .is_some_and(|c| c.is_alphanumeric() || c == '_');
    let trailing = phrase
        .trim()
        .chars()
        .last()
        .is_some_and(|c| c.is_alphanumeric() || c == '_');
    let pattern = format!(
        "(?i){}{}{}",
        if leading { r"\b" } else { "" },
        escaped,
        if trailing { r"\b" } else { "" },
    );
    Regex::new(&pattern)
}

struct CategoryMatcher {
    phrases: Vec<CompiledPhrase>,
}

impl CategoryMatcher {
    fn compile(phrases: &[String]) -> Self {
        Self {
            phrases: phrases.iter().map(|p| CompiledPhrase::compile(p)).collect(),
        }
    }

    fn matches(&self, text: &str, text_lower: &str) -> Vec<String> {
        self.phrases
            .iter()
            .filter(|p| p.is_match(text, text_lower))
            .map(|p| p.phrase.clone())
            .collect()
    }

    fn any_match(&self, text: &str, text_lower: &str) -> bool {
        self.phrases.iter().any(|p| p.is_match(text, text_lower))
    }
}

/// Match result for one item's text across all categories plus the
/// auxiliary urgency co-detection groups.
#[derive(Debug, Clone, Default)]
pub struct PatternMatches {
    pub by_category: BTreeMap<KeywordCategory, Vec<String>>,
    /// Auxiliary: a time-deadline phrase matched.
    pub time_deadline: bool,
    /// Auxiliary: a scale phrase ("thousands", "all partners") matched.
    pub scale: bool,
    /// Auxiliary: a post-acquisition/audit phrase matched.
    pub ma_audit: bool,
    /// Auxiliary: a partner-tier-change phrase matched.
    pub partner_tier_change: bool,
    /// Auxiliary: a business-relationship-change phrase matched.
    pub business_relationship_change: bool,
}

impl PatternMatches {
    pub fn category(&self, category: KeywordCategory) -> &[String] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn count(&self, category: KeywordCategory) -> usize {
        self.category(category).len()
    }

    pub fn has(&self, category: KeywordCategory) -> bool {
        self.count(category) > 0
    }
}

/// Auxiliary phrase groups consumed only by urgency co-detection.
/// These are not configurable categories.
const TIME_DEADLINE_PHRASES: &[&str] = &[
    "effective immediately",
    "by end of",
    "deadline",
    "expires",
    "renewal deadline",
    "last day",
    "final notice",
    "within 30 days",
    "within 60 days",
    "end of quarter",
    "end of month",
];

const SCALE_PHRASES: &[&str] = &[
    "thousands",
    "all partners",
    "all customers",
    "every customer",
    "entire install base",
    "across the board",
    "fleet-wide",
    "company-wide",
];

const MA_AUDIT_PHRASES: &[&str] = &[
    "post-acquisition",
    "license audit",
    "software audit",
    "true-up",
    "compliance audit",
    "audit letter",
    "acquisition integration",
    "post-merger",
];

const PARTNER_TIER_CHANGE_PHRASES: &[&str] = &[
    "partner tier",
    "tier change",
    "program tier",
    "partner program overhaul",
    "tier requirements",
    "tier restructuring",
    "demoted to",
    "certification requirements",
];

const BUSINESS_RELATIONSHIP_PHRASES: &[&str] = &[
    "ends partnership",
    "ended the partnership",
    "terminated agreement",
    "exclusive agreement",
    "distribution agreement",
    "goes direct",
    "drops reseller",
    "channel exit",
];

/// Compiled, read-only pattern table shared across workers. Built once
/// at engine construction.
pub struct PatternSet {
    categories: BTreeMap<KeywordCategory, CategoryMatcher>,
    time_deadline: CategoryMatcher,
    scale: CategoryMatcher,
    ma_audit: CategoryMatcher,
    partner_tier_change: CategoryMatcher,
    business_relationship_change: CategoryMatcher,
}

impl PatternSet {
    pub fn compile(keywords: &BTreeMap<KeywordCategory, Vec<String>>) -> Self {
        let categories = keywords
            .iter()
            .map(|(category, phrases)| (*category, CategoryMatcher::compile(phrases)))
            .collect();
        let builtin = |phrases: &[&str]| {
            let owned: Vec<String> = phrases.iter().map(|p| (*p).to_string()).collect();
            CategoryMatcher::compile(&owned)
        };
        Self {
            categories,
            time_deadline: builtin(TIME_DEADLINE_PHRASES),
            scale: builtin(SCALE_PHRASES),
            ma_audit: builtin(MA_AUDIT_PHRASES),
            partner_tier_change: builtin(PARTNER_TIER_CHANGE_PHRASES),
            business_relationship_change: builtin(BUSINESS_RELATIONSHIP_PHRASES),
        }
    }

    /// Evaluate every category against the text in one pass.
    pub fn match_text(&self, text: &str) -> PatternMatches {
        let text_lower = text.to_lowercase();
        let mut by_category = BTreeMap::new();
        for (category, matcher) in &self.categories {
            let hits = matcher.matches(text, &text_lower);
            if !hits.is_empty() {
                by_category.insert(*category, hits);
            }
        }
        PatternMatches {
            by_category,
            time_deadline: self.time_deadline.any_match(text, &text_lower),
            scale: self.scale.any_match(text, &text_lower),
            ma_audit: self.ma_audit.any_match(text, &text_lower),
            partner_tier_change: self.partner_tier_change.any_match(text, &text_lower),
            business_relationship_change: self
                .business_relationship_change
                .any_match(text, &text_lower),
        }
    }
}

/// Quantifier detection: currency amounts, percentages, and explicit
/// counts. Used by confidence derivation and the no-fabrication check.
pub fn quantifier_regex() -> &'static Regex {
    use std::sync::OnceLock;
    static QUANTIFIER: OnceLock<Regex> = OnceLock::new();
    QUANTIFIER.get_or_init(|| {
        Regex::new(
            r"(?i)(?:[$€£]\s?\d[\d,]*(?:\.\d+)?\s?(?:k|m|b|million|billion)?|\d+(?:\.\d+)?\s?%|\b\d[\d,]{2,}\b|\b\d+\s+(?:users|customers|partners|seats|licenses|cores|endpoints)\b)",
        )
        .expect("quantifier pattern is valid")
    })
}

/// Every quantifier token present in the text, in order of appearance.
pub fn extract_quantifiers(text: &str) -> Vec<String> {
    quantifier_regex()
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

/// True when the text carries at least one quantifier.
pub fn contains_quantifier(text: &str) -> bool {
    quantifier_regex().is_match(text)
}
