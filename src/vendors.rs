//! # Vendor Dictionary
//!
//! Canonical vendor names, aliases, tier classification, and the
//! acquisition graph. Loaded once at startup and shared read-only.
//! Alias matching is case-insensitive, word-boundary anchored, and
//! longest-alias-wins within an overlapping span.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading and validating the dictionary file.
#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("failed to read vendor dictionary {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse vendor dictionary {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("duplicate alias '{alias}' (vendors '{first}' and '{second}')")]
    DuplicateAlias {
        alias: String,
        first: String,
        second: String,
    },
    #[error("vendor '{vendor}' has invalid tier {tier}, expected 1-4")]
    InvalidTier { vendor: String, tier: u8 },
    #[error("acquisition edge references unknown vendor '{0}'")]
    UnknownVendor(String),
    #[error("acquisition graph contains a cycle involving '{0}'")]
    AcquisitionCycle(String),
    #[error("failed to build alias matcher: {0}")]
    Matcher(#[from] aho_corasick::BuildError),
}

/// Per-vendor entry in the dictionary file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VendorEntry {
    #[serde(default)]
    pub aliases: Vec<String>,
    pub tier: u8,
    /// Tier-1 consolidators get the extra M&A acquirer boost.
    #[serde(default)]
    pub consolidator: bool,
}

/// One `target → acquirer` edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Acquisition {
    pub acquirer: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
}

/// On-disk dictionary format; roundtrippable through serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DictionaryFile {
    pub vendors: BTreeMap<String, VendorEntry>,
    #[serde(default)]
    pub acquisitions: Vec<Acquisition>,
}

/// Alias match result for one text.
#[derive(Debug, Clone, Default)]
pub struct VendorMatch {
    pub vendors: BTreeSet<String>,
    /// Canonical vendor → aliases that hit.
    pub hits: BTreeMap<String, Vec<String>>,
}

/// Compiled vendor dictionary.
#[derive(Debug)]
pub struct VendorDictionary {
    vendors: BTreeMap<String, VendorEntry>,
    acquisitions: Vec<Acquisition>,
    /// target → acquirers, deterministic order.
    acquirers_of: BTreeMap<String, Vec<String>>,
    automaton: AhoCorasick,
    pattern_vendor: Vec<String>,
    pattern_alias: Vec<String>,
}

impl VendorDictionary {
    pub fn load(path: &Path) -> Result<Self, DictionaryError> {
        let raw = fs::read_to_string(path).map_err(|source| DictionaryError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let file: DictionaryFile =
            serde_json::from_str(&raw).map_err(|source| DictionaryError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_file(file)
    }

    pub fn from_file(file: DictionaryFile) -> Result<Self, DictionaryError> {
        let DictionaryFile {
            vendors,
            acquisitions,
        } = file;

        for (canonical, entry) in &vendors {
            if !(1..=4).contains(&entry.tier) {
                return Err(DictionaryError::InvalidTier {
                    vendor: canonical.clone(),
                    tier: entry.tier,
                });
            }
        }

        // The canonical name is itself a matchable alias. Aliases must
        // be unique across the whole dictionary.
        let mut seen: HashMap<String, String> = HashMap::new();
        let mut pattern_vendor = Vec::new();
        let mut pattern_alias = Vec::new();
        for (canonical, entry) in &vendors {
            for alias in std::iter::once(canonical).chain(entry.aliases.iter()) {
                if let Some(first) = seen.insert(alias.to_lowercase(), canonical.clone()) {
                    return Err(DictionaryError::DuplicateAlias {
                        alias: alias.clone(),
                        first,
                        second: canonical.clone(),
                    });
                }
                pattern_vendor.push(canonical.clone());
                pattern_alias.push(alias.clone());
            }
        }

        for edge in &acquisitions {
            for vendor in [&edge.acquirer, &edge.target] {
                if !vendors.contains_key(vendor) {
                    return Err(DictionaryError::UnknownVendor(vendor.clone()));
                }
            }
        }

        let mut acquirers_of: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for edge in &acquisitions {
            let acquirers = acquirers_of.entry(edge.target.clone()).or_default();
            if !acquirers.contains(&edge.acquirer) {
                acquirers.push(edge.acquirer.clone());
            }
        }
        for acquirers in acquirers_of.values_mut() {
            acquirers.sort();
        }
        check_acyclic(&acquirers_of)?;

        let automaton = AhoCorasickBuilder::new()
            .match_kind(MatchKind::LeftmostLongest)
            .ascii_case_insensitive(true)
            .build(&pattern_alias)?;

        Ok(Self {
            vendors,
            acquisitions,
            acquirers_of,
            automaton,
            pattern_vendor,
            pattern_alias,
        })
    }

    /// Match every vendor alias present in the text as a whole word.
    /// Leftmost-longest semantics mean an alias fully contained in a
    /// longer matching alias at the same position never fires.
    pub fn match_text(&self, text: &str) -> VendorMatch {
        let bytes = text.as_bytes();
        let mut result = VendorMatch::default();
        for hit in self.automaton.find_iter(text) {
            if !on_word_boundary(bytes, hit.start(), hit.end()) {
                continue;
            }
            let canonical = &self.pattern_vendor[hit.pattern().as_usize()];
            let alias = &self.pattern_alias[hit.pattern().as_usize()];
            result.vendors.insert(canonical.clone());
            let aliases = result.hits.entry(canonical.clone()).or_default();
            if !aliases.contains(alias) {
                aliases.push(alias.clone());
            }
        }
        result
    }

    /// Walk `target → acquirer` edges from `vendor`. The vendor itself
    /// is not included; order is breadth-first, alphabetical within a
    /// level. The graph is validated acyclic at load.
    pub fn acquisition_chain(&self, vendor: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut frontier = vec![vendor.to_string()];
        while let Some(current) = frontier.pop() {
            if let Some(acquirers) = self.acquirers_of.get(&current) {
                for acquirer in acquirers {
                    if !chain.contains(acquirer) {
                        chain.push(acquirer.clone());
                        frontier.push(acquirer.clone());
                    }
                }
            }
        }
        chain
    }

    /// True when the vendor appears on either side of any acquisition edge.
    pub fn in_acquisition_edge(&self, vendor: &str) -> bool {
        self.acquisitions
            .iter()
            .any(|e| e.acquirer == vendor || e.target == vendor)
    }

    pub fn tier(&self, vendor: &str) -> Option<u8> {
        self.vendors.get(vendor).map(|e| e.tier)
    }

    pub fn is_consolidator(&self, vendor: &str) -> bool {
        self.vendors.get(vendor).is_some_and(|e| e.consolidator)
    }

    /// Confidence boost by tier: 1 → 0.30, 2 → 0.20, 3 → 0.10, 4 → 0.00.
    pub fn confidence_boost(&self, vendor: &str) -> f64 {
        match self.tier(vendor) {
            Some(1) => 0.30,
            Some(2) => 0.20,
            Some(3) => 0.10,
            _ => 0.0,
        }
    }

    /// Analytics weight by tier: 1 → 3.0, 2 → 2.0, 3 → 1.5, 4 → 1.0.
    pub fn tier_weight(&self, vendor: &str) -> f64 {
        match self.tier(vendor) {
            Some(1) => 3.0,
            Some(2) => 2.0,
            Some(3) => 1.5,
            _ => 1.0,
        }
    }

    /// True when any tier-1 vendor alias appears in the text. Used by
    /// the forum quality filter, which exempts tier-1 titles.
    pub fn tier1_in_text(&self, text: &str) -> bool {
        self.match_text(text)
            .vendors
            .iter()
            .any(|v| self.tier(v) == Some(1))
    }

    pub fn vendor_names(&self) -> impl Iterator<Item = &str> {
        self.vendors.keys().map(String::as_str)
    }
}

fn on_word_boundary(bytes: &[u8], start: usize, end: usize) -> bool {
    let before_ok = start == 0 || !is_word_byte(bytes[start - 1]);
    let after_ok = end == bytes.len() || !is_word_byte(bytes[end]);
    before_ok && after_ok
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Depth-first cycle check over the `target → acquirer` edges.
fn check_acyclic(acquirers_of: &BTreeMap<String, Vec<String>>) -> Result<(), DictionaryError> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Visiting,
        Done,
    }

    fn visit(
        node: &str,
        acquirers_of: &BTreeMap<String, Vec<String>>,
        states: &mut HashMap<String, State>,
    ) -> Result<(), DictionaryError> {
        match states.get(node) {
            Some(State::Done) => return Ok(()),
            Some(State::Visiting) => {
                return Err(DictionaryError::AcquisitionCycle(node.to_string()));
            }
            None => {}
        }
        states.insert(node.to_string(), State::Visiting);
        if let Some(next) = acquirers_of.get(node) {
            for acquirer in next {
                visit(acquirer, acquirers_of, states)?;
            }
        }
        states.insert(node.to_string(), State::Done);
        Ok(())
    }

    let mut states = HashMap::new();
    for node in acquirers_of.keys() {
        visit(node, acquirers_of, &mut states)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(aliases: &[&str], tier: u8) -> VendorEntry {
        VendorEntry {
            aliases: aliases.iter().map(|a| (*a).to_string()).collect(),
            tier,
            consolidator: false,
        }
    }

    fn sample() -> VendorDictionary {
        let mut vendors = BTreeMap::new();
        vendors.insert("vmware".to_string(), entry(&["VMware by Broadcom", "esxi"], 1));
        vendors.insert(
            "broadcom".to_string(),
            VendorEntry {
                aliases: vec!["avago".to_string()],
                tier: 1,
                consolidator: true,
            },
        );
        vendors.insert("oracle".to_string(), entry(&["oracle cloud"], 2));
        VendorDictionary::from_file(DictionaryFile {
            vendors,
            acquisitions: vec![Acquisition {
                acquirer: "broadcom".to_string(),
                target: "vmware".to_string(),
                year: Some(2023),
            }],
        })
        .unwrap()
    }

    #[test]
    fn matches_canonical_and_aliases_case_insensitively() {
        let dict = sample();
        let matched = dict.match_text("VMWARE and Avago are both mentioned");
        assert!(matched.vendors.contains("vmware"));
        assert!(matched.vendors.contains("broadcom"));
        assert_eq!(matched.hits["broadcom"], vec!["avago".to_string()]);
    }

    #[test]
    fn does_not_match_inside_longer_words() {
        let dict = sample();
        // "corel" must not match, nor must an alias hit inside a word.
        let matched = dict.match_text("corel and oracleish are not vendors");
        assert!(matched.vendors.is_empty());
    }

    #[test]
    fn longest_alias_wins_within_a_span() {
        let dict = sample();
        let matched = dict.match_text("Migrating off VMware by Broadcom next year");
        // The long alias covers the span; the embedded "vmware" token
        // maps to the same canonical either way, but the hit recorded
        // is the longest alias.
        assert_eq!(matched.hits["vmware"], vec!["VMware by Broadcom".to_string()]);
    }

    #[test]
    fn acquisition_chain_walks_target_to_acquirer() {
        let dict = sample();
        assert_eq!(dict.acquisition_chain("vmware"), vec!["broadcom".to_string()]);
        assert!(dict.acquisition_chain("broadcom").is_empty());
    }

    #[test]
    fn duplicate_alias_fails_load() {
        let mut vendors = BTreeMap::new();
        vendors.insert("a".to_string(), entry(&["shared"], 1));
        vendors.insert("b".to_string(), entry(&["SHARED"], 2));
        let err = VendorDictionary::from_file(DictionaryFile {
            vendors,
            acquisitions: vec![],
        })
        .unwrap_err();
        assert!(matches!(err, DictionaryError::DuplicateAlias { .. }));
    }

    #[test]
    fn acquisition_cycle_fails_load() {
        let mut vendors = BTreeMap::new();
        vendors.insert("a".to_string(), entry(&[], 1));
        vendors.insert("b".to_string(), entry(&[], 1));
        let err = VendorDictionary::from_file(DictionaryFile {
            vendors,
            acquisitions: vec![
                Acquisition {
                    acquirer: "a".to_string(),
                    target: "b".to_string(),
                    year: None,
                },
                Acquisition {
                    acquirer: "b".to_string(),
                    target: "a".to_string(),
                    year: None,
                },
            ],
        })
        .unwrap_err();
        assert!(matches!(err, DictionaryError::AcquisitionCycle(_)));
    }

    #[test]
    fn tier_helpers() {
        let dict = sample();
        assert_eq!(dict.confidence_boost("vmware"), 0.30);
        assert_eq!(dict.confidence_boost("oracle"), 0.20);
        assert_eq!(dict.tier_weight("oracle"), 2.0);
        assert!(dict.is_consolidator("broadcom"));
        assert!(dict.tier1_in_text("thread about ESXi pricing"));
        assert!(!dict.tier1_in_text("thread about oracle cloud pricing"));
    }

    #[test]
    fn invalid_tier_fails_load() {
        let mut vendors = BTreeMap::new();
        vendors.insert("a".to_string(), entry(&[], 5));
        let err = VendorDictionary::from_file(DictionaryFile {
            vendors,
            acquisitions: vec![],
        })
        .unwrap_err();
        assert!(matches!(err, DictionaryError::InvalidTier { .. }));
    }
}
