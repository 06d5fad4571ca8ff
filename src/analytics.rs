//! # Vendor Analytics
//!
//! Mention counts over the selected set, weighted by vendor tier.
//! Acquisition chains are collapsed: a mention of a target also
//! credits every transitive acquirer at half weight.

use std::collections::BTreeMap;

use crate::models::{ScoredItem, VendorMention};
use crate::vendors::VendorDictionary;

const ACQUIRER_CO_CREDIT: f64 = 0.5;

/// Rank vendors across the selected items. Returns at most `top_n`
/// rows, ordered by ranking score descending, vendor name ascending on
/// ties.
pub fn vendor_rollup(
    selected: &[ScoredItem],
    dict: &VendorDictionary,
    top_n: usize,
) -> Vec<VendorMention> {
    // Distinct items per vendor; an item counts once per vendor no
    // matter how many aliases hit.
    let mut direct: BTreeMap<&str, f64> = BTreeMap::new();
    for item in selected {
        for vendor in &item.score.vendors_detected {
            *direct.entry(vendor.as_str()).or_default() += 1.0;
        }
    }

    let mut credited: BTreeMap<String, f64> = BTreeMap::new();
    for (vendor, mentions) in &direct {
        *credited.entry((*vendor).to_string()).or_default() += mentions;
        for acquirer in dict.acquisition_chain(vendor) {
            *credited.entry(acquirer).or_default() += mentions * ACQUIRER_CO_CREDIT;
        }
    }

    let mut rollup: Vec<VendorMention> = credited
        .into_iter()
        .map(|(vendor, mentions)| {
            let tier = dict.tier(&vendor).unwrap_or(4);
            let ranking_score = mentions * dict.tier_weight(&vendor);
            VendorMention {
                vendor,
                mentions,
                tier,
                ranking_score,
            }
        })
        .collect();

    rollup.sort_by(|a, b| {
        b.ranking_score
            .partial_cmp(&a.ranking_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.vendor.cmp(&b.vendor))
    });
    rollup.truncate(top_n);
    rollup
}
