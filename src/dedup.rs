//! # Dedup
//!
//! Collapses near-duplicate items before scoring: first by normalised
//! URL, then by content hash. Within a group the survivor is the item
//! with the highest weighted engagement, newest on a tie.

use std::collections::HashMap;
use tracing::debug;
use url::Url;

use crate::models::RawItem;

/// Tracking query parameters stripped during URL normalisation.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "ref", "ref_src", "msclkid", "mc_cid"];

/// Canonicalise a URL for dedup: lowercase scheme and host, drop the
/// fragment and tracking params, strip a trailing slash. Unparseable
/// URLs are returned trimmed and unchanged.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    url.set_fragment(None);
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| {
            !key.starts_with("utm_") && !TRACKING_PARAMS.contains(&key.as_ref())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let query = kept
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k}={v}")
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    // Url lowercases scheme and host on parse already.
    let mut out = url.to_string();
    if out.ends_with('/') && url.path() == "/" && url.query().is_none() {
        out.pop();
    } else if url.path().len() > 1 && url.path().ends_with('/') && url.query().is_none() {
        out.pop();
    }
    out
}

/// Collapse duplicates. Grouping is by normalised URL; items whose
/// URLs differ but whose content hashes collide are also collapsed.
/// Survivor order follows first appearance of each group.
pub fn dedup(items: Vec<RawItem>) -> Vec<RawItem> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, RawItem> = HashMap::new();
    let mut hash_to_key: HashMap<String, String> = HashMap::new();

    let before = items.len();
    for mut item in items {
        item.url = normalize_url(&item.url);
        let key = match hash_to_key.get(&item.content_hash) {
            Some(existing) if *existing != item.url => existing.clone(),
            _ => item.url.clone(),
        };
        hash_to_key
            .entry(item.content_hash.clone())
            .or_insert_with(|| key.clone());

        match groups.entry(key.clone()) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                order.push(key);
                slot.insert(item);
            }
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                if prefer(&item, slot.get()) {
                    slot.insert(item);
                }
            }
        }
    }

    let survivors: Vec<RawItem> = order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .collect();
    if survivors.len() < before {
        debug!(
            before,
            after = survivors.len(),
            "collapsed duplicate items"
        );
    }
    survivors
}

/// True when `candidate` should replace `incumbent` as group survivor.
fn prefer(candidate: &RawItem, incumbent: &RawItem) -> bool {
    let c = candidate.engagement.weighted();
    let i = incumbent.engagement.weighted();
    c > i || (c == i && candidate.posted_at > incumbent.posted_at)
}
