//! # Summariser
//!
//! Binds each selected item to a stable 1-based SOURCE_ID, builds the
//! synthesis prompt, invokes the LLM, and validates the structured
//! response: footnote markers must refer to real bindings, duplicate
//! insights collapse, confidence and priority are derived post-hoc.
//! A malformed response earns exactly one repair retry; after that the
//! summariser soft-fails with an empty insight list and `llm_failed`
//! set. Synthetic fallback insights are never produced.

use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::config::ReportConfig;
use crate::models::{Confidence, Insight, Priority, Role, ScoredItem, Urgency};
use crate::patterns::{contains_quantifier, extract_quantifiers};
use crate::vendors::VendorDictionary;

pub mod llm;

pub use llm::{HttpLlmClient, LlmClient, LlmError, LlmRequest, LlmResponse};

/// One selected item bound to its invocation-scoped SOURCE_ID.
#[derive(Debug, Clone)]
pub struct SourceBinding {
    /// 1-based, sequential, stable for the invocation.
    pub source_id: usize,
    pub item: ScoredItem,
}

/// Assign sequential 1-based ids in selection order.
pub fn bind_sources(selected: Vec<ScoredItem>) -> Vec<SourceBinding> {
    selected
        .into_iter()
        .enumerate()
        .map(|(idx, item)| SourceBinding {
            source_id: idx + 1,
            item,
        })
        .collect()
}

/// Validated synthesis output.
#[derive(Debug, Default)]
pub struct SummaryOutcome {
    pub insights: Vec<Insight>,
    pub executive_summary: Option<String>,
    pub tokens_used: u64,
    pub llm_failed: bool,
    /// Insights dropped by validation (unknown or missing source ids).
    pub dropped: usize,
}

/// Parse result for one LLM response: `Ok` is used, `Repairable`
/// earns the single repair retry, `Fatal` soft-fails without one.
enum ParseOutcome {
    Ok(LlmPayload),
    Repairable(String),
    Fatal(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LlmPayload {
    #[serde(default)]
    insights: Vec<LlmInsight>,
    #[serde(default)]
    executive_summary: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LlmInsight {
    role: Role,
    text: String,
    #[serde(default)]
    claimed_priority: Option<Priority>,
}

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\[SOURCE_ID:(\d+)\]").expect("marker pattern is valid"))
}

/// Insight text with the footnote markers removed, so marker digits
/// never count as quantifiers.
fn text_without_markers(text: &str) -> String {
    marker_regex().replace_all(text, "").into_owned()
}

pub struct Summarizer {
    client: Arc<dyn LlmClient>,
    report_config: ReportConfig,
    dict: Arc<VendorDictionary>,
}

impl Summarizer {
    pub fn new(
        client: Arc<dyn LlmClient>,
        report_config: ReportConfig,
        dict: Arc<VendorDictionary>,
    ) -> Self {
        Self {
            client,
            report_config,
            dict,
        }
    }

    /// Synthesise insights for the bound sources. Never errors: LLM
    /// failure degrades to an empty outcome with `llm_failed` set.
    pub async fn summarise(&self, bindings: &[SourceBinding]) -> SummaryOutcome {
        if bindings.is_empty() {
            return SummaryOutcome::default();
        }

        let system = self.system_prompt();
        let user = self.user_prompt(bindings);
        let mut tokens_used = 0u64;

        let first = match self
            .client
            .complete(LlmRequest {
                system: system.clone(),
                user: user.clone(),
            })
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "llm call failed, retrying once");
                return self
                    .repair_attempt(
                        &system,
                        &user,
                        &format!("the previous call failed: {err}"),
                        bindings,
                        tokens_used,
                    )
                    .await;
            }
        };
        tokens_used += first.tokens_used;

        match parse_response(&first.content) {
            ParseOutcome::Ok(payload) => self.validate(payload, bindings, tokens_used),
            ParseOutcome::Repairable(reason) => {
                warn!(reason = %reason, "llm response failed validation, sending repair prompt");
                self.repair_attempt(&system, &user, &reason, bindings, tokens_used)
                    .await
            }
            ParseOutcome::Fatal(reason) => {
                warn!(reason = %reason, "llm response unusable, soft-failing");
                SummaryOutcome {
                    tokens_used,
                    llm_failed: true,
                    ..Default::default()
                }
            }
        }
    }

    async fn repair_attempt(
        &self,
        system: &str,
        user: &str,
        reason: &str,
        bindings: &[SourceBinding],
        mut tokens_used: u64,
    ) -> SummaryOutcome {
        let repair_user = format!(
            "{user}\n\nYour previous reply could not be used: {reason}. \
             Reply again with ONLY the JSON object described above. No prose, no code fences."
        );
        match self
            .client
            .complete(LlmRequest {
                system: system.to_string(),
                user: repair_user,
            })
            .await
        {
            Ok(response) => {
                tokens_used += response.tokens_used;
                match parse_response(&response.content) {
                    ParseOutcome::Ok(payload) => self.validate(payload, bindings, tokens_used),
                    ParseOutcome::Repairable(reason) | ParseOutcome::Fatal(reason) => {
                        warn!(reason = %reason, "repair attempt also failed, soft-failing");
                        SummaryOutcome {
                            tokens_used,
                            llm_failed: true,
                            ..Default::default()
                        }
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "repair attempt failed, soft-failing");
                SummaryOutcome {
                    tokens_used,
                    llm_failed: true,
                    ..Default::default()
                }
            }
        }
    }

    fn system_prompt(&self) -> String {
        "You are a pricing-intelligence analyst writing for three readers: a pricing \
         strategist, a procurement lead, and a strategy director. You synthesise vendor \
         pricing events from the numbered sources you are given. You never invent prices, \
         company names, or dates that do not appear in a cited source."
            .to_string()
    }

    fn user_prompt(&self, bindings: &[SourceBinding]) -> String {
        let mut prompt = String::new();
        prompt.push_str(
            "Analyse the numbered sources below and produce insights for each of the three \
             roles: pricing, procurement, strategy.\n\nRules:\n\
             - Every insight MUST cite at least one source with an inline marker of the form \
             [SOURCE_ID:k], where k is one of the source numbers below.\n\
             - Every insight MUST contain either a quantitative detail (price, percentage, \
             count) or a specific named vendor action.\n\
             - Do NOT fabricate prices, companies, or dates that are not present in a cited \
             source.\n\
             - Tag each insight with the role it serves.\n\n\
             Reply with ONLY a JSON object of this exact shape:\n\
             {\"insights\": [{\"role\": \"pricing|procurement|strategy\", \
             \"text\": \"... [SOURCE_ID:k] ...\", \
             \"claimed_priority\": \"alpha|beta|gamma\"}], \
             \"executive_summary\": \"single paragraph\"}\n\nSources:\n",
        );
        for binding in bindings {
            let item = &binding.item;
            let excerpt = excerpt(&item.item.body, self.report_config.excerpt_max_chars);
            let vendors = if item.score.vendors_detected.is_empty() {
                "none".to_string()
            } else {
                item.score
                    .vendors_detected
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            prompt.push_str(&format!(
                "[SOURCE_ID:{}] {}\nURL: {}\nVendors: {} | Urgency: {:?}\nExcerpt: {}\n\n",
                binding.source_id, item.item.title, item.item.url, vendors, item.score.urgency, excerpt
            ));
        }
        prompt
    }

    fn validate(
        &self,
        payload: LlmPayload,
        bindings: &[SourceBinding],
        tokens_used: u64,
    ) -> SummaryOutcome {
        let n = bindings.len();
        let mut dropped = 0usize;
        let mut seen_texts: HashSet<String> = HashSet::new();
        let mut insights = Vec::new();

        for raw in payload.insights {
            let cited = cited_ids(&raw.text);
            if cited.is_empty() {
                warn!(text = %raw.text, "insight cites no sources, dropping");
                dropped += 1;
                continue;
            }
            if cited.iter().any(|id| *id < 1 || *id > n) {
                warn!(text = %raw.text, "insight cites unknown source ids, dropping");
                dropped += 1;
                continue;
            }
            // Duplicate insights collapse, first wins.
            if !seen_texts.insert(normalise_text(&raw.text)) {
                continue;
            }

            let cited_items: Vec<&ScoredItem> = cited
                .iter()
                .map(|id| &bindings[id - 1].item)
                .collect();
            let confidence = self.derive_confidence(&raw.text, &cited_items);
            let derived_priority = derive_priority(&cited_items);
            let priority = match raw.claimed_priority {
                Some(claimed) if claimed >= derived_priority => claimed,
                _ => derived_priority,
            };
            let redundant = is_redundant(&raw.text, &self.dict);
            let text = if redundant {
                format!("[REDUNDANT] {}", raw.text)
            } else {
                raw.text
            };

            insights.push(Insight {
                role: raw.role,
                text,
                priority,
                confidence,
                cited_source_ids: cited,
                redundant,
            });
        }

        info!(
            kept = insights.len(),
            dropped,
            "llm response validated"
        );
        SummaryOutcome {
            insights,
            executive_summary: payload.executive_summary.filter(|s| !s.trim().is_empty()),
            tokens_used,
            llm_failed: false,
            dropped,
        }
    }

    /// Post-hoc confidence tiering; the model is never asked for it.
    fn derive_confidence(&self, text: &str, cited: &[&ScoredItem]) -> Confidence {
        let text = text_without_markers(text);
        let text = text.as_str();
        let distinct: BTreeSet<&str> = cited.iter().map(|i| i.item.url.as_str()).collect();
        let has_quantifier = contains_quantifier(text);
        if distinct.len() >= 3 && has_quantifier {
            return Confidence::High;
        }
        if distinct.len() >= 2 {
            return Confidence::Medium;
        }
        if distinct.len() == 1 && has_quantifier {
            let top_tier_vendor = cited
                .iter()
                .flat_map(|i| i.score.vendors_detected.iter())
                .chain(self.dict.match_text(text).vendors.iter())
                .any(|v| matches!(self.dict.tier(v), Some(1) | Some(2)));
            if top_tier_vendor {
                return Confidence::Medium;
            }
        }
        Confidence::Low
    }
}

/// Priority derived from the urgency of cited sources.
fn derive_priority(cited: &[&ScoredItem]) -> Priority {
    let max_urgency = cited
        .iter()
        .map(|i| i.score.urgency)
        .max()
        .unwrap_or(Urgency::Low);
    match max_urgency {
        Urgency::High => Priority::Alpha,
        Urgency::Medium => Priority::Beta,
        Urgency::Low => Priority::Gamma,
    }
}

/// An insight with neither a recognised vendor nor a quantifier is
/// annotated redundant.
fn is_redundant(text: &str, dict: &VendorDictionary) -> bool {
    let text = text_without_markers(text);
    dict.match_text(&text).vendors.is_empty() && !contains_quantifier(&text)
}

fn cited_ids(text: &str) -> BTreeSet<usize> {
    marker_regex()
        .captures_iter(text)
        .filter_map(|c| c[1].parse().ok())
        .collect()
}

fn normalise_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn excerpt(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let cut: String = body.chars().take(max_chars).collect();
    format!("{cut}…")
}

/// Strip a markdown code fence the model may have wrapped around the
/// JSON, then parse. Parse or schema failures are repairable; an empty
/// reply is fatal, since a repair prompt has nothing to correct.
fn parse_response(content: &str) -> ParseOutcome {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return ParseOutcome::Fatal("response was empty".to_string());
    }
    let candidate = if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    };
    match serde_json::from_str::<LlmPayload>(candidate) {
        Ok(payload) => ParseOutcome::Ok(payload),
        Err(err) => {
            // Last resort: the outermost brace span.
            if let (Some(open), Some(close)) = (candidate.find('{'), candidate.rfind('}'))
                && open < close
                && let Ok(payload) = serde_json::from_str::<LlmPayload>(&candidate[open..=close])
            {
                return ParseOutcome::Ok(payload);
            }
            ParseOutcome::Repairable(format!("response was not the required JSON object: {err}"))
        }
    }
}

/// Property check: every quantifier in the insight text appears
/// literally in the title or body of at least one cited source.
pub fn quantifiers_grounded(insight: &Insight, bindings: &[SourceBinding]) -> bool {
    let quantifiers = extract_quantifiers(&text_without_markers(&insight.text));
    quantifiers.iter().all(|q| {
        insight.cited_source_ids.iter().any(|id| {
            bindings
                .iter()
                .find(|b| b.source_id == *id)
                .is_some_and(|b| b.item.item.title.contains(q) || b.item.item.body.contains(q))
        })
    })
}
