//! # Orchestrator
//!
//! The [`Engine`] owns the compiled pattern table, the vendor
//! dictionary, and the LLM client, and drives one batch invocation:
//! concurrent fetchers under a bounded semaphore, dedup, scoring,
//! selection, synthesis, analytics, and report assembly. Per-source
//! failures degrade the run; only a total fetch failure, cancellation,
//! or the global timeout abort it.

use chrono::Utc;
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::analytics::vendor_rollup;
use crate::cache::ResponseCache;
use crate::config::{AppConfig, ConfigError, RuntimeEnv};
use crate::dedup::dedup;
use crate::error::PipelineError;
use crate::fetch::forum::ForumFetcher;
use crate::fetch::search::SearchFetcher;
use crate::fetch::{FetchContext, FetchError, FetchOutcome, Fetcher};
use crate::models::{PartialFailure, RawItem, Report, RunStats, ScoredItem};
use crate::patterns::{PatternSet, load_keywords};
use crate::report::assemble;
use crate::scoring::score_item;
use crate::select::select;
use crate::summarize::{HttpLlmClient, LlmClient, SourceBinding, Summarizer, bind_sources};
use crate::vendors::VendorDictionary;

/// Everything a run needs, constructed once at startup. Tests build
/// isolated engines; nothing is process-global.
pub struct Engine {
    config: AppConfig,
    env: RuntimeEnv,
    dict: Arc<VendorDictionary>,
    patterns: Arc<PatternSet>,
    llm: Arc<dyn LlmClient>,
    http: reqwest::Client,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Build an engine from configuration: loads and validates the
    /// vendor dictionary and keyword file, compiles the pattern table,
    /// and checks that enabled sources have their credentials.
    pub fn new(config: AppConfig, env: RuntimeEnv) -> Result<Self, PipelineError> {
        if config.sources.search.enabled {
            if env.credentials.search_api_key.is_empty() {
                return Err(ConfigError::MissingCredential("PRICEWATCH_SEARCH_API_KEY").into());
            }
            if env.credentials.search_engine_id.is_empty() {
                return Err(ConfigError::MissingCredential("PRICEWATCH_SEARCH_ENGINE_ID").into());
            }
        }
        if env.credentials.llm_api_key.is_empty() {
            return Err(ConfigError::MissingCredential("PRICEWATCH_LLM_API_KEY").into());
        }

        let dict = Arc::new(VendorDictionary::load(&config.vendor_dictionary_path)?);
        let keywords = load_keywords(&config.keywords_path)?;
        let patterns = Arc::new(PatternSet::compile(&keywords));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.run.request_timeout_sec))
            .build()
            .map_err(|e| PipelineError::Internal(format!("http client: {e}")))?;
        let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::new(
            http.clone(),
            config.llm.base_url.clone(),
            env.credentials.llm_api_key.clone(),
            config.llm.clone(),
        ));

        Ok(Self {
            config,
            env,
            dict,
            patterns,
            llm,
            http,
        })
    }

    /// Swap the LLM transport; used by tests and embedders.
    pub fn with_llm_client(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = llm;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn dictionary(&self) -> &Arc<VendorDictionary> {
        &self.dict
    }

    /// Run one batch invocation to a finished report. The caller's
    /// cancellation token propagates to every in-flight fetcher and
    /// the LLM call; a cancelled run produces no report.
    pub async fn run(&self, cancel: CancellationToken) -> Result<Report, PipelineError> {
        let global = self.config.run.global_timeout_sec;
        match tokio::time::timeout(Duration::from_secs(global), self.execute(cancel.clone())).await
        {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                Err(PipelineError::GlobalTimeout(global))
            }
        }
    }

    #[instrument(skip_all, fields(run_id))]
    async fn execute(&self, cancel: CancellationToken) -> Result<Report, PipelineError> {
        let started = std::time::Instant::now();
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let mut run_stats = RunStats::new(run_id);

        let fetchers = self.build_fetchers();
        if fetchers.is_empty() {
            return Err(PipelineError::Internal(
                "no sources are enabled".to_string(),
            ));
        }

        let items = self.fetch_all(&fetchers, &cancel, &mut run_stats).await?;
        counter!("pricewatch_items_fetched_total").increment(items.len() as u64);
        if items.is_empty() {
            return Err(PipelineError::TotalFetchFailure);
        }
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let survivors = dedup(items);
        let now = Utc::now();
        let scored: Vec<ScoredItem> = survivors
            .into_iter()
            .map(|item| {
                score_item(item, &self.patterns, &self.dict, &self.config.scoring, now)
            })
            .collect();

        let selected = select(scored, &self.config.selector);
        run_stats.items_selected = selected.len();
        counter!("pricewatch_items_selected_total").increment(selected.len() as u64);
        info!(selected = selected.len(), "selection complete");

        let bindings: Vec<SourceBinding> =
            bind_sources(selected.into_iter().map(|s| s.item).collect());

        let summariser = Summarizer::new(
            self.llm.clone(),
            self.config.report.clone(),
            self.dict.clone(),
        );
        let llm_started = std::time::Instant::now();
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            outcome = summariser.summarise(&bindings) => outcome,
        };
        histogram!("pricewatch_llm_duration_seconds").record(llm_started.elapsed().as_secs_f64());
        run_stats.llm_tokens_used = outcome.tokens_used;
        run_stats.llm_failed = outcome.llm_failed;
        run_stats.llm_dropped = outcome.dropped;
        if outcome.llm_failed {
            warn!("llm synthesis failed, emitting report without insights");
        }

        let selected_items: Vec<ScoredItem> =
            bindings.iter().map(|b| b.item.clone()).collect();
        let rollup = vendor_rollup(&selected_items, &self.dict, self.config.report.vendor_top_n);

        run_stats.duration_ms = started.elapsed().as_millis() as u64;
        Ok(assemble(
            now,
            outcome.insights,
            outcome.executive_summary,
            &bindings,
            rollup,
            run_stats,
        ))
    }

    fn build_fetchers(&self) -> Vec<Arc<dyn Fetcher>> {
        let mut fetchers: Vec<Arc<dyn Fetcher>> = Vec::new();
        if self.config.sources.forum.enabled {
            fetchers.push(Arc::new(ForumFetcher::new(
                self.config.sources.forum.clone(),
                self.config.sources.forum.base_url.clone(),
                self.env.credentials.forum_user_agent.clone(),
                self.dict.clone(),
            )));
        }
        if self.config.sources.search.enabled {
            fetchers.push(Arc::new(SearchFetcher::new(
                self.config.sources.search.clone(),
                self.config.sources.search.base_url.clone(),
                self.env.credentials.search_api_key.clone(),
                self.env.credentials.search_engine_id.clone(),
            )));
        }
        fetchers
    }

    /// Run every fetcher concurrently, bounded by a semaphore sized to
    /// the source count. Per-source errors and timeouts are recorded
    /// as partial failures; cancellation aborts the whole run.
    async fn fetch_all(
        &self,
        fetchers: &[Arc<dyn Fetcher>],
        cancel: &CancellationToken,
        run_stats: &mut RunStats,
    ) -> Result<Vec<RawItem>, PipelineError> {
        let cache = if self.config.cache.enabled {
            Some(Arc::new(ResponseCache::new(
                self.config.cache.capacity,
                Duration::from_secs(self.config.cache.ttl_hours * 3600),
            )))
        } else {
            None
        };
        let semaphore = Arc::new(Semaphore::new(fetchers.len()));
        let per_source = Duration::from_secs(self.config.run.per_source_timeout_sec);

        let mut handles = Vec::new();
        for fetcher in fetchers {
            let fetcher = fetcher.clone();
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| PipelineError::Internal("semaphore closed".to_string()))?;
            let ctx = FetchContext::new(self.http.clone(), cache.clone(), cancel.clone())
                .with_deadline(tokio::time::Instant::now() + per_source);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let name = fetcher.name();
                let kind = fetcher.kind();
                (name, kind, fetcher.fetch(&ctx).await)
            }));
        }

        let mut items = Vec::new();
        for handle in handles {
            let (name, kind, result) = handle
                .await
                .map_err(|e| PipelineError::Internal(format!("fetcher task panicked: {e}")))?;
            match result {
                Ok(FetchOutcome {
                    items: fetched,
                    stats,
                    timed_out,
                }) => {
                    info!(
                        source = name,
                        kind = %kind,
                        items = fetched.len(),
                        requests = stats.requests,
                        retries = stats.retries,
                        timed_out,
                        "source finished"
                    );
                    run_stats
                        .items_fetched_per_source
                        .insert(name.to_string(), fetched.len());
                    if timed_out {
                        run_stats.partial_failures.push(PartialFailure {
                            source: name.to_string(),
                            error: "per-source timeout, partial results kept".to_string(),
                            timed_out: true,
                        });
                    }
                    items.extend(fetched);
                }
                Err(FetchError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(err) => {
                    error!(source = name, error = %err, "source failed");
                    counter!("pricewatch_source_failures_total").increment(1);
                    run_stats
                        .items_fetched_per_source
                        .insert(name.to_string(), 0);
                    run_stats.partial_failures.push(PartialFailure {
                        source: name.to_string(),
                        error: err.to_string(),
                        timed_out: false,
                    });
                }
            }
        }
        Ok(items)
    }
}

/// Aggregate fetch counts per source, for the run-complete log line.
pub fn fetch_summary(stats: &RunStats) -> String {
    let parts: Vec<String> = stats
        .items_fetched_per_source
        .iter()
        .map(|(source, count)| format!("{source}={count}"))
        .collect();
    parts.join(", ")
}
