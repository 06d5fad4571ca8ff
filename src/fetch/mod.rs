//! # Fetchers
//!
//! One fetcher per source. Each respects a per-source rate limit,
//! retries transient failures with exponential backoff and jitter, and
//! emits [`RawItem`]s that already satisfy the fetch-boundary
//! invariants. Hard failures surface as permanent errors that the
//! orchestrator records as partial failures without aborting the run.

use async_trait::async_trait;
use rand::Rng;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::ResponseCache;
use crate::models::{RawItem, SourceKind};

pub mod forum;
pub mod search;

/// Fetcher failure taxonomy. Transient and rate-limit errors are
/// retried; permanent errors end the source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transient error: {0}")]
    Transient(String),
    #[error("rate limited by upstream")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("permanent error: {0}")]
    Permanent(String),
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
    #[error("per-source deadline exceeded")]
    DeadlineExceeded,
    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_) | FetchError::RateLimited { .. })
    }
}

/// Per-source fetch counters reported into run stats.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchStats {
    pub requests: usize,
    pub retries: usize,
    pub items_emitted: usize,
    pub items_discarded: usize,
}

/// Items plus counters from one source.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub items: Vec<RawItem>,
    pub stats: FetchStats,
    /// Set when the per-source deadline cut collection short; the
    /// items gathered so far are still contributed.
    pub timed_out: bool,
}

/// Shared per-run context handed to every fetcher.
#[derive(Clone)]
pub struct FetchContext {
    pub http: reqwest::Client,
    pub cache: Option<Arc<ResponseCache>>,
    pub cancel: CancellationToken,
    /// Per-source wall deadline; requests past it fail with
    /// [`FetchError::DeadlineExceeded`].
    pub deadline: Option<tokio::time::Instant>,
}

impl FetchContext {
    pub fn new(
        http: reqwest::Client,
        cache: Option<Arc<ResponseCache>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            http,
            cache,
            cancel,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: tokio::time::Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn deadline_passed(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| tokio::time::Instant::now() >= deadline)
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Stable source label used for stats and partial-failure records.
    fn name(&self) -> &'static str;

    fn kind(&self) -> SourceKind;

    async fn fetch(&self, ctx: &FetchContext) -> Result<FetchOutcome, FetchError>;
}

/// Token-interval rate limiter: `acquire` waits until the next slot.
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<tokio::time::Instant>,
}

impl RateLimiter {
    pub fn new(rate_per_sec: f64) -> Self {
        let interval = if rate_per_sec > 0.0 {
            Duration::from_secs_f64(1.0 / rate_per_sec)
        } else {
            Duration::ZERO
        };
        Self {
            interval,
            next_slot: Mutex::new(tokio::time::Instant::now()),
        }
    }

    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }
        let wake_at = {
            let mut next = self.next_slot.lock().await;
            let now = tokio::time::Instant::now();
            let slot = if *next > now { *next } else { now };
            *next = slot + self.interval;
            slot
        };
        tokio::time::sleep_until(wake_at).await;
    }
}

/// Retry schedule for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with jitter; an upstream `Retry-After` hint
    /// becomes the floor.
    pub fn backoff(&self, attempts_completed: u32, retry_after_secs: Option<u64>) -> Duration {
        let mut backoff = (self.base.as_secs_f64() * 2_f64.powi(attempts_completed as i32))
            .min(self.max.as_secs_f64());
        if let Some(retry_after) = retry_after_secs {
            backoff = backoff.max(retry_after as f64);
        }
        let jitter = rand::thread_rng().gen_range(0.0..=(self.jitter_factor * backoff));
        Duration::from_secs_f64(backoff + jitter)
    }
}

/// GET a URL as text with cache read-through, rate limiting, retry,
/// and cancellation. The building block every fetcher uses.
pub async fn get_text(
    ctx: &FetchContext,
    limiter: &RateLimiter,
    policy: &RetryPolicy,
    url: &str,
    headers: &[(&str, &str)],
    stats: &mut FetchStats,
) -> Result<String, FetchError> {
    if let Some(cache) = &ctx.cache
        && let Some(body) = cache.get(url)
    {
        debug!(url, "cache hit");
        return Ok(body);
    }

    let mut last_error = FetchError::Transient("no attempts made".to_string());
    for attempt in 0..policy.max_attempts {
        if ctx.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        if ctx.deadline_passed() {
            return Err(FetchError::DeadlineExceeded);
        }
        if attempt > 0 {
            stats.retries += 1;
            let retry_after = match &last_error {
                FetchError::RateLimited { retry_after_secs } => *retry_after_secs,
                _ => None,
            };
            let delay = policy.backoff(attempt - 1, retry_after);
            debug!(url, attempt, delay_ms = delay.as_millis() as u64, "retrying request");
            tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        limiter.acquire().await;
        stats.requests += 1;

        let mut request = ctx.http.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(FetchError::Cancelled),
            response = request.send() => response,
        };

        match response {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let body = response
                        .text()
                        .await
                        .map_err(|e| FetchError::Transient(e.to_string()))?;
                    if let Some(cache) = &ctx.cache {
                        cache.put(url, body.clone());
                    }
                    return Ok(body);
                }
                last_error = classify_status(status, &response);
                if !last_error.is_retryable() {
                    return Err(last_error);
                }
                warn!(url, status = status.as_u16(), "upstream error, will retry");
            }
            Err(err) => {
                // Connect/timeout failures are transient; anything the
                // client refuses to build or send again is permanent.
                if err.is_builder() || err.is_redirect() {
                    return Err(FetchError::Permanent(err.to_string()));
                }
                last_error = FetchError::Transient(err.to_string());
                warn!(url, error = %err, "network error, will retry");
            }
        }
    }
    Err(last_error)
}

fn classify_status(status: StatusCode, response: &reqwest::Response) -> FetchError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        FetchError::RateLimited { retry_after_secs }
    } else if status.is_server_error() {
        FetchError::Transient(format!("upstream status {status}"))
    } else {
        FetchError::Permanent(format!("upstream status {status}"))
    }
}

/// Minimal HTML cleanup for API payloads that embed markup: drops tags
/// and decodes the handful of entities these APIs actually emit.
pub fn strip_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}
