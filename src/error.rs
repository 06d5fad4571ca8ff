//! # Error Handling
//!
//! Top-level pipeline error taxonomy and the process exit-code
//! mapping. Stage-local errors (fetch, dictionary, patterns, LLM) are
//! typed in their own modules and aggregate here at the orchestrator
//! boundary. No error is ever transmuted into synthetic report data.

use thiserror::Error;

use crate::config::ConfigError;
use crate::patterns::PatternError;
use crate::vendors::DictionaryError;

/// Exit codes for process invocations.
pub const EXIT_OK: i32 = 0;
pub const EXIT_CONFIG: i32 = 1;
pub const EXIT_TOTAL_FETCH_FAILURE: i32 = 2;
pub const EXIT_INTERNAL: i32 = 3;

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("vendor dictionary invalid: {0}")]
    Dictionary(#[from] DictionaryError),
    #[error("keywords invalid: {0}")]
    Keywords(#[from] PatternError),
    #[error("zero items fetched across all sources")]
    TotalFetchFailure,
    #[error("run cancelled")]
    Cancelled,
    #[error("run exceeded the global timeout of {0}s")]
    GlobalTimeout(u64),
    #[error("failed to write artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Process exit code per the external contract: 0 report produced,
    /// 1 configuration error, 2 total fetch failure, 3 anything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_)
            | PipelineError::Dictionary(_)
            | PipelineError::Keywords(_) => EXIT_CONFIG,
            PipelineError::TotalFetchFailure => EXIT_TOTAL_FETCH_FAILURE,
            PipelineError::Cancelled
            | PipelineError::GlobalTimeout(_)
            | PipelineError::Io(_)
            | PipelineError::Internal(_) => EXIT_INTERNAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_the_contract() {
        assert_eq!(
            PipelineError::Keywords(PatternError::UnknownCategory("x".to_string())).exit_code(),
            EXIT_CONFIG
        );
        assert_eq!(
            PipelineError::TotalFetchFailure.exit_code(),
            EXIT_TOTAL_FETCH_FAILURE
        );
        assert_eq!(PipelineError::Cancelled.exit_code(), EXIT_INTERNAL);
        assert_eq!(PipelineError::GlobalTimeout(600).exit_code(), EXIT_INTERNAL);
        assert_eq!(
            PipelineError::Internal("boom".to_string()).exit_code(),
            EXIT_INTERNAL
        );
    }
}
