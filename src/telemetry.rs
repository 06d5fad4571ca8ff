//! Telemetry: subscriber setup for batch runs.
//!
//! A run is one short-lived process, so the subscriber is tuned for
//! that shape: the configured level applies to pricewatch itself while
//! the HTTP stack underneath is quieted, because a fetch burst against
//! two sources otherwise drowns the per-stage log lines in
//! connection-pool chatter. `RUST_LOG` overrides everything when set.

use std::sync::OnceLock;

use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, fmt, layer::Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::RuntimeEnv;

/// Dependencies capped at `warn` unless the operator asks for them
/// explicitly via directives.
const QUIET_DEPS: &[&str] = &["hyper=warn", "reqwest=warn", "rustls=warn"];

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter '{directives}': {source}")]
    Filter {
        directives: String,
        source: tracing_subscriber::filter::ParseError,
    },
}

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Install the global subscriber for this process. Later calls are
/// no-ops, so embedders and test harnesses can call it freely.
pub fn init_tracing(env: &RuntimeEnv) -> Result<(), TelemetryError> {
    let filter = build_filter(&env.log_level)?;
    let json = env.log_format != "pretty";
    INSTALLED.get_or_init(|| install(filter, json));
    Ok(())
}

fn install(filter: EnvFilter, json: bool) {
    // Route legacy `log::` macros (emitted by some dependencies)
    // through tracing. A logger registered earlier, e.g. by a test
    // harness, is fine.
    let _ = LogTracer::init();

    let layer = if json {
        fmt::layer().json().flatten_event(true).boxed()
    } else {
        fmt::layer().pretty().with_target(false).boxed()
    };
    // A subscriber set earlier in this process wins; batch invocations
    // never need to replace it.
    let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
}

fn build_filter(log_level: &str) -> Result<EnvFilter, TelemetryError> {
    if let Ok(raw) = std::env::var("RUST_LOG") {
        return parse_directives(raw);
    }
    parse_directives(expand_level(log_level))
}

/// A bare level like `info` becomes `info` for the pipeline plus the
/// dependency caps; anything containing explicit directives is taken
/// as-is.
fn expand_level(log_level: &str) -> String {
    if log_level.contains(['=', ',']) {
        return log_level.to_string();
    }
    let mut directives = log_level.to_string();
    for dep in QUIET_DEPS {
        directives.push(',');
        directives.push_str(dep);
    }
    directives
}

fn parse_directives(directives: String) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(&directives)
        .map_err(|source| TelemetryError::Filter { directives, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_gets_dependency_caps() {
        assert_eq!(
            expand_level("debug"),
            "debug,hyper=warn,reqwest=warn,rustls=warn"
        );
    }

    #[test]
    fn explicit_directives_pass_through() {
        assert_eq!(expand_level("info,hyper=trace"), "info,hyper=trace");
        assert_eq!(expand_level("pricewatch=debug"), "pricewatch=debug");
    }

    #[test]
    fn invalid_directives_surface_as_errors() {
        let err = parse_directives("==nonsense==".to_string()).unwrap_err();
        assert!(err.to_string().contains("==nonsense=="));
    }

    #[test]
    fn valid_directives_parse() {
        assert!(parse_directives(expand_level("info")).is_ok());
    }
}
