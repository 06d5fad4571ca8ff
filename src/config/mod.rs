//! Configuration loading for the pricewatch pipeline.
//!
//! Pipeline options come from a single typed JSON file with every
//! recognised field enumerated; unknown fields are a hard error, not a
//! silent ignore. Credentials and logging options come from layered
//! `.env` files and `PRICEWATCH_*` environment variables, with the
//! process environment winning.

use std::{collections::BTreeMap, env, fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::scoring::ScoringConfig;
pub use crate::select::SelectorConfig;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("missing required credential {0}")]
    MissingCredential(&'static str),
}

/// Forum source options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ForumSourceConfig {
    pub enabled: bool,
    pub sub_channels: Vec<String>,
    pub rate_per_sec: f64,
    pub min_upvotes: u32,
    pub min_comments: u32,
    pub window_hours: u64,
    pub fallback_window_hours: u64,
    pub fallback_threshold: usize,
    /// API base; overridable so tests can point at a mock server.
    pub base_url: String,
}

impl Default for ForumSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sub_channels: vec![
                "sysadmin".to_string(),
                "msp".to_string(),
                "vmware".to_string(),
            ],
            rate_per_sec: 0.5,
            min_upvotes: 3,
            min_comments: 3,
            window_hours: 24,
            fallback_window_hours: 168,
            fallback_threshold: 20,
            base_url: "https://www.reddit.com".to_string(),
        }
    }
}

/// Web-search source options. Queries may carry a `{year}` token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SearchSourceConfig {
    pub enabled: bool,
    pub queries: Vec<String>,
    pub results_per_query: usize,
    pub date_restriction: String,
    pub rate_per_sec: f64,
    pub base_url: String,
}

impl Default for SearchSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queries: vec![
                "enterprise software price increase {year}".to_string(),
                "vendor licensing change {year}".to_string(),
            ],
            results_per_query: 10,
            date_restriction: "d7".to_string(),
            rate_per_sec: 1.0,
            base_url: "https://www.googleapis.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SourcesConfig {
    pub forum: ForumSourceConfig,
    pub search: SearchSourceConfig,
}

/// LLM synthesis options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LlmConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_sec: u64,
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 2000,
            temperature: 0.2,
            timeout_sec: 90,
            base_url: "https://api.openai.com".to_string(),
        }
    }
}

/// Report and artifact options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ReportConfig {
    pub excerpt_max_chars: usize,
    pub vendor_top_n: usize,
    pub output_dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            excerpt_max_chars: 500,
            vendor_top_n: 20,
            output_dir: PathBuf::from("output"),
        }
    }
}

/// Run-level timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RunConfig {
    pub global_timeout_sec: u64,
    pub per_source_timeout_sec: u64,
    pub request_timeout_sec: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            global_timeout_sec: 600,
            per_source_timeout_sec: 120,
            request_timeout_sec: 30,
        }
    }
}

/// Optional HTTP response cache options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_hours: u64,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_hours: 6,
            capacity: 1024,
        }
    }
}

/// The single typed configuration structure for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AppConfig {
    pub sources: SourcesConfig,
    pub scoring: ScoringConfig,
    pub selector: SelectorConfig,
    pub llm: LlmConfig,
    pub report: ReportConfig,
    pub run: RunConfig,
    pub cache: CacheConfig,
    pub vendor_dictionary_path: PathBuf,
    pub keywords_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sources: SourcesConfig::default(),
            scoring: ScoringConfig::default(),
            selector: SelectorConfig::default(),
            llm: LlmConfig::default(),
            report: ReportConfig::default(),
            run: RunConfig::default(),
            cache: CacheConfig::default(),
            vendor_dictionary_path: PathBuf::from("data/vendors.json"),
            keywords_path: PathBuf::from("data/keywords.json"),
        }
    }
}

impl AppConfig {
    /// Load from a JSON file. Unknown fields anywhere in the tree are
    /// a [`ConfigError`].
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Pretty JSON for `print-config`; the structure carries no secrets.
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Secrets resolved from the environment, never from the config file.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub forum_user_agent: String,
    pub search_api_key: String,
    pub search_engine_id: String,
    pub llm_api_key: String,
}

/// Logging and profile options resolved alongside credentials.
#[derive(Debug, Clone)]
pub struct RuntimeEnv {
    pub profile: String,
    pub log_level: String,
    pub log_format: String,
    pub credentials: Credentials,
}

fn default_profile() -> String {
    "local".to_string()
}

/// Loads the environment side of configuration using layered `.env`
/// files and `PRICEWATCH_*` variables.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn load(&self) -> Result<RuntimeEnv, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("PRICEWATCH_") {
                layered.insert(stripped.to_string(), value);
            }
        }

        let mut take = |key: &str| layered.remove(key).filter(|v| !v.is_empty());

        let profile = take("PROFILE").unwrap_or(profile_hint);
        let log_level = take("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let log_format = take("LOG_FORMAT").unwrap_or_else(|| "json".to_string());
        let credentials = Credentials {
            forum_user_agent: take("FORUM_USER_AGENT")
                .unwrap_or_else(|| format!("pricewatch/{}", env!("CARGO_PKG_VERSION"))),
            search_api_key: take("SEARCH_API_KEY").unwrap_or_default(),
            search_engine_id: take("SEARCH_ENGINE_ID").unwrap_or_default(),
            llm_api_key: take("LLM_API_KEY").unwrap_or_default(),
        };

        Ok(RuntimeEnv {
            profile,
            log_level,
            log_format,
            credentials,
        })
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("PRICEWATCH_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix("PRICEWATCH_") {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
