//! Configuration management for LeadScout hosts.
//!
//! Three-layer loading:
//! 1. Built-in defaults
//! 2. TOML config file
//! 3. Environment variable overrides (`LEADSCOUT_` prefix, double
//!    underscores separating nested keys)
//!
//! The pipeline core itself never reads the environment: hosts load a
//! [`Config`], validate it, and hand the orchestrator a fully-resolved
//! [`RunOptions`] plus constructed adapters.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pipeline::{DiscoveryMode, RunOptions, StageTimeouts, UnitCosts};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Third-party service endpoints and credentials.
    #[serde(default)]
    pub adapters: AdapterConfig,

    /// Stage 1/2 discovery tuning.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Stage 3 ranking tuning.
    #[serde(default)]
    pub ranking: RankingConfig,

    /// Cost ceiling and unit costs.
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Stage-level timeouts.
    #[serde(default)]
    pub timeouts: StageTimeouts,

    /// Adapter retry policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Directory for per-run stage artifacts.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: String,
}

/// Endpoints and credentials for the five services.
///
/// Credentials are opaque strings supplied by the host environment.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AdapterConfig {
    /// Dataset-filter API base URL.
    #[serde(default)]
    pub dataset_base_url: String,
    /// Dataset-filter API token.
    #[serde(default)]
    pub dataset_api_token: String,
    /// Dataset id to filter.
    #[serde(default)]
    pub dataset_id: String,
    /// Web-search API base URL.
    #[serde(default)]
    pub search_base_url: String,
    /// Web-search API key.
    #[serde(default)]
    pub search_api_key: String,
    /// Profile-scraper API base URL.
    #[serde(default)]
    pub scraper_base_url: String,
    /// Profile-scraper API token.
    #[serde(default)]
    pub scraper_api_token: String,
    /// Generative-text API base URL (OpenAI-compatible).
    #[serde(default)]
    pub genai_base_url: String,
    /// Generative-text API key.
    #[serde(default)]
    pub genai_api_key: String,
    /// Generative model name.
    #[serde(default)]
    pub genai_model: String,
    /// CRM REST base URL.
    #[serde(default)]
    pub crm_base_url: String,
    /// CRM API token.
    #[serde(default)]
    pub crm_api_token: String,
}

/// Stage 1/2 discovery settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Stage 1 strategy: "dataset", "search", or "combined".
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Minimum connection count.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Whether Stage 2 applies the location filter.
    #[serde(default)]
    pub use_location_filter: bool,

    /// Hard cap on dataset result count before download is refused.
    #[serde(default = "default_dataset_result_cap")]
    pub dataset_result_cap: u64,

    /// Maximum (variant, title) search queries per run.
    #[serde(default = "default_search_query_budget")]
    pub search_query_budget: usize,

    /// Results requested per search query.
    #[serde(default = "default_search_top_k")]
    pub search_top_k: u32,

    /// Concurrent per-URL scrapes for non-batch scrapers.
    #[serde(default = "default_max_scrape_concurrency")]
    pub max_scrape_concurrency: usize,

    /// Host prefix identifying profile URLs.
    #[serde(default = "default_profile_host")]
    pub profile_host: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            min_connections: default_min_connections(),
            use_location_filter: false,
            dataset_result_cap: default_dataset_result_cap(),
            search_query_budget: default_search_query_budget(),
            search_top_k: default_search_top_k(),
            max_scrape_concurrency: default_max_scrape_concurrency(),
            profile_host: default_profile_host(),
        }
    }
}

/// Stage 3 ranking settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RankingConfig {
    /// Minimum ranking score to qualify (inclusive).
    #[serde(default = "default_min_score")]
    pub min_score: u8,

    /// Maximum qualified prospects per run.
    #[serde(default = "default_max_prospects")]
    pub max_prospects: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            max_prospects: default_max_prospects(),
        }
    }
}

/// Cost ceiling and unit costs, currency-neutral.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BudgetConfig {
    /// Per-run cost ceiling.
    #[serde(default = "default_cost_ceiling")]
    pub cost_ceiling: f64,

    /// Unit costs per chargeable adapter call.
    #[serde(default)]
    pub unit_costs: UnitCosts,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            cost_ceiling: default_cost_ceiling(),
            unit_costs: UnitCosts::default(),
        }
    }
}

/// Adapter retry settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Attempts per adapter call (first try included).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay, milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff ceiling, milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Per-request read timeout, seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// --- Default value functions for serde ---

fn default_mode() -> String {
    "dataset".to_string()
}
fn default_min_connections() -> u32 {
    10
}
fn default_dataset_result_cap() -> u64 {
    75
}
fn default_search_query_budget() -> usize {
    30
}
fn default_search_top_k() -> u32 {
    10
}
fn default_max_scrape_concurrency() -> usize {
    5
}
fn default_profile_host() -> String {
    "linkedin.com/in".to_string()
}
fn default_min_score() -> u8 {
    65
}
fn default_max_prospects() -> usize {
    10
}
fn default_cost_ceiling() -> f64 {
    500.0
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_artifacts_dir() -> String {
    "./leadscout-artifacts".to_string()
}

impl Config {
    /// Load configuration from a TOML file with environment overrides.
    ///
    /// An explicit path (argument or `LEADSCOUT_CONFIG`) must exist; the
    /// default path falls back to built-in defaults when absent.
    pub fn load(config_path: Option<&str>) -> Result<Config, ConfigError> {
        let (path, explicit) = Self::resolve_config_path(config_path);

        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str::<Config>(&contents)
                .map_err(|e| ConfigError::ParseError { source: e })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if explicit {
                    return Err(ConfigError::FileNotFound {
                        path: path.display().to_string(),
                    });
                }
                Config::default()
            }
            Err(_) => {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load and validate, returning all validation errors at once.
    pub fn load_and_validate(config_path: Option<&str>) -> Result<Config, Vec<ConfigError>> {
        let config = Config::load(config_path).map_err(|e| vec![e])?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, returning every error found.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.discovery.mode.parse::<DiscoveryMode>().is_err() {
            errors.push(ConfigError::InvalidValue {
                field: "discovery.mode".to_string(),
                message: "must be dataset, search, or combined".to_string(),
            });
        }

        let needs_dataset = self.discovery.mode != "search";
        let needs_search = self.discovery.mode != "dataset";

        if needs_dataset {
            for (field, value) in [
                ("adapters.dataset_base_url", &self.adapters.dataset_base_url),
                ("adapters.dataset_api_token", &self.adapters.dataset_api_token),
                ("adapters.dataset_id", &self.adapters.dataset_id),
            ] {
                if value.is_empty() {
                    errors.push(ConfigError::MissingField {
                        field: field.to_string(),
                    });
                }
            }
        }

        if needs_search {
            for (field, value) in [
                ("adapters.search_base_url", &self.adapters.search_base_url),
                ("adapters.search_api_key", &self.adapters.search_api_key),
            ] {
                if value.is_empty() {
                    errors.push(ConfigError::MissingField {
                        field: field.to_string(),
                    });
                }
            }
        }

        for (field, value) in [
            ("adapters.genai_base_url", &self.adapters.genai_base_url),
            ("adapters.genai_api_key", &self.adapters.genai_api_key),
            ("adapters.genai_model", &self.adapters.genai_model),
        ] {
            if value.is_empty() {
                errors.push(ConfigError::MissingField {
                    field: field.to_string(),
                });
            }
        }

        if self.ranking.min_score > 100 {
            errors.push(ConfigError::InvalidValue {
                field: "ranking.min_score".to_string(),
                message: "must be between 0 and 100".to_string(),
            });
        }
        if self.ranking.max_prospects == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "ranking.max_prospects".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.discovery.dataset_result_cap == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "discovery.dataset_result_cap".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.budget.cost_ceiling <= 0.0 {
            errors.push(ConfigError::InvalidValue {
                field: "budget.cost_ceiling".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "retry.max_attempts".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Derive the orchestrator options from this configuration.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            mode: self
                .discovery
                .mode
                .parse()
                .unwrap_or(DiscoveryMode::Dataset),
            min_score: self.ranking.min_score,
            max_prospects: self.ranking.max_prospects,
            cost_ceiling: self.budget.cost_ceiling,
            min_connections: self.discovery.min_connections,
            use_location_filter: self.discovery.use_location_filter,
            dataset_result_cap: self.discovery.dataset_result_cap,
            search_query_budget: self.discovery.search_query_budget,
            search_top_k: self.discovery.search_top_k,
            max_scrape_concurrency: self.discovery.max_scrape_concurrency,
            profile_host: self.discovery.profile_host.clone(),
            timeouts: self.timeouts.clone(),
            unit_costs: self.budget.unit_costs.clone(),
            ..RunOptions::default()
        }
    }

    fn resolve_config_path(config_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(path) = config_path {
            return (PathBuf::from(path), true);
        }
        if let Ok(env_path) = env::var("LEADSCOUT_CONFIG") {
            return (PathBuf::from(env_path), true);
        }
        (PathBuf::from("leadscout.toml"), false)
    }

    /// Apply `LEADSCOUT_` environment overrides.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        // Adapters
        if let Ok(val) = env::var("LEADSCOUT_ADAPTERS__DATASET_BASE_URL") {
            self.adapters.dataset_base_url = val;
        }
        if let Ok(val) = env::var("LEADSCOUT_ADAPTERS__DATASET_API_TOKEN") {
            self.adapters.dataset_api_token = val;
        }
        if let Ok(val) = env::var("LEADSCOUT_ADAPTERS__DATASET_ID") {
            self.adapters.dataset_id = val;
        }
        if let Ok(val) = env::var("LEADSCOUT_ADAPTERS__SEARCH_BASE_URL") {
            self.adapters.search_base_url = val;
        }
        if let Ok(val) = env::var("LEADSCOUT_ADAPTERS__SEARCH_API_KEY") {
            self.adapters.search_api_key = val;
        }
        if let Ok(val) = env::var("LEADSCOUT_ADAPTERS__SCRAPER_BASE_URL") {
            self.adapters.scraper_base_url = val;
        }
        if let Ok(val) = env::var("LEADSCOUT_ADAPTERS__SCRAPER_API_TOKEN") {
            self.adapters.scraper_api_token = val;
        }
        if let Ok(val) = env::var("LEADSCOUT_ADAPTERS__GENAI_BASE_URL") {
            self.adapters.genai_base_url = val;
        }
        if let Ok(val) = env::var("LEADSCOUT_ADAPTERS__GENAI_API_KEY") {
            self.adapters.genai_api_key = val;
        }
        if let Ok(val) = env::var("LEADSCOUT_ADAPTERS__GENAI_MODEL") {
            self.adapters.genai_model = val;
        }
        if let Ok(val) = env::var("LEADSCOUT_ADAPTERS__CRM_BASE_URL") {
            self.adapters.crm_base_url = val;
        }
        if let Ok(val) = env::var("LEADSCOUT_ADAPTERS__CRM_API_TOKEN") {
            self.adapters.crm_api_token = val;
        }

        // Discovery
        if let Ok(val) = env::var("LEADSCOUT_DISCOVERY__MODE") {
            self.discovery.mode = val;
        }
        if let Ok(val) = env::var("LEADSCOUT_DISCOVERY__MIN_CONNECTIONS") {
            self.discovery.min_connections =
                parse_env_u32("LEADSCOUT_DISCOVERY__MIN_CONNECTIONS", &val)?;
        }
        if let Ok(val) = env::var("LEADSCOUT_DISCOVERY__USE_LOCATION_FILTER") {
            self.discovery.use_location_filter =
                parse_env_bool("LEADSCOUT_DISCOVERY__USE_LOCATION_FILTER", &val)?;
        }
        if let Ok(val) = env::var("LEADSCOUT_DISCOVERY__DATASET_RESULT_CAP") {
            self.discovery.dataset_result_cap =
                parse_env_u64("LEADSCOUT_DISCOVERY__DATASET_RESULT_CAP", &val)?;
        }

        // Ranking
        if let Ok(val) = env::var("LEADSCOUT_RANKING__MIN_SCORE") {
            self.ranking.min_score = parse_env_u8("LEADSCOUT_RANKING__MIN_SCORE", &val)?;
        }
        if let Ok(val) = env::var("LEADSCOUT_RANKING__MAX_PROSPECTS") {
            self.ranking.max_prospects =
                parse_env_u32("LEADSCOUT_RANKING__MAX_PROSPECTS", &val)? as usize;
        }

        // Budget
        if let Ok(val) = env::var("LEADSCOUT_BUDGET__COST_CEILING") {
            self.budget.cost_ceiling = parse_env_f64("LEADSCOUT_BUDGET__COST_CEILING", &val)?;
        }

        // Artifacts
        if let Ok(val) = env::var("LEADSCOUT_ARTIFACTS_DIR") {
            self.artifacts_dir = val;
        }

        Ok(())
    }
}

/// Parse an environment variable value as `u8`.
fn parse_env_u8(var_name: &str, val: &str) -> Result<u8, ConfigError> {
    val.parse::<u8>().map_err(|_| ConfigError::InvalidValue {
        field: var_name.to_string(),
        message: format!("'{val}' is not a valid u8"),
    })
}

/// Parse an environment variable value as `u32`.
fn parse_env_u32(var_name: &str, val: &str) -> Result<u32, ConfigError> {
    val.parse::<u32>().map_err(|_| ConfigError::InvalidValue {
        field: var_name.to_string(),
        message: format!("'{val}' is not a valid u32"),
    })
}

/// Parse an environment variable value as `u64`.
fn parse_env_u64(var_name: &str, val: &str) -> Result<u64, ConfigError> {
    val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
        field: var_name.to_string(),
        message: format!("'{val}' is not a valid u64"),
    })
}

/// Parse an environment variable value as `f64`.
fn parse_env_f64(var_name: &str, val: &str) -> Result<f64, ConfigError> {
    val.parse::<f64>().map_err(|_| ConfigError::InvalidValue {
        field: var_name.to_string(),
        message: format!("'{val}' is not a valid number"),
    })
}

/// Parse an environment variable value as a boolean.
///
/// Accepts: `true`, `false`, `1`, `0`, `yes`, `no` (case-insensitive).
fn parse_env_bool(var_name: &str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: var_name.to_string(),
            message: format!("'{val}' is not a valid boolean (use true/false/1/0/yes/no)"),
        }),
    }
}
