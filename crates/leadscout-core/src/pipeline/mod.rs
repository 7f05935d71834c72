//! The four-stage discovery pipeline and its orchestrator.
//!
//! Stage functions are free-standing and independently callable so runs
//! can be resumed, replayed, and batch-tested: each consumes the
//! previous stage's output, returns whatever valid partial output it
//! produced, and records at most one terminal [`StageError`](crate::error::StageError).
//! Only the orchestrator mutates the run record.

pub mod acquire;
pub mod enrich;
pub mod orchestrate;
pub mod rank;
pub mod sink;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapters::{CrmReader, DatasetFilter, GenerativeText, ProfileScraper, WebSearch};
use crate::titles;

pub use orchestrate::Orchestrator;
pub use sink::PendingUpdateSink;

/// Which Stage 1 strategy a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMode {
    /// Filter the pre-indexed profile dataset.
    Dataset,
    /// Web-search for profile URLs.
    Search,
    /// Run both concurrently and merge.
    Combined,
}

impl std::str::FromStr for DiscoveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dataset" => Ok(DiscoveryMode::Dataset),
            "search" => Ok(DiscoveryMode::Search),
            "combined" => Ok(DiscoveryMode::Combined),
            other => Err(format!(
                "unknown mode '{other}' (use dataset, search, or combined)"
            )),
        }
    }
}

/// Stage-level timeouts, seconds. Stage 1 and 2 are dominated by
/// third-party polling; Stage 3 is a single generative call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimeouts {
    /// Stage 1 timeout.
    pub acquire_secs: u64,
    /// Stage 2 timeout.
    pub enrich_secs: u64,
    /// Stage 3 timeout.
    pub rank_secs: u64,
    /// Stage 4 timeout.
    pub sink_secs: u64,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            acquire_secs: 600,
            enrich_secs: 600,
            rank_secs: 120,
            sink_secs: 60,
        }
    }
}

/// Unit costs per chargeable adapter call, currency-neutral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitCosts {
    /// Per dataset record downloaded.
    pub dataset_record: f64,
    /// Per web-search query.
    pub search_query: f64,
    /// Per profile URL scraped.
    pub scrape_url: f64,
    /// Per generative completion.
    pub genai_call: f64,
    /// Per CRM read.
    pub crm_read: f64,
}

impl Default for UnitCosts {
    fn default() -> Self {
        Self {
            dataset_record: 0.5,
            search_query: 1.0,
            scrape_url: 2.0,
            genai_call: 2.0,
            crm_read: 0.1,
        }
    }
}

/// Per-run options. Every field has a default; hosts override what they
/// need. The core never reads the environment: everything arrives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Stage 1 strategy.
    pub mode: DiscoveryMode,
    /// Minimum ranking score to qualify (inclusive).
    pub min_score: u8,
    /// Maximum qualified prospects returned by Stage 3.
    pub max_prospects: usize,
    /// Per-run cost ceiling, currency-neutral units.
    pub cost_ceiling: f64,
    /// Minimum connection count (Stage 1 dataset filter and Stage 2).
    pub min_connections: u32,
    /// Whether Stage 2 applies the location filter.
    pub use_location_filter: bool,
    /// Hard cap on dataset result count before download is refused.
    pub dataset_result_cap: u64,
    /// Dataset snapshot poll interval, milliseconds.
    pub dataset_poll_interval_ms: u64,
    /// Bound on dataset snapshot polling, seconds.
    pub dataset_poll_timeout_secs: u64,
    /// Maximum number of (variant, title) search queries issued.
    pub search_query_budget: usize,
    /// Results requested per search query.
    pub search_top_k: u32,
    /// Concurrent per-URL scrapes when the scraper has no batch mode.
    pub max_scrape_concurrency: usize,
    /// Host prefix identifying profile URLs in search results.
    pub profile_host: String,
    /// Decision-maker titles, ordered by seniority (at most 20).
    pub target_titles: Vec<String>,
    /// Negative title keywords (token-level matching).
    pub negative_title_keywords: Vec<String>,
    /// Weak positive title keywords for the Stage 2 title filter.
    pub positive_title_keywords: Vec<String>,
    /// Stage-level timeouts.
    pub timeouts: StageTimeouts,
    /// Unit costs for the ledger.
    pub unit_costs: UnitCosts,
    /// When true, stop after Stage 3 and enqueue nothing.
    pub dry_run: bool,
    /// Run id override; resume paths reuse the original id.
    pub run_id: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: DiscoveryMode::Dataset,
            min_score: 65,
            max_prospects: 10,
            cost_ceiling: 500.0,
            min_connections: 10,
            use_location_filter: false,
            dataset_result_cap: 75,
            dataset_poll_interval_ms: 10_000,
            dataset_poll_timeout_secs: 300,
            search_query_budget: 30,
            search_top_k: 10,
            max_scrape_concurrency: 5,
            profile_host: "linkedin.com/in".to_string(),
            target_titles: titles::default_target_titles(),
            negative_title_keywords: titles::default_negative_title_keywords(),
            positive_title_keywords: titles::default_positive_title_keywords(),
            timeouts: StageTimeouts::default(),
            unit_costs: UnitCosts::default(),
            dry_run: false,
            run_id: None,
        }
    }
}

/// The adapter set a pipeline run is wired to.
///
/// Constructed once at orchestrator setup and passed explicitly; there
/// are no ambient service singletons.
#[derive(Clone)]
pub struct Adapters {
    /// Dataset-filter service.
    pub dataset: Arc<dyn DatasetFilter>,
    /// Web-search service.
    pub search: Arc<dyn WebSearch>,
    /// Profile-scraper service.
    pub scraper: Arc<dyn ProfileScraper>,
    /// Generative-text service.
    pub genai: Arc<dyn GenerativeText>,
    /// CRM reader.
    pub crm: Arc<dyn CrmReader>,
    /// Pending-update sink (the only side-effecting collaborator).
    pub sink: Arc<dyn PendingUpdateSink>,
}
