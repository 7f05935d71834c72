//! Typed clients for the five third-party services the pipeline composes.
//!
//! Each adapter wraps exactly one service behind a narrow trait so the
//! stages can be driven by stubs in tests. The reqwest implementations
//! share one retry/backoff policy ([`http`]) and are side-effect-free
//! from the pipeline's perspective; only the pending-update sink
//! (defined with Stage 4) performs writes.

pub mod crm;
pub mod dataset;
pub mod genai;
pub mod http;
pub mod scraper;
pub mod search;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
use crate::model::Profile;

pub use crm::CrmHttpClient;
pub use dataset::{DatasetHttpClient, DatasetProfile, FilterExpr, SnapshotStatus};
pub use genai::GenAiHttpClient;
pub use http::RetryPolicy;
pub use scraper::ScraperHttpClient;
pub use search::SearchHttpClient;

/// A pre-indexed profile dataset that answers structured boolean filters
/// through a submit / poll / download snapshot lifecycle.
#[async_trait::async_trait]
pub trait DatasetFilter: Send + Sync {
    /// Submit a filter, returning the snapshot handle.
    async fn submit(&self, filter: &FilterExpr) -> Result<String, AdapterError>;

    /// Check snapshot progress.
    async fn poll(&self, snapshot_id: &str) -> Result<SnapshotStatus, AdapterError>;

    /// Download the records of a ready snapshot.
    ///
    /// May race the status endpoint: implementations retry briefly when
    /// the download endpoint is not yet warm.
    async fn download(&self, snapshot_id: &str) -> Result<Vec<DatasetProfile>, AdapterError>;
}

/// One web-search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Result title.
    pub title: String,
    /// Result snippet.
    pub snippet: String,
    /// Result URL, as returned (not yet canonicalized).
    pub url: String,
    /// 1-based rank within the query.
    pub rank: u32,
}

/// A web-search engine used for site-restricted profile queries.
#[async_trait::async_trait]
pub trait WebSearch: Send + Sync {
    /// Run one query, returning at most `top_k` results.
    async fn query(&self, q: &str, top_k: u32) -> Result<Vec<SearchHit>, AdapterError>;
}

/// Per-URL scrape outcomes, keyed by the requested URL so callers can
/// correlate; a failed URL carries its failure message.
pub type ScrapeOutcomes = BTreeMap<String, Result<Profile, String>>;

/// A profile scraper that resolves profile URLs to full profile data.
#[async_trait::async_trait]
pub trait ProfileScraper: Send + Sync {
    /// Whether one call accepts a batch of URLs. Implementations that
    /// return `false` are fanned out per-URL by the enrich stage, bounded
    /// by its scrape-concurrency option.
    fn supports_batch(&self) -> bool {
        true
    }

    /// Scrape the given URLs. Every requested URL appears in the result.
    async fn scrape(&self, urls: &[String]) -> Result<ScrapeOutcomes, AdapterError>;
}

/// A generative-text model constrained to JSON-object responses.
#[async_trait::async_trait]
pub trait GenerativeText: Send + Sync {
    /// Complete with the given prompts, returning the parsed JSON
    /// object. Responses that are not parseable JSON surface as
    /// [`AdapterError::Parse`] and are not retried.
    async fn complete_json(
        &self,
        system: &str,
        user: &str,
    ) -> Result<serde_json::Value, AdapterError>;
}

/// A CRM account record, as read by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Stable account id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Parent account id, if any.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Billing/primary city.
    #[serde(default)]
    pub city: Option<String>,
    /// Billing/primary state or region.
    #[serde(default)]
    pub state: Option<String>,
    /// Industry classification.
    #[serde(default)]
    pub industry: Option<String>,
}

/// Read-only CRM access used to resolve the input account.
#[async_trait::async_trait]
pub trait CrmReader: Send + Sync {
    /// Fetch an account by id.
    async fn get_account(&self, id: &str) -> Result<AccountRecord, AdapterError>;

    /// Fetch the display name of an account's parent, if it has one.
    async fn get_parent_name(&self, id: &str) -> Result<Option<String>, AdapterError>;
}
