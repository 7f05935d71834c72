//! Dataset-filter adapter.
//!
//! Wraps a pre-indexed professional-profile dataset behind its snapshot
//! lifecycle: submit a boolean filter, poll until the snapshot is ready,
//! then download the matching records as JSON. The advertised result
//! count is checked against a hard cap *before* download so an overly
//! broad filter never turns into a large download bill.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
use crate::model::{canonical_profile_url, ExperienceEntry, Profile};

use super::http::{self, RetryPolicy};
use super::DatasetFilter;

/// Grouping operator for a filter node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupOp {
    /// All child filters must match.
    And,
    /// Any child filter may match.
    Or,
}

/// Comparison operator for a field clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClauseOp {
    /// Case-insensitive substring match.
    #[serde(rename = "includes")]
    Includes,
    /// Negated substring match.
    #[serde(rename = "not_includes")]
    NotIncludes,
    /// Numeric greater-or-equal.
    #[serde(rename = ">=")]
    AtLeast,
}

/// A boolean filter expression over dataset fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterExpr {
    /// A group of sub-filters combined with one operator.
    Group {
        /// The combining operator.
        operator: GroupOp,
        /// The sub-filters.
        filters: Vec<FilterExpr>,
    },
    /// A single field comparison.
    Clause {
        /// The dataset field name.
        name: String,
        /// The comparison value.
        value: serde_json::Value,
        /// The comparison operator.
        operator: ClauseOp,
    },
}

impl FilterExpr {
    /// All sub-filters must match.
    pub fn and(filters: Vec<FilterExpr>) -> Self {
        FilterExpr::Group {
            operator: GroupOp::And,
            filters,
        }
    }

    /// Any sub-filter may match.
    pub fn or(filters: Vec<FilterExpr>) -> Self {
        FilterExpr::Group {
            operator: GroupOp::Or,
            filters,
        }
    }

    /// Substring clause.
    pub fn includes(name: &str, value: &str) -> Self {
        FilterExpr::Clause {
            name: name.to_string(),
            value: serde_json::Value::String(value.to_string()),
            operator: ClauseOp::Includes,
        }
    }

    /// Negated substring clause.
    pub fn not_includes(name: &str, value: &str) -> Self {
        FilterExpr::Clause {
            name: name.to_string(),
            value: serde_json::Value::String(value.to_string()),
            operator: ClauseOp::NotIncludes,
        }
    }

    /// Numeric floor clause.
    pub fn at_least(name: &str, value: u64) -> Self {
        FilterExpr::Clause {
            name: name.to_string(),
            value: serde_json::Value::from(value),
            operator: ClauseOp::AtLeast,
        }
    }
}

/// Snapshot progress as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotStatus {
    /// Accepted but not yet running.
    Scheduled,
    /// Filter is executing.
    Building,
    /// Results are ready; `result_count` is the advertised record count.
    Ready {
        /// Advertised number of matching records.
        result_count: u64,
    },
    /// The filter failed server-side.
    Failed {
        /// The reported failure reason.
        reason: String,
    },
}

/// One downloaded dataset record: the profile plus its canonical URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    /// Canonical profile URL.
    pub url: String,
    /// The profile data carried by the record.
    pub profile: Profile,
}

/// HTTP client for the dataset-filter service.
pub struct DatasetHttpClient {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
    dataset_id: String,
    retry: RetryPolicy,
    warmup_attempts: u32,
    warmup_delay: Duration,
}

impl DatasetHttpClient {
    /// Create a client for the given service endpoint and dataset.
    pub fn new(
        base_url: String,
        api_token: String,
        dataset_id: String,
        retry: RetryPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client: http::build_client(request_timeout),
            base_url,
            api_token,
            dataset_id,
            retry,
            warmup_attempts: 10,
            warmup_delay: Duration::from_secs(5),
        }
    }

    /// Override the download warm-up schedule (shortened in tests).
    pub fn with_warmup(mut self, attempts: u32, delay: Duration) -> Self {
        self.warmup_attempts = attempts;
        self.warmup_delay = delay;
        self
    }

    fn snapshot_url(&self, snapshot_id: &str) -> String {
        format!("{}/snapshots/{snapshot_id}", self.base_url)
    }

    /// One raw download attempt; distinguishes "endpoint not yet warm"
    /// from a real parse failure by the still-building sentinel body.
    async fn download_once(&self, snapshot_id: &str) -> Result<Vec<DatasetProfile>, AdapterError> {
        let url = format!("{}/download?format=json", self.snapshot_url(snapshot_id));
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| http::map_transport_error(&e))?;

        if !response.status().is_success() {
            return Err(http::map_error_response(response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| http::map_transport_error(&e))?;

        if body.len() < 200 && body.to_lowercase().contains("building") {
            return Err(AdapterError::Transport {
                message: "download endpoint still building".to_string(),
            });
        }

        let records: Vec<DatasetRecord> = serde_json::from_str(&body)
            .map_err(|e| AdapterError::Parse(format!("dataset download: {e}")))?;

        Ok(records
            .into_iter()
            .filter_map(DatasetRecord::into_profile)
            .collect())
    }
}

#[async_trait::async_trait]
impl DatasetFilter for DatasetHttpClient {
    async fn submit(&self, filter: &FilterExpr) -> Result<String, AdapterError> {
        let payload = SubmitRequest {
            dataset_id: &self.dataset_id,
            filter,
        };

        tracing::debug!(dataset_id = %self.dataset_id, "submitting dataset filter");

        let response = http::with_retries(&self.retry, "dataset.submit", || async {
            let response = self
                .client
                .post(format!("{}/filter", self.base_url))
                .bearer_auth(&self.api_token)
                .json(&payload)
                .send()
                .await
                .map_err(|e| http::map_transport_error(&e))?;
            if !response.status().is_success() {
                return Err(http::map_error_response(response).await);
            }
            response
                .json::<SubmitResponse>()
                .await
                .map_err(|e| AdapterError::Parse(format!("dataset submit: {e}")))
        })
        .await?;

        if response.snapshot_id.is_empty() {
            return Err(AdapterError::Parse(
                "dataset submit: no snapshot_id in response".to_string(),
            ));
        }

        tracing::info!(snapshot_id = %response.snapshot_id, "dataset snapshot created");
        Ok(response.snapshot_id)
    }

    async fn poll(&self, snapshot_id: &str) -> Result<SnapshotStatus, AdapterError> {
        let info = http::with_retries(&self.retry, "dataset.poll", || async {
            let response = self
                .client
                .get(self.snapshot_url(snapshot_id))
                .bearer_auth(&self.api_token)
                .send()
                .await
                .map_err(|e| http::map_transport_error(&e))?;
            if !response.status().is_success() {
                return Err(http::map_error_response(response).await);
            }
            response
                .json::<SnapshotInfo>()
                .await
                .map_err(|e| AdapterError::Parse(format!("dataset poll: {e}")))
        })
        .await?;

        let status = match info.status.as_str() {
            "ready" => SnapshotStatus::Ready {
                result_count: info.dataset_size.unwrap_or(0),
            },
            "failed" => SnapshotStatus::Failed {
                reason: info.warning.unwrap_or_else(|| "unknown".to_string()),
            },
            "scheduled" => SnapshotStatus::Scheduled,
            "building" => SnapshotStatus::Building,
            other => {
                tracing::warn!(status = other, "unknown snapshot status, treating as building");
                SnapshotStatus::Building
            }
        };
        Ok(status)
    }

    async fn download(&self, snapshot_id: &str) -> Result<Vec<DatasetProfile>, AdapterError> {
        let mut last_err = AdapterError::Transport {
            message: "download never attempted".to_string(),
        };
        for attempt in 0..self.warmup_attempts {
            match self.download_once(snapshot_id).await {
                Ok(profiles) => {
                    tracing::info!(
                        snapshot_id,
                        profiles = profiles.len(),
                        "dataset download complete",
                    );
                    return Ok(profiles);
                }
                Err(err @ (AdapterError::Transport { .. } | AdapterError::Parse(_))) => {
                    tracing::debug!(
                        snapshot_id,
                        attempt,
                        error = %err,
                        "dataset download not ready, retrying",
                    );
                    last_err = err;
                    tokio::time::sleep(self.warmup_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
        Err(AdapterError::Transport {
            message: format!(
                "dataset download failed after {} attempts: {last_err}",
                self.warmup_attempts
            ),
        })
    }
}

// --- Internal Serde types ---

#[derive(Serialize)]
struct SubmitRequest<'a> {
    dataset_id: &'a str,
    filter: &'a FilterExpr,
}

#[derive(Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    snapshot_id: String,
}

#[derive(Deserialize)]
struct SnapshotInfo {
    #[serde(default)]
    status: String,
    #[serde(default)]
    dataset_size: Option<u64>,
    #[serde(default)]
    warning: Option<String>,
}

/// A raw dataset record. The service reports the current position as
/// flat fields alongside the profile identity.
#[derive(Deserialize)]
struct DatasetRecord {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    headline: Option<String>,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    current_company_name: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    connections: Option<u32>,
    #[serde(default)]
    followers: Option<u32>,
    #[serde(default)]
    about: Option<String>,
    #[serde(default)]
    experience_company: Option<String>,
    #[serde(default)]
    experience_title: Option<String>,
    #[serde(default)]
    experience_location: Option<String>,
    #[serde(default)]
    experience_start_date: Option<String>,
    #[serde(default)]
    experience_end_date: Option<String>,
}

impl DatasetRecord {
    /// Records without a URL cannot be keyed and are dropped.
    fn into_profile(self) -> Option<DatasetProfile> {
        let url = canonical_profile_url(self.url.as_deref()?.trim());
        if url.is_empty() {
            return None;
        }

        let experience = if self.experience_company.is_some() || self.experience_title.is_some() {
            vec![ExperienceEntry {
                title: self.experience_title,
                company: self.experience_company,
                location: self.experience_location,
                start_date: self.experience_start_date,
                end_date: self.experience_end_date,
            }]
        } else {
            Vec::new()
        };

        let location = self.city.clone().or_else(|| self.country.clone());

        let profile = Profile {
            full_name: self.name,
            first_name: self.first_name,
            last_name: self.last_name,
            headline: self.headline,
            job_title: self.position,
            employer: self.current_company_name,
            location,
            city: self.city,
            country: self.country,
            connections: self.connections,
            followers: self.followers,
            summary: self.about,
            experience,
            education: Vec::new(),
            skills: Vec::new(),
        }
        .with_current_role_derived();

        Some(DatasetProfile { url, profile })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> DatasetHttpClient {
        DatasetHttpClient::new(
            server.uri(),
            "test-token".to_string(),
            "ds_profiles".to_string(),
            RetryPolicy {
                max_attempts: 2,
                base_delay_ms: 1,
                max_delay_ms: 2,
            },
            Duration::from_secs(5),
        )
        .with_warmup(3, Duration::from_millis(1))
    }

    #[test]
    fn filter_expr_serializes_to_service_shape() {
        let filter = FilterExpr::and(vec![
            FilterExpr::or(vec![
                FilterExpr::includes("current_company_name", "Benefis"),
                FilterExpr::includes("current_company_name", "Benefis Health System"),
            ]),
            FilterExpr::not_includes("position", "intern"),
            FilterExpr::at_least("connections", 10),
        ]);

        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(json["operator"], "and");
        assert_eq!(json["filters"][0]["operator"], "or");
        assert_eq!(
            json["filters"][0]["filters"][0]["name"],
            "current_company_name"
        );
        assert_eq!(json["filters"][1]["operator"], "not_includes");
        assert_eq!(json["filters"][2]["operator"], ">=");
        assert_eq!(json["filters"][2]["value"], 10);
    }

    #[tokio::test]
    async fn submit_returns_snapshot_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/filter"))
            .and(header("Authorization", "Bearer test-token"))
            .and(body_partial_json(serde_json::json!({
                "dataset_id": "ds_profiles"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"snapshot_id": "snap_1"})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server);
        let filter = FilterExpr::includes("current_company_name", "Benefis");
        let id = client.submit(&filter).await.unwrap();
        assert_eq!(id, "snap_1");
    }

    #[tokio::test]
    async fn submit_without_snapshot_id_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/filter"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let filter = FilterExpr::includes("current_company_name", "Benefis");
        let err = client.submit(&filter).await.unwrap_err();
        assert!(matches!(err, AdapterError::Parse(_)));
    }

    #[tokio::test]
    async fn poll_maps_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/snapshots/snap_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ready",
                "dataset_size": 12
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let status = client.poll("snap_1").await.unwrap();
        assert_eq!(status, SnapshotStatus::Ready { result_count: 12 });
    }

    #[tokio::test]
    async fn poll_maps_failed_with_reason() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/snapshots/snap_2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "failed",
                "warning": "filter too broad"
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let status = client.poll("snap_2").await.unwrap();
        assert_eq!(
            status,
            SnapshotStatus::Failed {
                reason: "filter too broad".to_string()
            }
        );
    }

    #[tokio::test]
    async fn download_maps_records_to_profiles() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/snapshots/snap_1/download"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "url": "https://www.linkedin.com/in/Jane-Doe?trk=x",
                    "name": "Jane Doe",
                    "first_name": "Jane",
                    "last_name": "Doe",
                    "position": "Director of Facilities",
                    "current_company_name": "Benefis Health System",
                    "city": "Great Falls",
                    "connections": 500,
                    "experience_company": "Benefis Health System",
                    "experience_title": "Director of Facilities",
                    "experience_start_date": "2019"
                },
                {"name": "No Url"}
            ])))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let profiles = client.download("snap_1").await.unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].url, "https://linkedin.com/in/jane-doe");
        assert_eq!(
            profiles[0].profile.employer.as_deref(),
            Some("Benefis Health System")
        );
        assert_eq!(profiles[0].profile.connections, Some(500));
        assert_eq!(profiles[0].profile.experience.len(), 1);
    }

    #[tokio::test]
    async fn download_retries_while_endpoint_warms_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/snapshots/snap_1/download"))
            .respond_with(ResponseTemplate::new(200).set_body_string("snapshot is building"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/snapshots/snap_1/download"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"url": "https://linkedin.com/in/jane-doe", "name": "Jane Doe"}
            ])))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let profiles = client.download("snap_1").await.unwrap();
        assert_eq!(profiles.len(), 1);
    }

    #[tokio::test]
    async fn download_gives_up_after_warmup_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/snapshots/snap_1/download"))
            .respond_with(ResponseTemplate::new(200).set_body_string("still building"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.download("snap_1").await.unwrap_err();
        match err {
            AdapterError::Transport { message } => {
                assert!(message.contains("after 3 attempts"));
            }
            other => panic!("expected Transport, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_429_maps_to_rate_limited_then_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/filter"))
            .respond_with(ResponseTemplate::new(429).append_header("retry-after", "0"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let filter = FilterExpr::includes("current_company_name", "Benefis");
        let err = client.submit(&filter).await.unwrap_err();
        assert!(matches!(err, AdapterError::Transport { .. }));
    }
}
