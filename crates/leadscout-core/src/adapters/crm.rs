//! CRM reader adapter.
//!
//! Read-only from the pipeline's perspective: the core fetches the
//! target account and its parent's name, nothing more. Write-back is
//! owned by the external approval system downstream of Stage 4.

use std::time::Duration;

use crate::error::AdapterError;

use super::http::{self, RetryPolicy};
use super::{AccountRecord, CrmReader};

/// HTTP client for the CRM's REST read API.
pub struct CrmHttpClient {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
    retry: RetryPolicy,
}

impl CrmHttpClient {
    /// Create a client for the given CRM endpoint.
    pub fn new(
        base_url: String,
        api_token: String,
        retry: RetryPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client: http::build_client(request_timeout),
            base_url,
            api_token,
            retry,
        }
    }

    async fn fetch_account(&self, id: &str) -> Result<AccountRecord, AdapterError> {
        http::with_retries(&self.retry, "crm.get_account", || async {
            let response = self
                .client
                .get(format!("{}/accounts/{id}", self.base_url))
                .bearer_auth(&self.api_token)
                .send()
                .await
                .map_err(|e| http::map_transport_error(&e))?;
            if !response.status().is_success() {
                return Err(http::map_error_response(response).await);
            }
            response
                .json::<AccountRecord>()
                .await
                .map_err(|e| AdapterError::Parse(format!("crm account: {e}")))
        })
        .await
    }
}

#[async_trait::async_trait]
impl CrmReader for CrmHttpClient {
    async fn get_account(&self, id: &str) -> Result<AccountRecord, AdapterError> {
        tracing::debug!(account_id = %id, "fetching CRM account");
        self.fetch_account(id).await
    }

    async fn get_parent_name(&self, id: &str) -> Result<Option<String>, AdapterError> {
        let account = self.fetch_account(id).await?;
        let Some(parent_id) = account.parent_id else {
            return Ok(None);
        };
        let parent = self.fetch_account(&parent_id).await?;
        Ok(Some(parent.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> CrmHttpClient {
        CrmHttpClient::new(
            server.uri(),
            "test-token".to_string(),
            RetryPolicy {
                max_attempts: 2,
                base_delay_ms: 1,
                max_delay_ms: 2,
            },
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn get_account_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/accounts/A1"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "A1",
                "name": "Benefis Hospitals Inc",
                "parent_id": "P1",
                "city": "Great Falls",
                "state": "Montana",
                "industry": "Healthcare"
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let account = client.get_account("A1").await.unwrap();
        assert_eq!(account.name, "Benefis Hospitals Inc");
        assert_eq!(account.parent_id.as_deref(), Some("P1"));
        assert_eq!(account.state.as_deref(), Some("Montana"));
    }

    #[tokio::test]
    async fn get_parent_name_follows_parent_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/accounts/A1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "A1",
                "name": "Benefis Hospitals Inc",
                "parent_id": "P1"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/accounts/P1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "P1",
                "name": "Benefis Health System"
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let parent = client.get_parent_name("A1").await.unwrap();
        assert_eq!(parent.as_deref(), Some("Benefis Health System"));
    }

    #[tokio::test]
    async fn get_parent_name_without_parent_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/accounts/A2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "A2",
                "name": "Standalone Clinic"
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let parent = client.get_parent_name("A2").await.unwrap();
        assert!(parent.is_none());
    }

    #[tokio::test]
    async fn missing_account_is_bad_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/accounts/NOPE"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.get_account("NOPE").await.unwrap_err();
        assert!(matches!(
            err,
            AdapterError::BadResponse { status: 404, .. }
        ));
    }
}
