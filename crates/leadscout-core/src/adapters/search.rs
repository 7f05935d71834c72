//! Web-search adapter.
//!
//! Wraps a JSON search API used for site-restricted profile queries.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AdapterError;

use super::http::{self, RetryPolicy};
use super::{SearchHit, WebSearch};

/// HTTP client for the web-search service.
pub struct SearchHttpClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl SearchHttpClient {
    /// Create a client for the given search endpoint.
    pub fn new(
        base_url: String,
        api_key: String,
        retry: RetryPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client: http::build_client(request_timeout),
            base_url,
            api_key,
            retry,
        }
    }
}

#[async_trait::async_trait]
impl WebSearch for SearchHttpClient {
    async fn query(&self, q: &str, top_k: u32) -> Result<Vec<SearchHit>, AdapterError> {
        tracing::debug!(query = %q, top_k, "web search");

        let request = SearchRequest { q, num: top_k };

        let response = http::with_retries(&self.retry, "search.query", || async {
            let response = self
                .client
                .post(format!("{}/search", self.base_url))
                .header("X-API-KEY", &self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| http::map_transport_error(&e))?;
            if !response.status().is_success() {
                return Err(http::map_error_response(response).await);
            }
            response
                .json::<SearchResponse>()
                .await
                .map_err(|e| AdapterError::Parse(format!("search response: {e}")))
        })
        .await?;

        let hits: Vec<SearchHit> = response
            .organic
            .into_iter()
            .filter(|r| !r.link.is_empty())
            .take(top_k as usize)
            .map(|r| SearchHit {
                title: r.title,
                snippet: r.snippet,
                url: r.link,
                rank: r.position,
            })
            .collect();

        tracing::debug!(query = %q, results = hits.len(), "web search completed");
        Ok(hits)
    }
}

// --- Internal Serde types ---

#[derive(Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    num: u32,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    position: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> SearchHttpClient {
        SearchHttpClient::new(
            server.uri(),
            "test-key".to_string(),
            RetryPolicy {
                max_attempts: 2,
                base_delay_ms: 1,
                max_delay_ms: 2,
            },
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn query_returns_ranked_hits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("X-API-KEY", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "q": "\"Benefis Health System\" CFO site:linkedin.com/in",
                "num": 10
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "organic": [
                    {
                        "title": "Jane Doe - CFO - Benefis Health System",
                        "snippet": "Chief Financial Officer at Benefis Health System",
                        "link": "https://www.linkedin.com/in/jane-doe",
                        "position": 1
                    },
                    {
                        "title": "No link result",
                        "snippet": "",
                        "link": "",
                        "position": 2
                    }
                ]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let hits = client
            .query("\"Benefis Health System\" CFO site:linkedin.com/in", 10)
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rank, 1);
        assert!(hits[0].url.contains("jane-doe"));
    }

    #[tokio::test]
    async fn query_truncates_to_top_k() {
        let server = MockServer::start().await;
        let results: Vec<_> = (1..=5)
            .map(|i| {
                serde_json::json!({
                    "title": format!("Result {i}"),
                    "snippet": "",
                    "link": format!("https://linkedin.com/in/person-{i}"),
                    "position": i
                })
            })
            .collect();
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"organic": results})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server);
        let hits = client.query("q", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn empty_results_are_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let hits = client.query("q", 10).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn error_403_maps_to_bad_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(403).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.query("q", 10).await.unwrap_err();
        assert!(matches!(
            err,
            AdapterError::BadResponse { status: 403, .. }
        ));
    }

    #[tokio::test]
    async fn error_500_retries_then_degrades_to_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.query("q", 10).await.unwrap_err();
        assert!(matches!(err, AdapterError::Transport { .. }));
    }
}
