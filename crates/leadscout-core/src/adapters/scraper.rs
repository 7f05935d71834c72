//! Profile-scraper adapter.
//!
//! Wraps a scraping-actor service: start a run for a batch of profile
//! URLs, poll the run until it settles, then fetch the item list. The
//! result is keyed by the requested URL so callers can correlate, and a
//! failed URL carries a per-URL failure marker instead of failing the
//! whole batch.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
use crate::model::{canonical_profile_url, EducationEntry, ExperienceEntry, Profile};

use super::http::{self, RetryPolicy};
use super::{ProfileScraper, ScrapeOutcomes};

/// HTTP client for the profile-scraper service.
pub struct ScraperHttpClient {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
    retry: RetryPolicy,
    poll_interval: Duration,
    max_wait: Duration,
}

impl ScraperHttpClient {
    /// Create a client for the given scraper endpoint.
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
            poll_interval: Duration::from_secs(10),
            max_wait: Duration::from_secs(300),
        }
    }

    /// Override the polling schedule (shortened in tests).
    pub fn with_polling(mut self, interval: Duration, max_wait: Duration) -> Self {
        self.poll_interval = interval;
        self.max_wait = max_wait;
        self
    }

    async fn start_run(&self, urls: &[String]) -> Result<String, AdapterError> {
        let request = StartRunRequest { urls };
        let response = http::with_retries(&self.retry, "scraper.start", || async {
            let response = self
                .client
                .post(format!("{}/runs", self.base_url))
                .bearer_auth(&self.api_token)
                .json(&request)
                .send()
                .await
                .map_err(|e| http::map_transport_error(&e))?;
            if !response.status().is_success() {
                return Err(http::map_error_response(response).await);
            }
            response
                .json::<StartRunResponse>()
                .await
                .map_err(|e| AdapterError::Parse(format!("scraper start: {e}")))
        })
        .await?;

        if response.run_id.is_empty() {
            return Err(AdapterError::Parse(
                "scraper start: no run_id in response".to_string(),
            ));
        }
        Ok(response.run_id)
    }

    async fn run_status(&self, run_id: &str) -> Result<String, AdapterError> {
        let info = http::with_retries(&self.retry, "scraper.status", || async {
            let response = self
                .client
                .get(format!("{}/runs/{run_id}", self.base_url))
                .bearer_auth(&self.api_token)
                .send()
                .await
                .map_err(|e| http::map_transport_error(&e))?;
            if !response.status().is_success() {
                return Err(http::map_error_response(response).await);
            }
            response
                .json::<RunStatusResponse>()
                .await
                .map_err(|e| AdapterError::Parse(format!("scraper status: {e}")))
        })
        .await?;
        Ok(info.status)
    }

    async fn fetch_items(&self, run_id: &str) -> Result<Vec<ScrapedItem>, AdapterError> {
        http::with_retries(&self.retry, "scraper.items", || async {
            let response = self
                .client
                .get(format!("{}/runs/{run_id}/items", self.base_url))
                .bearer_auth(&self.api_token)
                .send()
                .await
                .map_err(|e| http::map_transport_error(&e))?;
            if !response.status().is_success() {
                return Err(http::map_error_response(response).await);
            }
            response
                .json::<Vec<ScrapedItem>>()
                .await
                .map_err(|e| AdapterError::Parse(format!("scraper items: {e}")))
        })
        .await
    }
}

#[async_trait::async_trait]
impl ProfileScraper for ScraperHttpClient {
    async fn scrape(&self, urls: &[String]) -> Result<ScrapeOutcomes, AdapterError> {
        if urls.is_empty() {
            return Ok(ScrapeOutcomes::new());
        }

        tracing::info!(urls = urls.len(), "starting scraper run");
        let run_id = self.start_run(urls).await?;

        let started = tokio::time::Instant::now();
        loop {
            match self.run_status(&run_id).await?.as_str() {
                "SUCCEEDED" => break,
                "FAILED" | "ABORTED" => {
                    return Err(AdapterError::Transport {
                        message: format!("scraper run {run_id} failed"),
                    });
                }
                _ => {
                    if started.elapsed() >= self.max_wait {
                        return Err(AdapterError::Timeout {
                            seconds: self.max_wait.as_secs(),
                        });
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        let items = self.fetch_items(&run_id).await?;

        let mut outcomes = ScrapeOutcomes::new();
        for item in items {
            let Some(raw_url) = item.url.clone() else {
                continue;
            };
            let key = canonical_profile_url(&raw_url);
            match item.error {
                Some(message) => {
                    outcomes.insert(key, Err(message));
                }
                None => {
                    outcomes.insert(key, Ok(item.into_profile()));
                }
            }
        }

        // Every requested URL must appear in the result.
        for url in urls {
            let key = canonical_profile_url(url);
            outcomes
                .entry(key)
                .or_insert_with(|| Err("no result returned for url".to_string()));
        }

        tracing::info!(
            run_id,
            scraped = outcomes.values().filter(|r| r.is_ok()).count(),
            failed = outcomes.values().filter(|r| r.is_err()).count(),
            "scraper run complete",
        );
        Ok(outcomes)
    }
}

// --- Internal Serde types ---

#[derive(Serialize)]
struct StartRunRequest<'a> {
    urls: &'a [String],
}

#[derive(Deserialize)]
struct StartRunResponse {
    #[serde(default)]
    run_id: String,
}

#[derive(Deserialize)]
struct RunStatusResponse {
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct ScrapedItem {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    headline: Option<String>,
    #[serde(default)]
    job_title: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    connections: Option<u32>,
    #[serde(default)]
    followers: Option<u32>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    experience: Vec<ScrapedExperience>,
    #[serde(default)]
    education: Vec<ScrapedEducation>,
    #[serde(default)]
    skills: Vec<String>,
}

#[derive(Deserialize)]
struct ScrapedExperience {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
}

#[derive(Deserialize)]
struct ScrapedEducation {
    #[serde(default)]
    school: Option<String>,
    #[serde(default)]
    degree: Option<String>,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    end_year: Option<String>,
}

impl ScrapedItem {
    fn into_profile(self) -> Profile {
        Profile {
            full_name: self.name,
            first_name: self.first_name,
            last_name: self.last_name,
            headline: self.headline,
            job_title: self.job_title,
            employer: self.company,
            location: self.location.or_else(|| self.city.clone()),
            city: self.city,
            country: self.country,
            connections: self.connections,
            followers: self.followers,
            summary: self.summary,
            experience: self
                .experience
                .into_iter()
                .map(|e| ExperienceEntry {
                    title: e.title,
                    company: e.company,
                    location: e.location,
                    start_date: e.start_date,
                    end_date: e.end_date,
                })
                .collect(),
            education: self
                .education
                .into_iter()
                .map(|e| EducationEntry {
                    school: e.school,
                    degree: e.degree,
                    field: e.field,
                    end_year: e.end_year,
                })
                .collect(),
            skills: self.skills,
        }
        .with_current_role_derived()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> ScraperHttpClient {
        ScraperHttpClient::new(
            server.uri(),
            "test-token".to_string(),
            RetryPolicy {
                max_attempts: 2,
                base_delay_ms: 1,
                max_delay_ms: 2,
            },
            Duration::from_secs(5),
        )
        .with_polling(Duration::from_millis(1), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn scrape_polls_until_succeeded_and_keys_by_url() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/runs"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"run_id": "r1"})),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/runs/r1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "RUNNING"})),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/runs/r1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "SUCCEEDED"})),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/runs/r1/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "url": "https://www.linkedin.com/in/jane-doe",
                    "name": "Jane Doe",
                    "job_title": "CFO",
                    "company": "Benefis Health System",
                    "connections": 500
                },
                {
                    "url": "https://linkedin.com/in/gone",
                    "error": "profile not accessible"
                }
            ])))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let urls = vec![
            "https://linkedin.com/in/jane-doe".to_string(),
            "https://linkedin.com/in/gone".to_string(),
            "https://linkedin.com/in/missing".to_string(),
        ];
        let outcomes = client.scrape(&urls).await.unwrap();

        assert_eq!(outcomes.len(), 3);
        let jane = outcomes["https://linkedin.com/in/jane-doe"].as_ref().unwrap();
        assert_eq!(jane.employer.as_deref(), Some("Benefis Health System"));
        assert!(outcomes["https://linkedin.com/in/gone"].is_err());
        assert!(outcomes["https://linkedin.com/in/missing"].is_err());
    }

    #[tokio::test]
    async fn scrape_empty_input_makes_no_calls() {
        let server = MockServer::start().await;
        let client = test_client(&server);
        let outcomes = client.scrape(&[]).await.unwrap();
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn failed_run_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/runs"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"run_id": "r2"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/runs/r2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "FAILED"})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client
            .scrape(&["https://linkedin.com/in/x".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Transport { .. }));
    }

    #[tokio::test]
    async fn stuck_run_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/runs"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"run_id": "r3"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/runs/r3"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "RUNNING"})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client
            .scrape(&["https://linkedin.com/in/x".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Timeout { .. }));
    }
}
