//! Web search back-end (Bing Custom Search compatible).

use crate::config::WebSearchSettings;
use crate::error::{ParleyError, Result};
use crate::llm::RetryPolicy;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

const API_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// One search hit as handed to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRecord {
    /// Title of the page or article.
    pub source: String,
    pub content: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "webPages")]
    web_pages: Option<WebPages>,
}

#[derive(Debug, Deserialize)]
struct WebPages {
    #[serde(default)]
    value: Vec<WebPage>,
}

#[derive(Debug, Deserialize)]
struct WebPage {
    name: String,
    #[serde(default)]
    snippet: String,
    url: String,
}

/// HTTP client for the web search endpoint.
pub struct WebSearchClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
    custom_config_id: Option<String>,
    count: u32,
    retry: RetryPolicy,
}

impl WebSearchClient {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ParleyError::Config(format!("Invalid web search endpoint '{}': {}", endpoint, e)))?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ParleyError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            api_key,
            custom_config_id: None,
            count: 5,
            retry: RetryPolicy::default(),
        })
    }

    /// Build a client from settings, reading the key from the environment.
    pub fn from_settings(settings: &WebSearchSettings) -> Result<Self> {
        let mut client = Self::new(&settings.endpoint, settings.api_key(), settings.timeout())?
            .with_count(settings.count);
        client.custom_config_id = settings.custom_config_id.clone();
        Ok(client)
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_custom_config(mut self, id: impl Into<String>) -> Self {
        self.custom_config_id = Some(id.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Search the web. `up_to_date` sorts results by date.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, up_to_date: bool) -> Result<Vec<SearchRecord>> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ParleyError::WebSearch(format!(
                "no API key configured (set {})",
                WebSearchSettings::API_KEY_ENV
            ))
        })?;

        let mut params: Vec<(&str, String)> = vec![("q", query.to_string()), ("count", self.count.to_string())];
        if let Some(id) = &self.custom_config_id {
            params.push(("customconfig", id.clone()));
        }
        if up_to_date {
            params.push(("sortby", "Date".to_string()));
        }

        let body = self
            .retry
            .run("web search", || self.fetch(api_key, &params))
            .await?;

        let records: Vec<SearchRecord> = body
            .web_pages
            .map(|pages| pages.value)
            .unwrap_or_default()
            .into_iter()
            .map(|page| SearchRecord {
                source: page.name,
                content: page.snippet,
                url: page.url,
            })
            .collect();

        debug!("Web search for '{}' returned {} results", query, records.len());
        Ok(records)
    }

    async fn fetch(&self, api_key: &str, params: &[(&str, String)]) -> Result<SearchResponse> {
        let response = self
            .http
            .get(self.endpoint.clone())
            .header(API_KEY_HEADER, api_key)
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("status {}: {}", status.as_u16(), body);
            return Err(if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                ParleyError::Unavailable(format!("web search {}", message))
            } else {
                ParleyError::WebSearch(message)
            });
        }

        Ok(response.json().await?)
    }
}

/// A Bing-shaped search server on a local port.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Answers three records for any query except `nothing`. The first
    /// `fail_first` requests get `fail_status`; every request waits `delay`.
    #[derive(Default)]
    pub(crate) struct FakeBing {
        pub hits: AtomicUsize,
        pub fail_first: usize,
        pub fail_status: u16,
        pub delay: Duration,
        pub last_query: Mutex<HashMap<String, String>>,
    }

    async fn handler(
        State(fake): State<Arc<FakeBing>>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> axum::response::Response {
        let n = fake.hits.fetch_add(1, Ordering::SeqCst);
        *fake.last_query.lock().unwrap() = params.clone();
        if !fake.delay.is_zero() {
            tokio::time::sleep(fake.delay).await;
        }

        if headers.get(API_KEY_HEADER).map(|v| v.as_bytes()) != Some(b"test-key".as_slice()) {
            return (AxumStatus::UNAUTHORIZED, "missing key").into_response();
        }
        if n < fake.fail_first {
            let status = AxumStatus::from_u16(fake.fail_status).unwrap();
            return (status, "try later").into_response();
        }
        if params.get("q").map(String::as_str) == Some("nothing") {
            return Json(serde_json::json!({"_type": "SearchResponse"})).into_response();
        }

        Json(serde_json::json!({
            "webPages": {
                "value": [
                    {"name": "Essenza Mini review", "snippet": "Compact and quick.", "url": "https://example.com/a"},
                    {"name": "Recall notice", "snippet": "No recalls this year.", "url": "https://example.com/b"},
                    {"name": "Descaling guide", "snippet": "Descale every 3 months.", "url": "https://example.com/c"}
                ]
            }
        }))
        .into_response()
    }

    /// Serve `fake` and return its search endpoint.
    pub(crate) async fn spawn(fake: Arc<FakeBing>) -> String {
        let app = Router::new().route("/search", get(handler)).with_state(fake);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/search", addr)
    }

    /// Client with the key the fake expects and short retry backoff.
    pub(crate) fn client(endpoint: &str) -> WebSearchClient {
        WebSearchClient::new(endpoint, Some("test-key".to_string()), Duration::from_secs(5))
            .unwrap()
            .with_retry(RetryPolicy::new(2, Duration::from_millis(5)))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{client, spawn, FakeBing};
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_search_maps_records() {
        let fake = Arc::new(FakeBing::default());
        let endpoint = spawn(fake.clone()).await;

        let records = client(&endpoint)
            .with_custom_config("cfg-1")
            .search("Essenza Mini", true)
            .await
            .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].source, "Essenza Mini review");
        assert_eq!(records[2].url, "https://example.com/c");

        let query = fake.last_query.lock().unwrap().clone();
        assert_eq!(query.get("q").map(String::as_str), Some("Essenza Mini"));
        assert_eq!(query.get("count").map(String::as_str), Some("5"));
        assert_eq!(query.get("customconfig").map(String::as_str), Some("cfg-1"));
        assert_eq!(query.get("sortby").map(String::as_str), Some("Date"));
    }

    #[tokio::test]
    async fn test_missing_web_pages_is_empty() {
        let fake = Arc::new(FakeBing::default());
        let endpoint = spawn(fake.clone()).await;

        let records = client(&endpoint).search("nothing", false).await.unwrap();
        assert!(records.is_empty());
        assert!(!fake.last_query.lock().unwrap().contains_key("sortby"));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let fake = Arc::new(FakeBing {
            fail_first: 2,
            fail_status: 503,
            ..Default::default()
        });
        let endpoint = spawn(fake.clone()).await;

        let records = client(&endpoint).search("Essenza Mini", false).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(fake.hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let fake = Arc::new(FakeBing {
            fail_first: 10,
            fail_status: 400,
            ..Default::default()
        });
        let endpoint = spawn(fake.clone()).await;

        let err = client(&endpoint).search("Essenza Mini", false).await.unwrap_err();
        assert!(matches!(err, ParleyError::WebSearch(ref m) if m.starts_with("status 400")));
        assert_eq!(fake.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_request() {
        let client = WebSearchClient::new("http://127.0.0.1:9/search", None, Duration::from_secs(1)).unwrap();
        assert!(client.search("anything", false).await.is_err());
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        assert!(WebSearchClient::new("not a url", None, Duration::from_secs(1)).is_err());
    }
}
