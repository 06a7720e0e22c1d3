//! Web search providers
//!
//! Two independently-sourced backends so corroboration is meaningful.
//! Each uses a long-lived reqwest::Client for connection pooling.

use crate::error::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error};

/// One search result: a content snippet and the page it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    pub url: String,
}

/// Capability interface for one web-search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, query: &str) -> crate::Result<Vec<SearchHit>>;
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .timeout(timeout)
        .build()
        .expect("Failed to build HTTP client")
}

//
// ================= Tavily =================
//

pub struct TavilyClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_results: usize,
}

impl TavilyClient {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            api_key,
            base_url: "https://api.tavily.com/search".to_string(),
            max_results: 5,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    content: String,
    url: String,
}

#[async_trait]
impl SearchProvider for TavilyClient {
    fn name(&self) -> &'static str {
        "Tavily"
    }

    async fn search(&self, query: &str) -> crate::Result<Vec<SearchHit>> {
        debug!(query = %query, "Searching Tavily");

        let body = json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": self.max_results,
            "search_depth": "advanced",
            "include_answer": true,
            "include_raw_content": true,
            "include_images": false,
        });

        let response = self
            .client
            .post(&self.base_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Tavily request failed: {}", e);
                PipelineError::SearchError(format!("Tavily request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineError::SearchError(format!(
                "Tavily returned {}: {}",
                status, text
            )));
        }

        let parsed: TavilyResponse = response.json().await.map_err(|e| {
            PipelineError::SearchError(format!("Invalid Tavily response: {}", e))
        })?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| SearchHit {
                content: r.content,
                url: r.url,
            })
            .collect())
    }
}

//
// ================= Serper =================
//

pub struct SerperClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SerperClient {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            api_key,
            base_url: "https://google.serper.dev/search".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, Deserialize)]
struct SerperResult {
    link: Option<String>,
    snippet: Option<String>,
}

#[async_trait]
impl SearchProvider for SerperClient {
    fn name(&self) -> &'static str {
        "Serper"
    }

    async fn search(&self, query: &str) -> crate::Result<Vec<SearchHit>> {
        debug!(query = %query, "Searching Serper");

        let response = self
            .client
            .post(&self.base_url)
            .header("X-API-KEY", &self.api_key)
            .json(&json!({ "q": query }))
            .send()
            .await
            .map_err(|e| {
                error!("Serper request failed: {}", e);
                PipelineError::SearchError(format!("Serper request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineError::SearchError(format!(
                "Serper returned {}: {}",
                status, text
            )));
        }

        let parsed: SerperResponse = response.json().await.map_err(|e| {
            PipelineError::SearchError(format!("Invalid Serper response: {}", e))
        })?;

        // Only entries carrying both a link and a snippet are usable.
        Ok(parsed
            .organic
            .into_iter()
            .filter_map(|r| match (r.link, r.snippet) {
                (Some(url), Some(content)) => Some(SearchHit { content, url }),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serper_response_skips_partial_entries() {
        let raw = r#"{
            "organic": [
                {"link": "https://news.com/tesla", "snippet": "Tesla announced a new vehicle."},
                {"link": "https://no-snippet.com"},
                {"snippet": "orphaned snippet"}
            ]
        }"#;

        let parsed: SerperResponse = serde_json::from_str(raw).unwrap();
        let hits: Vec<SearchHit> = parsed
            .organic
            .into_iter()
            .filter_map(|r| match (r.link, r.snippet) {
                (Some(url), Some(content)) => Some(SearchHit { content, url }),
                _ => None,
            })
            .collect();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://news.com/tesla");
    }

    #[test]
    fn test_tavily_response_parses_results() {
        let raw = r#"{
            "results": [
                {"content": "Tesla is an electric vehicle company.", "url": "https://tesla.com", "title": "Tesla"},
                {"content": "Tesla's CEO is Elon Musk.", "url": "https://example.com/tesla", "title": "About"}
            ]
        }"#;

        let parsed: TavilyResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].url, "https://tesla.com");
    }
}
