use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::WebSearch;

pub const DEFAULT_SERPAPI_BASE_URL: &str = "https://serpapi.com";

/// Fixed engine and locale parameters sent with every query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    pub engine: String,
    pub location: String,
    /// Interface language
    pub hl: String,
    /// Country
    pub gl: String,
    /// Upper bound on snippets handed to the extractor
    pub max_snippets: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            engine: "google".to_string(),
            location: "India".to_string(),
            hl: "en".to_string(),
            gl: "in".to_string(),
            max_snippets: 10,
        }
    }
}

#[derive(Clone)]
pub struct SerpApiClient {
    base_url: String,
    api_key: String,
    params: SearchParams,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct OrganicResult {
    #[serde(default)]
    snippet: Option<String>,
}

impl SerpApiClient {
    pub fn new(base_url: String, api_key: String, params: SearchParams) -> Self {
        Self {
            base_url,
            api_key,
            params,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl WebSearch for SerpApiClient {
    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let url = format!("{}/search.json", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query),
                ("engine", self.params.engine.as_str()),
                ("location", self.params.location.as_str()),
                ("hl", self.params.hl.as_str()),
                ("gl", self.params.gl.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("Failed to send request to SerpAPI")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("SerpAPI request failed {}: {}", status, body);
        }

        let serp_response: SerpApiResponse = response
            .json()
            .await
            .context("Failed to parse SerpAPI response")?;

        // A 200 with an `error` field means the engine found nothing
        if let Some(error) = &serp_response.error {
            debug!(query, error = %error, "SerpAPI returned no results");
        }

        let snippets: Vec<String> = serp_response
            .organic_results
            .into_iter()
            .filter_map(|r| r.snippet)
            .filter(|s| !s.trim().is_empty())
            .take(self.params.max_snippets)
            .collect();

        debug!(query, count = snippets.len(), "SerpAPI search complete");
        Ok(snippets)
    }
}
