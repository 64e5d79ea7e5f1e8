pub mod serpapi;

pub use serpapi::{SearchParams, SerpApiClient, DEFAULT_SERPAPI_BASE_URL};

use anyhow::Result;
use async_trait::async_trait;

/// A web search backend that returns result snippets in rank order.
///
/// An empty result list is a normal answer, not an error.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<String>>;
}
