pub mod llm;
pub mod prompt;
pub mod schema;

pub use llm::{GroqClient, DEFAULT_GROQ_BASE_URL, DEFAULT_GROQ_MODEL};
pub use prompt::{resolve_template, PLACEHOLDER};
pub use schema::{
    ExtractionResult, FailureStage, ResultRecord, RowFailure, RowOutcome, SearchResult,
    API_ERROR_OCCURRED, NO_DATA_AVAILABLE, NO_RESULTS_FOUND,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

/// A text-generation backend: one prompt in, one completion out.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

pub struct Extractor<M> {
    model: M,
}

impl<M: CompletionModel> Extractor<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Ask the model to pull the fact described by `query` out of `snippets`.
    ///
    /// The model is always called, even with no snippets; it then sees the
    /// no-results marker. Returns the trimmed reply, or the no-data sentinel
    /// when the reply is blank.
    pub async fn extract(&self, query: &str, snippets: &[String]) -> Result<String> {
        let context = prompt::build_context(snippets);
        let prompt = prompt::build_extraction_prompt(query, &context);

        let reply = self
            .model
            .complete(&prompt)
            .await
            .context("Extraction request failed")?;

        let reply = reply.trim();
        debug!(query, reply_len = reply.len(), "Extraction reply");

        if reply.is_empty() {
            Ok(NO_DATA_AVAILABLE.to_string())
        } else {
            Ok(reply.to_string())
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}
