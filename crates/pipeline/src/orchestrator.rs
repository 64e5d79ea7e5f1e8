use extract::{
    resolve_template, CompletionModel, ExtractionResult, Extractor, FailureStage, ResultRecord,
    RowFailure, RowOutcome, SearchResult,
};
use ingest::Table;
use search::WebSearch;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// What the user picked before pressing "search and extract".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Column holding the entity for each row
    pub column: String,
    /// How many rows to process, from the top
    pub rows: usize,
    pub template: String,
}

/// Request problems caught before any external call is made.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("no data loaded")]
    EmptyTable,

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("row count must be at least 1")]
    InvalidRowCount,
}

/// Everything one batch produced. Never mutated once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<ExtractionResult>,
    pub searches: Vec<SearchResult>,
}

impl BatchReport {
    pub fn records(&self) -> Vec<ResultRecord> {
        self.results.iter().map(ExtractionResult::record).collect()
    }

    pub fn failed_rows(&self) -> usize {
        self.results.iter().filter(|r| r.failure().is_some()).count()
    }
}

/// Lifecycle of the single batch a session can run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum BatchState {
    Idle,
    Running { total: usize, completed: usize },
    Done { report: BatchReport },
}

impl BatchState {
    pub fn is_running(&self) -> bool {
        matches!(self, BatchState::Running { .. })
    }
}

/// Reported after each row finishes.
#[derive(Debug, Clone, Copy)]
pub struct RowProgress {
    pub completed: usize,
    pub total: usize,
}

impl BatchRequest {
    /// Check the request against the loaded table and return how many rows
    /// will actually be processed. Counts past the end are clamped.
    pub fn validate(&self, table: &Table) -> Result<usize, BatchError> {
        if table.is_empty() {
            return Err(BatchError::EmptyTable);
        }
        if table.column_index(&self.column).is_none() {
            return Err(BatchError::UnknownColumn(self.column.clone()));
        }
        if self.rows == 0 {
            return Err(BatchError::InvalidRowCount);
        }
        Ok(self.rows.min(table.len()))
    }
}

pub struct Orchestrator<S, M> {
    search: S,
    extractor: Extractor<M>,
}

impl<S: WebSearch, M: CompletionModel> Orchestrator<S, M> {
    pub fn new(search: S, model: M) -> Self {
        Self {
            search,
            extractor: Extractor::new(model),
        }
    }

    pub async fn run(&self, table: &Table, request: &BatchRequest) -> Result<BatchReport, BatchError> {
        self.run_with_progress(table, request, |_| {}).await
    }

    /// Search and extract for the first N rows, strictly in table order.
    ///
    /// A provider failure on one row becomes that row's failed outcome and
    /// the loop moves on; only request validation can fail the whole batch.
    pub async fn run_with_progress<F>(
        &self,
        table: &Table,
        request: &BatchRequest,
        mut on_row: F,
    ) -> Result<BatchReport, BatchError>
    where
        F: FnMut(RowProgress) + Send,
    {
        let total = request.validate(table)?;
        let entities: Vec<String> = table
            .column_values(&request.column, total)
            .ok_or_else(|| BatchError::UnknownColumn(request.column.clone()))?
            .map(str::to_string)
            .collect();

        info!(rows = total, column = %request.column, "Starting extraction batch");

        let mut results = Vec::with_capacity(total);
        let mut searches = Vec::with_capacity(total);

        for (row, entity) in entities.into_iter().enumerate() {
            let prompt = resolve_template(&request.template, &entity);
            info!(row, entity = %entity, "Searching for: {}", entity);

            let (snippets, outcome) = self.process_row(&entity, &prompt).await;

            searches.push(SearchResult {
                entity: entity.clone(),
                prompt: prompt.clone(),
                snippets,
            });
            results.push(ExtractionResult {
                entity,
                prompt,
                outcome,
            });

            on_row(RowProgress {
                completed: row + 1,
                total,
            });
        }

        let report = BatchReport { results, searches };
        info!(
            rows = report.results.len(),
            failed = report.failed_rows(),
            "Extraction batch complete"
        );
        Ok(report)
    }

    async fn process_row(&self, entity: &str, prompt: &str) -> (Vec<String>, RowOutcome) {
        let snippets = match self.search.search(prompt).await {
            Ok(snippets) => snippets,
            Err(e) => {
                warn!(entity, error = %e, "Error in API call for {}", entity);
                let failure = RowFailure {
                    stage: FailureStage::Search,
                    message: format!("{:#}", e),
                };
                return (Vec::new(), RowOutcome::Failed(failure));
            }
        };

        let outcome = match self.extractor.extract(prompt, &snippets).await {
            Ok(reply) => RowOutcome::from_reply(reply),
            Err(e) => {
                warn!(entity, error = %e, "Error in API call for {}", entity);
                RowOutcome::Failed(RowFailure {
                    stage: FailureStage::Extraction,
                    message: format!("{:#}", e),
                })
            }
        };

        (snippets, outcome)
    }
}
