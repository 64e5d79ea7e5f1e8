pub mod config;
pub mod export;
pub mod orchestrator;
pub mod render;

pub use config::{AppConfig, ConfigError};
pub use export::{export_to_worksheet, to_csv, ExportError, RESULTS_FILE_NAME};
pub use orchestrator::{
    BatchError, BatchReport, BatchRequest, BatchState, Orchestrator, RowProgress,
};
pub use render::render_table;

use extract::GroqClient;
use ingest::{SheetSource, SourceError, Table};
use search::SerpApiClient;

/// Orchestrator wired to the real providers.
pub type ProviderOrchestrator = Orchestrator<SerpApiClient, GroqClient>;

pub fn build_orchestrator(config: &AppConfig) -> ProviderOrchestrator {
    Orchestrator::new(config.search_client(), config.llm_client())
}

/// Where the loaded table came from.
pub enum SourceKind {
    Csv,
    Sheet(SheetSource),
}

/// The session's table plus a handle back to its origin.
pub struct LoadedSource {
    pub table: Table,
    pub kind: SourceKind,
}

impl LoadedSource {
    pub fn from_csv(bytes: &[u8]) -> Result<Self, SourceError> {
        Ok(Self {
            table: ingest::load_csv(bytes)?,
            kind: SourceKind::Csv,
        })
    }

    pub async fn from_sheet(url: &str, config: &AppConfig) -> Result<Self, SourceError> {
        let (sheet, table) = ingest::load_sheet(
            url,
            &config.sheets.credentials_file,
            &config.sheets.base_url,
        )
        .await?;

        Ok(Self {
            table,
            kind: SourceKind::Sheet(sheet),
        })
    }

    /// The spreadsheet handle, when the table was loaded from one.
    pub fn sheet(&self) -> Option<&SheetSource> {
        match &self.kind {
            SourceKind::Sheet(sheet) => Some(sheet),
            SourceKind::Csv => None,
        }
    }
}
