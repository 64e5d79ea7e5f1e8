use extract::{ExtractionResult, ResultRecord};
use ingest::{Row, SheetSource, SourceError, Table, WriteSummary};
use thiserror::Error;
use tracing::{error, info};

pub const RESULTS_FILE_NAME: &str = "extracted_results.csv";
pub const RESULT_COLUMNS: [&str; 3] = ["entity", "prompt", "extracted_data"];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV output is not valid UTF-8")]
    Encoding,

    #[error("spreadsheet export failed: {0}")]
    Sheet(#[from] SourceError),
}

/// Serialize results as CSV with an `entity,prompt,extracted_data` header.
pub fn to_csv(results: &[ExtractionResult]) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    if results.is_empty() {
        writer.write_record(RESULT_COLUMNS)?;
    }
    for result in results {
        writer.serialize(result.record())?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Csv(e.into_error().into()))?;
    String::from_utf8(bytes).map_err(|_| ExportError::Encoding)
}

/// Read back a CSV produced by [`to_csv`].
pub fn parse_csv(text: &str) -> Result<Vec<ResultRecord>, ExportError> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let records = reader
        .deserialize()
        .collect::<Result<Vec<ResultRecord>, csv::Error>>()?;
    Ok(records)
}

/// The results as a fresh three-column table.
pub fn results_table(results: &[ExtractionResult]) -> Table {
    let rows = results
        .iter()
        .map(|r| {
            Row::new(vec![
                r.entity.clone(),
                r.prompt.clone(),
                r.extracted_data().to_string(),
            ])
        })
        .collect();

    Table::new(RESULT_COLUMNS.iter().map(|c| c.to_string()).collect(), rows)
}

/// Write results into `worksheet` of the spreadsheet they came from.
pub async fn export_to_worksheet(
    source: &SheetSource,
    worksheet: &str,
    results: &[ExtractionResult],
) -> Result<WriteSummary, ExportError> {
    let table = results_table(results);

    match source
        .client
        .write_table(&source.spreadsheet, worksheet, &table)
        .await
    {
        Ok(summary) => {
            info!(worksheet, rows = summary.rows_written, "Extracted results exported to Google Sheet");
            Ok(summary)
        }
        Err(e) => {
            error!(worksheet, error = %e, "Error exporting data to Google Sheets");
            Err(e.into())
        }
    }
}
