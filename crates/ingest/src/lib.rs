pub mod credentials;
pub mod error;
pub mod reader;
pub mod sheets;
pub mod table;

pub use credentials::ServiceAccountKey;
pub use error::SourceError;
pub use reader::CsvReader;
pub use sheets::{SheetsClient, Spreadsheet, WriteSummary, DEFAULT_SHEETS_BASE_URL};
pub use table::{Row, Table};

use std::path::Path;

use error::Result;
use tracing::info;

/// An authenticated connection to the spreadsheet a table was loaded from.
/// Kept around so results can be written back to the same document.
pub struct SheetSource {
    pub client: SheetsClient,
    pub spreadsheet: Spreadsheet,
}

/// Load a table from an uploaded CSV payload
pub fn load_csv(bytes: &[u8]) -> Result<Table> {
    let table = CsvReader::parse_bytes(bytes)?;
    info!(rows = table.len(), columns = table.columns().len(), "Loaded CSV table");
    Ok(table)
}

/// Authenticate, open the spreadsheet at `url` and read its first worksheet
pub async fn load_sheet(
    url: &str,
    credentials_path: &Path,
    sheets_base_url: &str,
) -> Result<(SheetSource, Table)> {
    let key = ServiceAccountKey::from_file(credentials_path).await?;
    let client = SheetsClient::authorize(&key, sheets_base_url.to_string()).await?;
    let spreadsheet = client.open_by_url(url).await?;
    let table = client.read_first_sheet(&spreadsheet).await?;

    info!(
        spreadsheet = %spreadsheet.id,
        rows = table.len(),
        columns = table.columns().len(),
        "Loaded spreadsheet table"
    );

    Ok((
        SheetSource {
            client,
            spreadsheet,
        },
        table,
    ))
}
