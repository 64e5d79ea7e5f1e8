//! Minimal Google Sheets v4 client: open by URL, read records, write a worksheet.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::credentials::{ServiceAccountKey, SPREADSHEETS_SCOPE};
use crate::error::{Result, SourceError};
use crate::table::{Row, Table};

pub const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Size given to a worksheet created for export.
pub const NEW_WORKSHEET_ROWS: u32 = 100;
pub const NEW_WORKSHEET_COLS: u32 = 20;

static SPREADSHEET_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/spreadsheets/d/([a-zA-Z0-9_-]+)").expect("spreadsheet id pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridProperties {
    #[serde(default)]
    pub row_count: u32,
    #[serde(default)]
    pub column_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetProperties {
    #[serde(default)]
    pub sheet_id: i64,
    pub title: String,
    #[serde(default)]
    pub index: u32,
    #[serde(default = "empty_grid")]
    pub grid_properties: GridProperties,
}

fn empty_grid() -> GridProperties {
    GridProperties {
        row_count: 0,
        column_count: 0,
    }
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SpreadsheetMetadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// An opened spreadsheet: its id and the worksheets it had when fetched.
#[derive(Debug, Clone)]
pub struct Spreadsheet {
    pub id: String,
    pub sheets: Vec<SheetProperties>,
}

impl Spreadsheet {
    /// The worksheet at index 0 (gspread's `sheet1`).
    pub fn first_sheet(&self) -> Option<&SheetProperties> {
        self.sheets.iter().min_by_key(|s| s.index)
    }

    pub fn sheet_by_title(&self, title: &str) -> Option<&SheetProperties> {
        self.sheets.iter().find(|s| s.title == title)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteSummary {
    pub worksheet: String,
    pub created: bool,
    pub rows_written: usize,
}

pub struct SheetsClient {
    base_url: String,
    access_token: String,
    client: reqwest::Client,
}

/// Extract the spreadsheet key from a `docs.google.com/spreadsheets/d/<key>/...` URL.
pub fn spreadsheet_id_from_url(url: &str) -> Option<&str> {
    SPREADSHEET_ID
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// A1 range covering a whole worksheet, quoted so any title is accepted.
fn sheet_range(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Turn a raw value grid into records keyed by the first row.
fn records_from_values(values: Vec<Vec<Value>>) -> Result<Table> {
    let mut grid = values.into_iter();
    let Some(header) = grid.next() else {
        return Ok(Table::default());
    };

    let columns: Vec<String> = header.iter().map(cell_to_string).collect();
    let mut seen = std::collections::HashSet::new();
    for column in columns.iter().filter(|c| !c.is_empty()) {
        if !seen.insert(column) {
            return Err(SourceError::Parse(format!(
                "header row is not unique: {:?}",
                column
            )));
        }
    }

    let mut rows: Vec<Row> = grid
        .map(|cells| Row::new(cells.iter().map(cell_to_string).collect()))
        .collect();

    while rows
        .last()
        .is_some_and(|row| row.values.iter().all(String::is_empty))
    {
        rows.pop();
    }

    Ok(Table::new(columns, rows))
}

impl SheetsClient {
    pub fn new(base_url: String, access_token: String) -> Self {
        Self {
            base_url,
            access_token,
            client: reqwest::Client::new(),
        }
    }

    /// Authenticate with a service account and return a ready client.
    pub async fn authorize(key: &ServiceAccountKey, base_url: String) -> Result<Self> {
        let client = reqwest::Client::new();
        let access_token = key.fetch_access_token(&client, SPREADSHEETS_SCOPE).await?;

        Ok(Self {
            base_url,
            access_token,
            client,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SourceError::Remote(format!("invalid sheets base url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| SourceError::Remote("sheets base url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(SourceError::from_status(status, body))
    }

    async fn fetch_metadata(&self, spreadsheet_id: &str) -> Result<Vec<SheetProperties>> {
        let url = self.endpoint(&[spreadsheet_id])?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(&[("fields", "sheets.properties")])
            .send()
            .await?;

        let metadata: SpreadsheetMetadata = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| SourceError::Remote(format!("malformed spreadsheet metadata: {}", e)))?;

        Ok(metadata.sheets.into_iter().map(|s| s.properties).collect())
    }

    pub async fn open_by_url(&self, url: &str) -> Result<Spreadsheet> {
        let id = spreadsheet_id_from_url(url)
            .ok_or_else(|| SourceError::NotFound(format!("no spreadsheet key in url: {}", url)))?;

        let sheets = self.fetch_metadata(id).await?;
        debug!(spreadsheet = id, worksheets = sheets.len(), "Opened spreadsheet");

        Ok(Spreadsheet {
            id: id.to_string(),
            sheets,
        })
    }

    /// Read every record of one worksheet, first row as header.
    pub async fn read_records(&self, spreadsheet: &Spreadsheet, title: &str) -> Result<Table> {
        let range = sheet_range(title);
        let url = self.endpoint(&[&spreadsheet.id, "values", &range])?;

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(&[("valueRenderOption", "UNFORMATTED_VALUE")])
            .send()
            .await?;

        let value_range: ValueRange = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| SourceError::Remote(format!("malformed value range: {}", e)))?;

        records_from_values(value_range.values)
    }

    pub async fn read_first_sheet(&self, spreadsheet: &Spreadsheet) -> Result<Table> {
        let first = spreadsheet
            .first_sheet()
            .ok_or_else(|| SourceError::NotFound(format!("spreadsheet {} has no worksheets", spreadsheet.id)))?;
        self.read_records(spreadsheet, &first.title).await
    }

    async fn batch_update(&self, spreadsheet_id: &str, requests: Value) -> Result<()> {
        let url = self.endpoint(&[&format!("{}:batchUpdate", spreadsheet_id)])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&json!({ "requests": requests }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Replace the contents of worksheet `title` with `table`, header first.
    ///
    /// The worksheet is created when missing and grown when the table does
    /// not fit. Other worksheets are never touched. Every failure on this
    /// path is reported as [`SourceError::Remote`].
    pub async fn write_table(
        &self,
        spreadsheet: &Spreadsheet,
        title: &str,
        table: &Table,
    ) -> Result<WriteSummary> {
        self.replace_worksheet(spreadsheet, title, table)
            .await
            .map_err(SourceError::into_remote)
    }

    async fn replace_worksheet(
        &self,
        spreadsheet: &Spreadsheet,
        title: &str,
        table: &Table,
    ) -> Result<WriteSummary> {
        let current = Spreadsheet {
            id: spreadsheet.id.clone(),
            sheets: self.fetch_metadata(&spreadsheet.id).await?,
        };
        let existing = current.sheet_by_title(title).cloned();
        let created = existing.is_none();

        let needed_rows = (table.len() + 1) as u32;
        let needed_cols = table.columns().len() as u32;

        match existing {
            None => {
                info!(worksheet = title, "Creating worksheet for export");
                self.batch_update(
                    &spreadsheet.id,
                    json!([{
                        "addSheet": {
                            "properties": {
                                "title": title,
                                "gridProperties": {
                                    "rowCount": NEW_WORKSHEET_ROWS.max(needed_rows),
                                    "columnCount": NEW_WORKSHEET_COLS.max(needed_cols),
                                }
                            }
                        }
                    }]),
                )
                .await?;
            }
            Some(sheet)
                if sheet.grid_properties.row_count < needed_rows
                    || sheet.grid_properties.column_count < needed_cols =>
            {
                self.batch_update(
                    &spreadsheet.id,
                    json!([{
                        "updateSheetProperties": {
                            "properties": {
                                "sheetId": sheet.sheet_id,
                                "gridProperties": {
                                    "rowCount": sheet.grid_properties.row_count.max(needed_rows),
                                    "columnCount": sheet.grid_properties.column_count.max(needed_cols),
                                }
                            },
                            "fields": "gridProperties(rowCount,columnCount)"
                        }
                    }]),
                )
                .await?;
            }
            Some(_) => {}
        }

        let range = sheet_range(title);

        let clear_url = self.endpoint(&[&spreadsheet.id, "values", &format!("{}:clear", range)])?;
        let response = self
            .client
            .post(clear_url)
            .bearer_auth(&self.access_token)
            .json(&json!({}))
            .send()
            .await?;
        Self::check(response).await?;

        let mut values: Vec<&[String]> = Vec::with_capacity(table.len() + 1);
        values.push(table.columns());
        values.extend(table.rows().iter().map(|r| r.values.as_slice()));

        let origin = format!("{}!A1", range);
        let update_url = self.endpoint(&[&spreadsheet.id, "values", &origin])?;
        let response = self
            .client
            .put(update_url)
            .bearer_auth(&self.access_token)
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({
                "range": origin,
                "majorDimension": "ROWS",
                "values": values,
            }))
            .send()
            .await?;
        Self::check(response).await?;

        info!(worksheet = title, rows = table.len(), created, "Wrote worksheet");
        Ok(WriteSummary {
            worksheet: title.to_string(),
            created,
            rows_written: table.len(),
        })
    }
}
