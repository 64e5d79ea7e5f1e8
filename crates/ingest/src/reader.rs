use std::path::Path;

use tokio::fs;
use tracing::debug;

use crate::error::{Result, SourceError};
use crate::table::{Row, Table};

pub struct CsvReader;

impl CsvReader {
    /// Parse an uploaded CSV payload. The first record is the header.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Table> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(bytes);

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(str::to_string)
            .collect();

        if columns.is_empty() || columns.iter().all(String::is_empty) {
            return Err(SourceError::Parse("missing header row".to_string()));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(Row::new(record.iter().map(str::to_string).collect()));
        }

        debug!(columns = columns.len(), rows = rows.len(), "Parsed CSV");
        Ok(Table::new(columns, rows))
    }

    pub async fn read_file(path: &Path) -> Result<Table> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match extension {
            "csv" | "txt" => {
                let bytes = fs::read(path).await?;
                Self::parse_bytes(&bytes)
            }
            _ => Err(SourceError::Parse(format!(
                "Unsupported file format: {:?}",
                path
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_csv() {
        let data = b"company,city\nAcme,Pune\n\"Globex, Inc\",Delhi\n";
        let table = CsvReader::parse_bytes(data).unwrap();

        assert_eq!(table.columns(), &["company", "city"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1].get(0), Some("Globex, Inc"));
    }

    #[test]
    fn test_header_names_kept_verbatim() {
        let table = CsvReader::parse_bytes("company, email\nAcme,a@acme.test\n".as_bytes()).unwrap();
        assert_eq!(table.columns(), &["company", " email"]);
        assert!(table.column_index("email").is_none());
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        let data = b"company,city\nAcme,Pune,extra\n";
        let err = CsvReader::parse_bytes(data).unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let err = CsvReader::parse_bytes(b"").unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let data = b"company\n\xff\xfe\n";
        let err = CsvReader::parse_bytes(data).unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let err = CsvReader::read_file(Path::new("table.xlsx"))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }
}
