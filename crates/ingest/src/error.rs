//! Errors raised while loading or writing tabular data.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    /// Input could not be parsed as a delimited table
    #[error("parse error: {0}")]
    Parse(String),

    /// Credentials are missing, malformed, or were rejected by the token endpoint
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Spreadsheet or worksheet does not exist (or is not shared with us)
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other failure talking to the spreadsheet service
    #[error("remote error: {0}")]
    Remote(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Classify a non-success HTTP status from the spreadsheet service.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => SourceError::Auth(format!("{}: {}", status, body)),
            404 => SourceError::NotFound(format!("{}: {}", status, body)),
            _ => SourceError::Remote(format!("{}: {}", status, body)),
        }
    }

    /// Collapse any failure into `Remote`, keeping its message.
    pub fn into_remote(self) -> Self {
        match self {
            SourceError::Remote(_) => self,
            other => SourceError::Remote(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Remote(err.to_string())
    }
}

impl From<csv::Error> for SourceError {
    fn from(err: csv::Error) -> Self {
        SourceError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
