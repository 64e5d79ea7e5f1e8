use serde::{Deserialize, Serialize};

/// Reply used when the model finds nothing (or says nothing).
pub const NO_DATA_AVAILABLE: &str = "No data available";
/// Value recorded for a row whose search or extraction call failed.
pub const API_ERROR_OCCURRED: &str = "API error occurred";
/// Context sent to the model when the search produced no snippets.
pub const NO_RESULTS_FOUND: &str = "No results found";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub entity: String,
    pub prompt: String,
    pub snippets: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Search,
    Extraction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    pub stage: FailureStage,
    pub message: String,
}

/// What one row produced. Failures are values here, never early returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowOutcome {
    Extracted { value: String },
    NoData,
    Failed(RowFailure),
}

impl RowOutcome {
    /// Classify a trimmed model reply.
    pub fn from_reply(reply: String) -> Self {
        if reply.is_empty() || reply == NO_DATA_AVAILABLE {
            RowOutcome::NoData
        } else {
            RowOutcome::Extracted { value: reply }
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RowOutcome::Extracted { value } => value,
            RowOutcome::NoData => NO_DATA_AVAILABLE,
            RowOutcome::Failed(_) => API_ERROR_OCCURRED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entity: String,
    pub prompt: String,
    pub outcome: RowOutcome,
}

impl ExtractionResult {
    pub fn extracted_data(&self) -> &str {
        self.outcome.as_str()
    }

    pub fn failure(&self) -> Option<&RowFailure> {
        match &self.outcome {
            RowOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn record(&self) -> ResultRecord {
        ResultRecord {
            entity: self.entity.clone(),
            prompt: self.prompt.clone(),
            extracted_data: self.extracted_data().to_string(),
        }
    }
}

/// Flat export shape: exactly the three columns users download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub entity: String,
    pub prompt: String,
    pub extracted_data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_classification() {
        assert_eq!(RowOutcome::from_reply(String::new()), RowOutcome::NoData);
        assert_eq!(
            RowOutcome::from_reply(NO_DATA_AVAILABLE.to_string()),
            RowOutcome::NoData
        );
        assert_eq!(
            RowOutcome::from_reply("a@acme.test".to_string()).as_str(),
            "a@acme.test"
        );
    }

    #[test]
    fn test_failed_row_reads_as_sentinel() {
        let result = ExtractionResult {
            entity: "Acme".to_string(),
            prompt: "email of Acme".to_string(),
            outcome: RowOutcome::Failed(RowFailure {
                stage: FailureStage::Search,
                message: "timeout".to_string(),
            }),
        };

        assert_eq!(result.extracted_data(), API_ERROR_OCCURRED);
        assert_eq!(result.failure().map(|f| f.stage), Some(FailureStage::Search));
        assert_eq!(result.record().extracted_data, API_ERROR_OCCURRED);
    }
}
