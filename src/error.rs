//! Error types for the survey client

use thiserror::Error;

/// Result type for survey operations
pub type Result<T> = std::result::Result<T, SurveyError>;

/// Survey client error
#[derive(Debug, Error)]
pub enum SurveyError {
    /// Sheet data could not be fetched or decoded
    #[error("Unable to access answer data")]
    AnswerDataUnavailable(#[source] reqwest::Error),

    /// A sheet the survey needs is absent from the resolved sheets
    #[error("{}", missing_sheet_message(.0))]
    MissingSheet(String),

    /// The control sheet carries no rows to read the country from
    #[error("Couldn't determine country!")]
    UnknownCountry,

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend rejected a write; `body` is the raw payload
    #[error("Backend error {status}: {body}")]
    Backend { status: u16, body: String },

    /// The request was aborted through its handle
    #[error("cancelled")]
    Cancelled,

    /// A row violates the sheet conventions (supporting grammar, parent links, XML shape)
    #[error("Malformed row: {0}")]
    MalformedRow(String),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SurveyError {
    /// True when the request was aborted rather than failing
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SurveyError::Cancelled)
    }

    /// Errors worth surfacing to whoever is filling in the survey.
    ///
    /// Cancellation never is.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            SurveyError::AnswerDataUnavailable(_)
                | SurveyError::MissingSheet(_)
                | SurveyError::UnknownCountry
        )
    }
}

fn missing_sheet_message(sheet: &str) -> String {
    match sheet {
        "Control" => "Couldn't find control sheet".to_string(),
        "Answers" => "Couldn't find answers sheet".to_string(),
        other => format!("Couldn't find '{}' sheet!", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_sheet_messages() {
        assert_eq!(
            SurveyError::MissingSheet("Control".into()).to_string(),
            "Couldn't find control sheet"
        );
        assert_eq!(
            SurveyError::MissingSheet("Answers".into()).to_string(),
            "Couldn't find answers sheet"
        );
        assert_eq!(
            SurveyError::MissingSheet("Sections".into()).to_string(),
            "Couldn't find 'Sections' sheet!"
        );
    }

    #[test]
    fn test_cancellation_is_not_user_visible() {
        let err = SurveyError::Cancelled;
        assert!(err.is_cancelled());
        assert!(!err.is_user_visible());

        let err = SurveyError::UnknownCountry;
        assert!(!err.is_cancelled());
        assert!(err.is_user_visible());
    }
}
