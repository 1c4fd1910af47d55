//! Types shared by the survey client

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};

/// Prefix reserved for row metadata in the serialized form
pub const METADATA_PREFIX: char = ':';

/// Relation name under which a row's edit URL is stored
pub const EDIT_REL: &str = "edit";

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the survey backend
    pub base_url: String,
    /// Request timeout in milliseconds (default: 30000)
    pub timeout_ms: u64,
    /// CSRF token to send when the session cookie jar has none
    pub csrf_token: Option<String>,
    /// Access token from the sign-in provider
    pub access_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_ms: 30_000,
            csrf_token: None,
            access_token: None,
        }
    }
}

/// Which backend collection a sheet lookup goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetType {
    /// Per-survey answer data ("Answers", "Control", ...)
    Answers,
    /// Master question data ("Sections", "Questions")
    Questions,
}

/// One named sheet as returned by the backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sheet {
    /// Sheet type name, echoed back on insert
    #[serde(rename = "type", default)]
    pub sheet_type: String,
    /// Collection URL rows are inserted into
    #[serde(rename = "_url", default)]
    pub url: String,
    /// Raw row records
    #[serde(default)]
    pub data: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Sheet name -> sheet
pub type Sheets = HashMap<String, Sheet>;

/// A single row of a sheet.
///
/// Data columns and metadata live in separate maps, so a metadata key can
/// never shadow a real column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    /// Column name -> cell value
    pub columns: BTreeMap<String, String>,
    /// Relation name -> URL (`:links`)
    pub links: BTreeMap<String, String>,
    /// Row identifier (`:id`)
    pub id: Option<String>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cell value for a column, if present
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).map(String::as_str)
    }

    /// Cell value for a column, treating an empty cell as absent
    pub fn non_empty(&self, column: &str) -> Option<&str> {
        self.get(column).filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.columns.insert(column.into(), value.into());
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(column, value);
        self
    }

    /// URL this row can be updated or deleted at
    pub fn edit_link(&self) -> Option<&str> {
        self.links.get(EDIT_REL).map(String::as_str)
    }

    /// Whether a serialized key names row metadata rather than a column
    pub fn is_metadata_key(key: &str) -> bool {
        key.starts_with(METADATA_PREFIX)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let extra = 1 + usize::from(self.id.is_some());
        let mut map = serializer.serialize_map(Some(self.columns.len() + extra))?;
        for (column, value) in &self.columns {
            map.serialize_entry(column, value)?;
        }
        map.serialize_entry(":links", &self.links)?;
        if let Some(ref id) = self.id {
            map.serialize_entry(":id", id)?;
        }
        map.end()
    }
}

/// How a write was settled by the backend
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The backend applied the write and returned this body
    Applied(serde_json::Value),
    /// HTTP 409; treated as success, body passed through uninspected
    Conflict(String),
    /// The row was deleted
    Deleted { id: String },
}

impl WriteOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, WriteOutcome::Conflict(_))
    }

    /// Edit URL of the row the backend reports having written, if any
    pub fn row_url(&self) -> Option<&str> {
        match self {
            WriteOutcome::Applied(body) => body.get("_url").and_then(|v| v.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_serializes_metadata_with_prefix() {
        let mut row = Row::new().with("questionid", "q1");
        row.links.insert(EDIT_REL.to_string(), "/api/rows/1/".to_string());
        row.id = Some("1".to_string());

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["questionid"], "q1");
        assert_eq!(json[":links"]["edit"], "/api/rows/1/");
        assert_eq!(json[":id"], "1");
        assert!(Row::is_metadata_key(":links"));
        assert!(!Row::is_metadata_key("links"));
    }

    #[test]
    fn test_sheet_deserializes_backend_shape() {
        let sheet: Sheet = serde_json::from_value(serde_json::json!({
            "type": "Answers",
            "_url": "/api/survey/1/data/",
            "data": [{"questionid": "q1", "_url": "/api/survey/1/data/9/"}]
        }))
        .unwrap();

        assert_eq!(sheet.sheet_type, "Answers");
        assert_eq!(sheet.url, "/api/survey/1/data/");
        assert_eq!(sheet.data.len(), 1);
    }

    #[test]
    fn test_outcome_row_url() {
        let outcome = WriteOutcome::Applied(serde_json::json!({"_url": "/rows/3/"}));
        assert_eq!(outcome.row_url(), Some("/rows/3/"));
        assert!(!outcome.is_conflict());
        assert_eq!(WriteOutcome::Conflict(String::new()).row_url(), None);
    }
}
