//! Response store
//!
//! Current answer fields per question, plus the edit links of answer rows
//! that already exist on the backend.

use crate::types::{Row, EDIT_REL};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Answer fields for one question.
///
/// A field is "populated" once it has been set, even to an empty string,
/// so clearing an answer still reaches the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<String>,
    /// Other columns carried by a loaded answer row
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl Response {
    /// True if at least one field has been set
    pub fn is_populated(&self) -> bool {
        self.response.is_some()
            || self.justification.is_some()
            || self.confidence.is_some()
            || self.examples.is_some()
            || !self.extra.is_empty()
    }

    /// Set a field by column name
    pub fn set_field(&mut self, column: &str, value: String) {
        match column {
            "response" => self.response = Some(value),
            "justification" => self.justification = Some(value),
            "confidence" => self.confidence = Some(value),
            "examples" => self.examples = Some(value),
            other => {
                self.extra.insert(other.to_string(), value);
            }
        }
    }

    /// Overlay every field set in `update`
    pub fn merge(&mut self, update: Response) {
        if update.response.is_some() {
            self.response = update.response;
        }
        if update.justification.is_some() {
            self.justification = update.justification;
        }
        if update.confidence.is_some() {
            self.confidence = update.confidence;
        }
        if update.examples.is_some() {
            self.examples = update.examples;
        }
        self.extra.extend(update.extra);
    }
}

/// Body sent to the backend for one answer row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub examples: Option<String>,
    pub questionid: String,
}

impl AnswerPayload {
    /// The four answer fields of `response`; extra columns are never sent
    pub fn new(question_id: &str, response: &Response) -> Self {
        Self {
            response: response.response.clone(),
            justification: response.justification.clone(),
            confidence: response.confidence.clone(),
            examples: response.examples.clone(),
            questionid: question_id.to_string(),
        }
    }
}

/// Links of the answer row backing a question
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseLink {
    pub links: BTreeMap<String, String>,
}

impl ResponseLink {
    pub fn edit(&self) -> Option<&str> {
        self.links.get(EDIT_REL).map(String::as_str)
    }

    pub fn from_edit_url(url: impl Into<String>) -> Self {
        let mut links = BTreeMap::new();
        links.insert(EDIT_REL.to_string(), url.into());
        Self { links }
    }
}

/// A mutation to forward to the sync queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseChange {
    pub question_id: String,
    /// Full response after the mutation
    pub values: Response,
}

/// Responses and response links by question id
#[derive(Debug, Default)]
pub struct ResponseStore {
    responses: HashMap<String, Response>,
    links: HashMap<String, ResponseLink>,
    loaded: bool,
}

impl ResponseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a response entry exists for the question
    pub fn ensure(&mut self, question_id: &str) -> &mut Response {
        self.responses.entry(question_id.to_string()).or_default()
    }

    pub fn get(&self, question_id: &str) -> Option<&Response> {
        self.responses.get(question_id)
    }

    pub fn link(&self, question_id: &str) -> Option<&ResponseLink> {
        self.links.get(question_id)
    }

    pub fn set_link(&mut self, question_id: &str, link: ResponseLink) {
        self.links.insert(question_id.to_string(), link);
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Once loaded, mutations produce change events
    pub fn mark_loaded(&mut self) {
        self.loaded = true;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Apply an edit to a registered question; returns the change to queue
    /// once the survey is loaded. Unregistered ids are left untouched.
    pub fn apply(&mut self, question_id: &str, update: Response) -> Option<ResponseChange> {
        let Some(response) = self.responses.get_mut(question_id) else {
            tracing::warn!("Ignoring edit to unregistered question '{}'", question_id);
            return None;
        };
        response.merge(update);
        let values = response.clone();

        if !self.loaded {
            return None;
        }

        Some(ResponseChange {
            question_id: question_id.to_string(),
            values,
        })
    }

    /// Populate responses and links from fetched answer rows
    pub fn load_answers(&mut self, rows: &[Row]) -> usize {
        let mut loaded = 0;

        for row in rows {
            let Some(question_id) = row.non_empty("questionid") else {
                tracing::debug!("Skipping answer row without questionid: {:?}", row.id);
                continue;
            };

            self.links.insert(
                question_id.to_string(),
                ResponseLink {
                    links: row.links.clone(),
                },
            );

            let response = self.ensure(question_id);
            for (column, value) in &row.columns {
                response.set_field(column, value.clone());
            }
            loaded += 1;
        }

        loaded
    }
}
