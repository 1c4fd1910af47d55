//! Survey hierarchy
//!
//! Rebuilds sections -> questions -> sub-questions from flat sheet rows and
//! decodes the numbered `optionN` / `guidanceN` / `supportingN` columns into
//! ordered entry lists.

use crate::error::{Result, SurveyError};
use crate::responses::ResponseStore;
use crate::types::Row;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Highest column number scanned for repeated fields
pub const MAX_FIELD_INDEX: u8 = 10;

/// One decoded `optionN` / `guidanceN` / `supportingN` cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    /// Column number N
    pub weight: u8,
    /// Source column name, e.g. `option3`
    pub id: String,
    pub content: String,
    /// Option values a supporting entry applies to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<u32>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub key: String,
    pub row: Row,
    /// Top-level question ids in display order
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Question {
    pub id: String,
    pub parent_id: Option<String>,
    pub section: String,
    pub row: Row,
    pub option: Vec<Entry>,
    pub guidance: Vec<Entry>,
    pub supporting: Vec<Entry>,
    /// Child question ids in row order
    pub subquestions: Vec<String>,
}

/// The loaded survey form
#[derive(Debug, Clone, Default, Serialize)]
pub struct SurveyHierarchy {
    pub section_order: Vec<String>,
    pub sections: HashMap<String, Section>,
    pub questions: HashMap<String, Question>,
    pub active_section: Option<String>,
}

impl SurveyHierarchy {
    /// Build the hierarchy and register an empty response per question.
    ///
    /// Questions are registered first and linked afterwards, so a child row
    /// may precede its parent.
    pub fn build(
        section_rows: &[Row],
        question_rows: &[Row],
        active_section: Option<String>,
        responses: &mut ResponseStore,
    ) -> Result<Self> {
        let mut hierarchy = SurveyHierarchy {
            active_section,
            ..Default::default()
        };

        for row in section_rows {
            hierarchy.add_section(row);
        }

        let mut registered = Vec::with_capacity(question_rows.len());
        for row in question_rows {
            if let Some(id) = hierarchy.register_question(row)? {
                responses.ensure(&id);
                registered.push(id);
            }
        }

        for id in &registered {
            hierarchy.link_question(id)?;
        }
        for id in &registered {
            hierarchy.check_ancestry(id)?;
        }

        tracing::debug!(
            sections = hierarchy.section_order.len(),
            questions = hierarchy.questions.len(),
            "Built survey hierarchy"
        );

        Ok(hierarchy)
    }

    fn add_section(&mut self, row: &Row) {
        let Some(key) = row.non_empty("section") else {
            tracing::debug!("Skipping section row without a key");
            return;
        };

        if self.sections.contains_key(key) {
            tracing::warn!("Duplicate section '{}' ignored", key);
            return;
        }

        self.section_order.push(key.to_string());
        if self.active_section.is_none() {
            self.active_section = Some(key.to_string());
        }

        self.sections.insert(
            key.to_string(),
            Section {
                key: key.to_string(),
                row: row.clone(),
                questions: Vec::new(),
            },
        );
    }

    fn register_question(&mut self, row: &Row) -> Result<Option<String>> {
        let section = row.get("section").unwrap_or_default();
        if !self.sections.contains_key(section) {
            tracing::debug!(
                "Dropping question {:?} of unknown section '{}'",
                row.get("questionid"),
                section
            );
            return Ok(None);
        }

        let Some(id) = row.non_empty("questionid") else {
            tracing::debug!("Dropping question row without questionid in section '{}'", section);
            return Ok(None);
        };

        if self.questions.contains_key(id) {
            tracing::warn!("Duplicate question '{}' ignored", id);
            return Ok(None);
        }

        let mut supporting = numbered_entries(row, "supporting");
        for entry in &mut supporting {
            parse_supporting(entry)?;
        }

        let question = Question {
            id: id.to_string(),
            parent_id: row.non_empty("parentid").map(str::to_string),
            section: section.to_string(),
            row: row.clone(),
            option: numbered_entries(row, "option"),
            guidance: numbered_entries(row, "guidance"),
            supporting,
            subquestions: Vec::new(),
        };

        self.questions.insert(question.id.clone(), question);
        Ok(Some(id.to_string()))
    }

    fn link_question(&mut self, id: &str) -> Result<()> {
        let (parent_id, section) = match self.questions.get(id) {
            Some(q) => (q.parent_id.clone(), q.section.clone()),
            None => return Ok(()),
        };

        match parent_id {
            Some(parent_id) => {
                if parent_id == id {
                    let message = format!("question '{}' is its own parent", id);
                    return Err(SurveyError::MalformedRow(message));
                }
                let parent = self.questions.get_mut(&parent_id).ok_or_else(|| {
                    SurveyError::MalformedRow(format!(
                        "question '{}' references unknown parent '{}'",
                        id, parent_id
                    ))
                })?;
                parent.subquestions.push(id.to_string());
            }
            None => {
                if let Some(section) = self.sections.get_mut(&section) {
                    section.questions.push(id.to_string());
                }
            }
        }

        Ok(())
    }

    /// Walk up from `id` and fail if a parent chain loops back on itself
    fn check_ancestry(&self, id: &str) -> Result<()> {
        let mut seen = HashSet::new();
        let mut current = Some(id);

        while let Some(question_id) = current {
            if !seen.insert(question_id) {
                return Err(SurveyError::MalformedRow(format!(
                    "question '{}' is part of a parentid cycle",
                    id
                )));
            }
            current = self.questions.get(question_id).and_then(|q| q.parent_id.as_deref());
        }

        Ok(())
    }

    /// Switch the active section; unknown keys are ignored
    pub fn navigate(&mut self, section: &str) -> bool {
        if !self.sections.contains_key(section) {
            return false;
        }
        self.active_section = Some(section.to_string());
        true
    }

    /// Top-level questions of a section, in display order
    pub fn section_questions(&self, section: &str) -> Vec<&Question> {
        self.sections
            .get(section)
            .map(|s| s.questions.iter().filter_map(|id| self.questions.get(id)).collect())
            .unwrap_or_default()
    }

    /// Sum the integer responses of the given questions and all their
    /// sub-questions. Responses without a leading integer count as zero.
    pub fn sum(&self, question_ids: &[String], responses: &ResponseStore) -> i64 {
        question_ids
            .iter()
            .filter_map(|id| self.questions.get(id))
            .map(|question| {
                let own = responses
                    .get(&question.id)
                    .and_then(|r| r.response.as_deref())
                    .and_then(leading_integer)
                    .unwrap_or(0);
                own + self.sum(&question.subquestions, responses)
            })
            .sum()
    }
}

/// Collect non-empty `{field}0` ..= `{field}10` cells in ascending order
fn numbered_entries(row: &Row, field: &str) -> Vec<Entry> {
    (0..=MAX_FIELD_INDEX)
        .filter_map(|n| {
            let id = format!("{}{}", field, n);
            let content = row.non_empty(&id)?.to_string();
            Some(Entry {
                weight: n,
                id,
                content,
                values: None,
            })
        })
        .collect()
}

fn supporting_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)^\s*(?:(\d+(?:\s*,\s*\d+)*)\s*;)?\s*(.+?)\s*$")
            .expect("supporting pattern is valid")
    })
}

/// Split an optional `"1,2;"` prefix off a supporting entry into `values`.
///
/// Numbers too large for an option value are skipped with a warning.
fn parse_supporting(entry: &mut Entry) -> Result<()> {
    let malformed = || SurveyError::MalformedRow(format!("{} = {:?}", entry.id, entry.content));

    let captures = supporting_pattern().captures(&entry.content).ok_or_else(malformed)?;

    let values = captures.get(1).map(|prefix| {
        prefix
            .as_str()
            .split(',')
            .map(str::trim)
            .filter_map(|v| match v.parse::<u32>() {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!("Skipping option value '{}' in {}: {}", v, entry.id, e);
                    None
                }
            })
            .collect::<Vec<_>>()
    });
    let content = captures.get(2).ok_or_else(malformed)?.as_str().to_string();

    entry.values = values;
    entry.content = content;
    Ok(())
}

/// Leading integer of a string, the way a lenient form field reads it
fn leading_integer(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let digits_start = usize::from(text.starts_with(['-', '+']));
    let digits_end = text[digits_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(text.len(), |i| i + digits_start);

    if digits_end == digits_start {
        return None;
    }
    text[..digits_end].parse().ok()
}
