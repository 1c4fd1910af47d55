//! Row decoding
//!
//! Turns backend payloads into [`Row`] values. Two payload shapes are
//! understood: JSON row records from the REST backend (edit URL in `_url`)
//! and spreadsheet list-feed XML entries.

use crate::error::{Result, SurveyError};
use crate::types::{Row, Sheet, EDIT_REL};
use roxmltree::{Document, Node};
use std::collections::HashMap;

/// Namespace of the per-column elements in a list-feed entry
pub const EXTENDED_NS: &str = "http://schemas.google.com/spreadsheets/2006/extended";

/// Decode every record of a sheet
pub fn from_sheet(sheet: &Sheet) -> Vec<Row> {
    sheet.data.iter().map(from_record).collect()
}

/// Decode a single JSON row record.
///
/// Keys starting with `_` are backend metadata: `_url` becomes the edit
/// link and `_id` the row id. Everything else is a column.
pub fn from_record(record: &serde_json::Map<String, serde_json::Value>) -> Row {
    let mut row = Row::new();

    for (key, value) in record {
        match key.as_str() {
            "_url" => {
                if let Some(url) = value.as_str() {
                    row.links.insert(EDIT_REL.to_string(), url.to_string());
                }
            }
            "_id" => row.id = Some(cell_text(value)),
            k if k.starts_with('_') => {}
            _ => row.set(key.clone(), cell_text(value)),
        }
    }

    row
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Decode the entries of a list-feed XML document
pub fn from_list_feed(xml: &str) -> Result<Vec<Row>> {
    let doc = Document::parse(xml)
        .map_err(|e| SurveyError::MalformedRow(format!("list feed: {}", e)))?;

    doc.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "entry")
        .map(from_entry)
        .collect()
}

fn from_entry(entry: Node<'_, '_>) -> Result<Row> {
    let mut row = Row::new();
    let mut raw_id = None;

    for child in entry.children().filter(|n| n.is_element()) {
        let tag = child.tag_name();

        if tag.namespace() == Some(EXTENDED_NS) {
            row.set(tag.name(), text_content(child));
            continue;
        }

        match tag.name() {
            "link" => {
                if let (Some(rel), Some(href)) = (child.attribute("rel"), child.attribute("href")) {
                    row.links.insert(rel.to_string(), href.to_string());
                }
            }
            "id" if raw_id.is_none() => raw_id = Some(text_content(child)),
            _ => {}
        }
    }

    let raw_id = raw_id.ok_or_else(|| SurveyError::MalformedRow("entry without <id>".into()))?;
    row.id = Some(last_segment(&raw_id)?.to_string());

    Ok(row)
}

/// Concatenated text of all descendants, like DOM `textContent`
fn text_content(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

fn last_segment(raw: &str) -> Result<&str> {
    match raw.trim().rsplit_once('/') {
        Some((_, segment)) if !segment.is_empty() => Ok(segment),
        _ => Err(SurveyError::MalformedRow(format!("entry id '{}' has no path segment", raw))),
    }
}

/// Index rows by the value of `column`; rows without it are left out.
///
/// Later rows win when two share a key.
pub fn rows_by_key(rows: Vec<Row>, column: &str) -> HashMap<String, Row> {
    rows.into_iter()
        .filter_map(|row| {
            let key = row.get(column)?.to_string();
            Some((key, row))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"
      xmlns:gsx="http://schemas.google.com/spreadsheets/2006/extended">
  <entry>
    <id>https://spreadsheets.google.com/feeds/list/key/od6/private/full/cokwr</id>
    <link rel="self" href="https://example.com/self/cokwr"/>
    <link rel="edit" href="https://example.com/edit/cokwr/1"/>
    <gsx:questionid>q1</gsx:questionid>
    <gsx:response>Yes</gsx:response>
    <gsx:id>not-the-row-id</gsx:id>
  </entry>
  <entry>
    <id>https://spreadsheets.google.com/feeds/list/key/od6/private/full/cpzh4</id>
    <gsx:questionid>q2</gsx:questionid>
    <gsx:response></gsx:response>
  </entry>
</feed>"#;

    #[test]
    fn test_list_feed_entries() {
        let rows = from_list_feed(FEED).unwrap();
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(first.id.as_deref(), Some("cokwr"));
        assert_eq!(first.get("questionid"), Some("q1"));
        assert_eq!(first.get("response"), Some("Yes"));
        // Extended-namespace column named "id" is data, not the row id
        assert_eq!(first.get("id"), Some("not-the-row-id"));
        assert_eq!(first.edit_link(), Some("https://example.com/edit/cokwr/1"));
        assert_eq!(
            first.links.get("self").map(String::as_str),
            Some("https://example.com/self/cokwr")
        );

        let second = &rows[1];
        assert_eq!(second.id.as_deref(), Some("cpzh4"));
        assert_eq!(second.get("response"), Some(""));
        assert!(second.links.is_empty());
    }

    #[test]
    fn test_list_feed_entry_without_id_is_malformed() {
        let xml =
            r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry><title>x</title></entry></feed>"#;
        let err = from_list_feed(xml).unwrap_err();
        assert!(matches!(err, SurveyError::MalformedRow(_)));
    }

    #[test]
    fn test_list_feed_rejects_bad_xml() {
        assert!(matches!(from_list_feed("<feed>"), Err(SurveyError::MalformedRow(_))));
    }

    #[test]
    fn test_record_metadata() {
        let record = serde_json::json!({
            "_id": 42,
            "_url": "/api/survey/1/data/42/",
            "_private": "hidden",
            "questionid": "q7",
            "confidence": 3,
            "examples": null
        });
        let row = from_record(record.as_object().unwrap());

        assert_eq!(row.id.as_deref(), Some("42"));
        assert_eq!(row.edit_link(), Some("/api/survey/1/data/42/"));
        assert_eq!(row.get("questionid"), Some("q7"));
        assert_eq!(row.get("confidence"), Some("3"));
        assert_eq!(row.get("examples"), Some(""));
        assert_eq!(row.get("_private"), None);
        assert_eq!(row.get("_url"), None);
    }

    #[test]
    fn test_rows_by_key() {
        let rows = vec![
            Row::new().with("section", "A"),
            Row::new().with("title", "no key"),
            Row::new().with("section", "B"),
        ];
        let keyed = rows_by_key(rows, "section");
        assert_eq!(keyed.len(), 2);
        assert!(keyed.contains_key("A"));
        assert!(keyed.contains_key("B"));
    }
}
