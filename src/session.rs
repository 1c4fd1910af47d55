//! Survey session
//!
//! Loads the master question data and one survey's answers, routes edits
//! into the sync queue and runs the flush timer.

use crate::client::{RowWriter, SurveyClient};
use crate::error::{Result, SurveyError};
use crate::hierarchy::SurveyHierarchy;
use crate::responses::{Response, ResponseStore};
use crate::rows;
use crate::sync_queue::{spawn_flush_task, FlushReport, SyncConfig, SyncQueue};
use crate::types::{Row, Sheet, SheetType};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub const SECTIONS_SHEET: &str = "Sections";
pub const QUESTIONS_SHEET: &str = "Questions";
pub const ANSWERS_SHEET: &str = "Answers";
pub const CONTROL_SHEET: &str = "Control";

/// One user's survey editing session
pub struct SurveySession {
    hierarchy: SurveyHierarchy,
    store: Arc<Mutex<ResponseStore>>,
    queue: SyncQueue,
    answers: Option<Arc<Sheet>>,
    country: Option<String>,
}

impl SurveySession {
    /// Load sections and questions from the backend.
    ///
    /// `question_set` selects a named question set; `active_section`
    /// restores a previously visited section.
    pub async fn load(
        client: &SurveyClient,
        question_set: Option<&str>,
        active_section: Option<String>,
        sync: SyncConfig,
    ) -> Result<Self> {
        let sheets = client.resolve(question_set, SheetType::Questions).await?;

        let sections = sheets
            .get(SECTIONS_SHEET)
            .ok_or_else(|| SurveyError::MissingSheet(SECTIONS_SHEET.to_string()))?;
        let questions = match sheets.get(QUESTIONS_SHEET) {
            Some(sheet) => rows::from_sheet(sheet),
            None => {
                tracing::warn!("No '{}' sheet in question data", QUESTIONS_SHEET);
                Vec::new()
            }
        };

        Self::from_rows(&rows::from_sheet(sections), &questions, active_section, sync)
    }

    /// Build a session from already decoded rows
    pub fn from_rows(
        section_rows: &[Row],
        question_rows: &[Row],
        active_section: Option<String>,
        sync: SyncConfig,
    ) -> Result<Self> {
        let mut store = ResponseStore::new();
        let hierarchy =
            SurveyHierarchy::build(section_rows, question_rows, active_section, &mut store)?;
        store.mark_loaded();

        tracing::info!(
            sections = hierarchy.section_order.len(),
            questions = hierarchy.questions.len(),
            "Survey loaded"
        );

        Ok(Self {
            hierarchy,
            store: Arc::new(Mutex::new(store)),
            queue: SyncQueue::new(sync),
            answers: None,
            country: None,
        })
    }

    /// Load a survey's answer sheet; returns the number of answers read
    pub async fn load_answers(&mut self, client: &SurveyClient, answer_key: &str) -> Result<usize> {
        let sheets = client.resolve(Some(answer_key), SheetType::Answers).await?;

        let control = sheets
            .get(CONTROL_SHEET)
            .ok_or_else(|| SurveyError::MissingSheet(CONTROL_SHEET.to_string()))?;
        let answers = sheets
            .get(ANSWERS_SHEET)
            .ok_or_else(|| SurveyError::MissingSheet(ANSWERS_SHEET.to_string()))?;

        self.apply_answers(&rows::from_sheet(control), answers.clone()).await
    }

    /// Take the country from the first control row and populate responses
    pub async fn apply_answers(&mut self, control_rows: &[Row], answers: Sheet) -> Result<usize> {
        let country = control_rows
            .first()
            .and_then(|row| row.non_empty("country"))
            .ok_or(SurveyError::UnknownCountry)?;
        self.country = Some(country.to_string());

        let loaded = self.store.lock().await.load_answers(&rows::from_sheet(&answers));
        self.answers = Some(Arc::new(answers));

        tracing::info!(country = %country, answers = loaded, "Answers loaded");
        Ok(loaded)
    }

    /// Apply an edit and queue it for the next flush.
    ///
    /// Only questions of the loaded survey accept edits.
    pub async fn edit(&self, question_id: &str, update: Response) -> bool {
        if !self.hierarchy.questions.contains_key(question_id) {
            tracing::warn!("Dropping edit to unknown question '{}'", question_id);
            return false;
        }
        let change = self.store.lock().await.apply(question_id, update);
        match change {
            Some(change) => self.queue.record(change).await,
            None => false,
        }
    }

    /// Start flushing on the configured interval
    pub fn start_sync(&self, writer: Arc<dyn RowWriter>) -> Result<JoinHandle<()>> {
        let answers = self.answers_sheet()?;
        tracing::info!(
            interval_ms = self.queue.config().flush_interval_ms,
            "Starting answer sync"
        );
        Ok(spawn_flush_task(self.queue.clone(), self.store.clone(), writer, answers))
    }

    /// Flush right away, outside the timer
    pub async fn flush_now(&self, writer: Arc<dyn RowWriter>) -> Result<FlushReport> {
        let answers = self.answers_sheet()?;
        Ok(self.queue.flush(&self.store, writer, &answers).await)
    }

    fn answers_sheet(&self) -> Result<Arc<Sheet>> {
        self.answers
            .clone()
            .ok_or_else(|| SurveyError::MissingSheet(ANSWERS_SHEET.to_string()))
    }

    pub fn hierarchy(&self) -> &SurveyHierarchy {
        &self.hierarchy
    }

    pub fn hierarchy_mut(&mut self) -> &mut SurveyHierarchy {
        &mut self.hierarchy
    }

    pub fn store(&self) -> &Arc<Mutex<ResponseStore>> {
        &self.store
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    /// Sum of the integer responses in a section, sub-questions included
    pub async fn section_sum(&self, section: &str) -> i64 {
        let Some(section) = self.hierarchy.sections.get(section) else {
            return 0;
        };
        let store = self.store.lock().await;
        self.hierarchy.sum(&section.questions, &store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SurveySession {
        SurveySession::from_rows(
            &[Row::new().with("section", "A")],
            &[
                Row::new().with("questionid", "1").with("section", "A"),
                Row::new().with("questionid", "2").with("section", "A").with("parentid", "1"),
            ],
            None,
            SyncConfig::default(),
        )
        .unwrap()
    }

    fn answers_sheet() -> Sheet {
        serde_json::from_value(serde_json::json!({
            "type": "Answers",
            "_url": "/api/survey/1/data/",
            "data": [{"questionid": "2", "response": "4", "_url": "/api/survey/1/data/8/"}]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_edits_are_queued_after_load() {
        let session = session();
        let queued = session
            .edit(
                "1",
                Response {
                    response: Some("3".into()),
                    ..Default::default()
                },
            )
            .await;
        assert!(queued);
        assert_eq!(session.queue().pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_edit_to_unknown_question_is_dropped() {
        let session = session();
        let queued = session
            .edit(
                "typo-999",
                Response {
                    response: Some("oops".into()),
                    ..Default::default()
                },
            )
            .await;

        assert!(!queued);
        assert_eq!(session.queue().pending_count().await, 0);
        assert!(session.store().lock().await.get("typo-999").is_none());
    }

    #[tokio::test]
    async fn test_apply_answers() {
        let mut session = session();
        let control = [Row::new().with("country", "Kenya")];

        let loaded = session.apply_answers(&control, answers_sheet()).await.unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(session.country(), Some("Kenya"));

        let store = session.store().lock().await;
        assert_eq!(store.link("2").unwrap().edit(), Some("/api/survey/1/data/8/"));
    }

    #[tokio::test]
    async fn test_empty_control_sheet() {
        let mut session = session();
        let err = session.apply_answers(&[], answers_sheet()).await.unwrap_err();
        assert!(matches!(err, SurveyError::UnknownCountry));
        assert!(err.is_user_visible());
    }

    #[tokio::test]
    async fn test_section_sum() {
        let mut session = session();
        session
            .apply_answers(&[Row::new().with("country", "Kenya")], answers_sheet())
            .await
            .unwrap();
        session
            .edit(
                "1",
                Response {
                    response: Some("10".into()),
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(session.section_sum("A").await, 14);
        assert_eq!(session.section_sum("missing").await, 0);
    }

    #[test]
    fn test_sync_needs_answers() {
        let session = session();
        let writer: Arc<dyn RowWriter> = Arc::new(
            SurveyClient::new(crate::types::ClientConfig::default()).unwrap(),
        );
        let err = session.start_sync(writer).unwrap_err();
        assert!(matches!(err, SurveyError::MissingSheet(_)));
    }
}
