//! survey-sync - survey client for a tabular REST backend
//!
//! Loads survey sections, questions and answers from sheet-shaped backend
//! data, rebuilds the question hierarchy, and keeps answer edits in sync.
//!
//! # Architecture
//!
//! - **Rows**: backend records (JSON or list-feed XML) -> [`Row`]
//! - **Hierarchy**: sections -> questions -> sub-questions
//! - **Responses**: current answers and the edit links of existing answer rows
//! - **Sync queue**: last-write-wins per question, flushed on a fixed tick
//! - **Client**: sheet resolution and CSRF-protected row writes
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use survey_sync::{ClientConfig, Response, SurveyClient, SurveySession, SyncConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(SurveyClient::new(ClientConfig::default())?);
//!
//! let mut session = SurveySession::load(&client, None, None, SyncConfig::default()).await?;
//! session.load_answers(&client, "42").await?;
//!
//! let sync = session.start_sync(client.clone())?;
//!
//! session.edit("q1", Response {
//!     response: Some("Yes".into()),
//!     ..Default::default()
//! }).await;
//! # sync.abort();
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod request;
pub mod responses;
pub mod rows;
pub mod session;
pub mod sync_queue;
pub mod types;

// Re-export main types
pub use auth::{AccessToken, AuthConfig, AuthResult, AuthState, Authenticator, StaticToken};
pub use client::{RowWriter, SurveyClient};
pub use error::{Result, SurveyError};
pub use hierarchy::{Entry, Question, Section, SurveyHierarchy};
pub use request::Request;
pub use responses::{Response, ResponseChange, ResponseLink, ResponseStore};
pub use session::SurveySession;
pub use sync_queue::{Dispatch, FlushReport, SyncConfig, SyncQueue};
pub use types::*;
