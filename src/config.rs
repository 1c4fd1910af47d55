//! Configuration for survey-sync
//!
//! CLI arguments and environment variable handling using clap.

use crate::auth::AuthConfig;
use crate::sync_queue::SyncConfig;
use crate::types::ClientConfig;
use clap::Parser;

/// survey-sync - load a survey and keep its answers in sync
#[derive(Parser, Debug, Clone)]
#[command(name = "survey-sync")]
#[command(about = "Load a survey and sync answer edits read from stdin")]
pub struct Args {
    /// Base URL of the survey backend
    #[arg(long, env = "SURVEY_BASE_URL", default_value = "http://localhost:8000")]
    pub base_url: String,

    /// Survey whose answers to load and edit; without it only questions are loaded
    #[arg(long, env = "ANSWER_KEY")]
    pub answer_key: Option<String>,

    /// Named question set (sent as `?name=`)
    #[arg(long, env = "QUESTION_SET")]
    pub question_set: Option<String>,

    /// Section to open first
    #[arg(long, env = "SURVEY_SECTION")]
    pub section: Option<String>,

    /// Answer flush interval in milliseconds
    #[arg(long, env = "FLUSH_INTERVAL_MS", default_value = "3000")]
    pub flush_interval_ms: u64,

    /// Request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// CSRF token to use until the backend sets the csrftoken cookie
    #[arg(long, env = "CSRF_TOKEN")]
    pub csrf_token: Option<String>,

    /// Access token from the sign-in provider
    #[arg(long, env = "ACCESS_TOKEN")]
    pub access_token: Option<String>,

    /// OAuth client id of the sign-in provider
    #[arg(long, env = "OAUTH_CLIENT_ID", default_value = "")]
    pub oauth_client_id: String,

    /// OAuth scope requested from the sign-in provider
    #[arg(long, env = "OAUTH_SCOPE", default_value = "survey")]
    pub oauth_scope: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(format!("SURVEY_BASE_URL must be an http(s) URL, got '{}'", self.base_url));
        }

        if self.flush_interval_ms == 0 {
            return Err("FLUSH_INTERVAL_MS must be greater than zero".to_string());
        }

        if self.request_timeout_ms == 0 {
            return Err("REQUEST_TIMEOUT_MS must be greater than zero".to_string());
        }

        if matches!(self.answer_key.as_deref(), Some(key) if key.trim().is_empty()) {
            return Err("ANSWER_KEY must not be blank".to_string());
        }

        Ok(())
    }

    pub fn client_config(&self, access_token: Option<String>) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            timeout_ms: self.request_timeout_ms,
            csrf_token: self.csrf_token.clone(),
            access_token,
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            flush_interval_ms: self.flush_interval_ms,
        }
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            client_id: self.oauth_client_id.clone(),
            scope: self.oauth_scope.clone(),
        }
    }
}
