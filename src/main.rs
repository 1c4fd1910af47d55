//! survey-sync - headless survey client
//!
//! Loads a survey, then reads answer edits from stdin as JSON lines
//! (`{"questionid": "q1", "response": "Yes"}`) and syncs them to the backend.

use clap::Parser;
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use survey_sync::{
    config::Args, AuthState, Authenticator, Response, RowWriter, StaticToken, SurveyClient,
    SurveySession,
};

/// One line of edit input
#[derive(Debug, Deserialize)]
struct EditLine {
    questionid: String,
    #[serde(flatten)]
    values: Response,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("survey_sync={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("Backend: {}", args.base_url);
    info!("Answer key: {}", args.answer_key.as_deref().unwrap_or("(none)"));
    info!("Flush interval: {}ms", args.flush_interval_ms);

    let authenticator = StaticToken::new(args.access_token.clone());
    let auth = authenticator.authorize(&args.auth_config(), true).await;
    let access_token = match auth.evaluate(None) {
        AuthState::Authenticated(token) => Some(token.0),
        AuthState::ShowSignIn => {
            error!("Sign-in failed");
            std::process::exit(1);
        }
        AuthState::Unchanged => {
            warn!("No access token configured, continuing anonymously");
            None
        }
    };

    let client = Arc::new(SurveyClient::new(args.client_config(access_token))?);

    let mut session = match SurveySession::load(
        &client,
        args.question_set.as_deref(),
        args.section.clone(),
        args.sync_config(),
    )
    .await
    {
        Ok(session) => session,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    for key in &session.hierarchy().section_order {
        let count = session.hierarchy().sections.get(key).map_or(0, |s| s.questions.len());
        info!("  section {}: {} top-level question(s)", key, count);
    }

    // Without an answer key there is nothing to edit
    let Some(answer_key) = args.answer_key.clone() else {
        return Ok(());
    };

    if let Err(e) = session.load_answers(&client, &answer_key).await {
        error!("{}", e);
        std::process::exit(1);
    }

    let writer: Arc<dyn RowWriter> = client.clone();
    let sync = session.start_sync(writer.clone())?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => match serde_json::from_str::<EditLine>(&line) {
                        Ok(edit) => {
                            session.edit(&edit.questionid, edit.values).await;
                        }
                        Err(e) => warn!("Ignoring malformed edit line: {}", e),
                    },
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    sync.abort();

    // Send whatever is still queued before exiting
    session.flush_now(writer).await?.join().await;
    info!("Answer sync stopped");

    Ok(())
}
