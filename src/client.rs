//! HTTP client for the survey backend
//!
//! Resolves sheets and writes answer rows. Mutating calls carry the
//! `X-CSRFToken` header taken from the session's `csrftoken` cookie.

use crate::error::{Result, SurveyError};
use crate::request::Request;
use crate::rows;
use crate::types::*;
use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{header, Client, Method, StatusCode, Url};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Cookie the CSRF token is read from
pub const CSRF_COOKIE: &str = "csrftoken";

/// Header the CSRF token is sent in
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Row writes the sync queue depends on
#[async_trait]
pub trait RowWriter: Send + Sync {
    /// Replace the row at `url` with `values`
    async fn update(&self, url: &str, values: Value) -> Result<WriteOutcome>;

    /// Add a row to `sheet`
    async fn insert(&self, sheet: &Sheet, values: Value) -> Result<WriteOutcome>;

    /// Remove the row at `url`
    async fn delete(&self, url: &str, id: &str) -> Result<WriteOutcome>;
}

/// HTTP client for the survey backend
///
/// # Example
///
/// ```rust,no_run
/// use survey_sync::{ClientConfig, SheetType, SurveyClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = SurveyClient::new(ClientConfig {
///     base_url: "http://localhost:8000".into(),
///     ..Default::default()
/// })?;
///
/// let sheets = client.resolve(Some("42"), SheetType::Answers).await?;
/// # Ok(())
/// # }
/// ```
pub struct SurveyClient {
    config: ClientConfig,
    base_url: Url,
    client: Client,
    jar: Arc<Jar>,
}

impl SurveyClient {
    /// Create a new survey client
    pub fn new(config: ClientConfig) -> Result<Self> {
        // Relative paths join under the base path only with a trailing slash
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| {
            SurveyError::Config(format!("invalid base URL '{}': {}", config.base_url, e))
        })?;

        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = config.access_token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                SurveyError::Config("access token is not a valid header value".into())
            })?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .default_headers(headers)
            .cookie_provider(jar.clone())
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            config,
            base_url,
            client,
            jar,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// CSRF token from the session cookie, falling back to the configured one
    pub fn csrf_token(&self) -> Option<String> {
        self.jar
            .cookies(&self.base_url)
            .and_then(|value| value.to_str().ok().and_then(|s| cookie_value(s, CSRF_COOKIE)))
            .or_else(|| self.config.csrf_token.clone())
    }

    // ==================== Sheets ====================

    /// Fetch the sheets of a survey.
    ///
    /// Answer sheets need a survey key. For question data the key is an
    /// optional question-set name passed as `?name=`.
    pub fn resolve(&self, key: Option<&str>, sheet_type: SheetType) -> Request<Sheets> {
        let path = match (sheet_type, key) {
            (SheetType::Answers, Some(key)) => {
                format!("api/survey/{}/data/", urlencoding::encode(key))
            }
            (SheetType::Answers, None) => {
                let error = SurveyError::Config("answer sheets need a survey key".into());
                return Request::ready(Err(error));
            }
            (SheetType::Questions, Some(name)) => {
                format!("api/question-data/?name={}", urlencoding::encode(name))
            }
            (SheetType::Questions, None) => "api/question-data/".to_string(),
        };

        let url = match self.endpoint(&path) {
            Ok(url) => url,
            Err(e) => return Request::ready(Err(e)),
        };
        let client = self.client.clone();

        Request::new(async move {
            tracing::debug!("Resolving sheets from {}", url);
            let fetch = async {
                client
                    .get(url.clone())
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<Sheets>()
                    .await
            };
            fetch.await.map_err(|e| {
                tracing::warn!("Sheet fetch from {} failed: {}", url, e);
                SurveyError::AnswerDataUnavailable(e)
            })
        })
    }

    /// Fetch and decode the rows of one sheet by name
    pub async fn fetch_rows(
        &self,
        key: Option<&str>,
        sheet_type: SheetType,
        name: &str,
    ) -> Result<Vec<Row>> {
        let sheets = self.resolve(key, sheet_type).await?;
        let sheet = sheets
            .get(name)
            .ok_or_else(|| SurveyError::MissingSheet(name.to_string()))?;
        Ok(rows::from_sheet(sheet))
    }

    // ==================== Rows ====================

    /// PUT `values` to a row's edit URL
    pub fn update(&self, url: &str, values: Value) -> Request<WriteOutcome> {
        self.write(Method::PUT, url, Some(values), WriteKind::Row)
    }

    /// POST `values` to the sheet's collection URL, tagged with the sheet type
    pub fn insert(&self, sheet: &Sheet, mut values: Value) -> Request<WriteOutcome> {
        if let Some(object) = values.as_object_mut() {
            object.insert("type".to_string(), Value::String(sheet.sheet_type.clone()));
        }
        self.write(Method::POST, &sheet.url, Some(values), WriteKind::Row)
    }

    /// DELETE the row at `url`
    pub fn delete(&self, url: &str, id: &str) -> Request<WriteOutcome> {
        self.write(Method::DELETE, url, None, WriteKind::Delete(id.to_string()))
    }

    /// PUT an upload record to the row in `sheet` whose `id` matches
    pub fn update_upload(&self, sheet: &Sheet, upload: Value) -> Request<WriteOutcome> {
        let id = upload.get("id").map(id_text).unwrap_or_default();
        match upload_url(sheet, &id) {
            Some(url) => self.update(&url, upload),
            None => Request::ready(Err(missing_upload(&id))),
        }
    }

    /// DELETE the row in `sheet` whose `id` matches
    pub fn delete_upload(&self, sheet: &Sheet, id: &str) -> Request<WriteOutcome> {
        match upload_url(sheet, id) {
            Some(url) => self.delete(&url, id),
            None => Request::ready(Err(missing_upload(id))),
        }
    }

    // ==================== Helper Methods ====================

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| SurveyError::Config(format!("invalid URL '{}': {}", path, e)))
    }

    fn write(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
        kind: WriteKind,
    ) -> Request<WriteOutcome> {
        let url = match self.endpoint(url) {
            Ok(url) => url,
            Err(e) => return Request::ready(Err(e)),
        };

        let mut request = self.client.request(method.clone(), url.clone());
        match self.csrf_token() {
            Some(token) => request = request.header(CSRF_HEADER, token),
            None => tracing::debug!("No CSRF token available for {} {}", method, url),
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        Request::new(async move {
            let response = request.send().await?;
            let outcome = finish_write(response, kind).await;
            if let Err(ref e) = outcome {
                tracing::warn!("{} {} failed: {}", method, url, e);
            }
            outcome
        })
    }
}

enum WriteKind {
    Row,
    Delete(String),
}

async fn finish_write(response: reqwest::Response, kind: WriteKind) -> Result<WriteOutcome> {
    let status = response.status();

    // Conflict usually means nothing was going to change anyway
    if status == StatusCode::CONFLICT {
        let body = response.text().await.unwrap_or_default();
        tracing::debug!("Write conflict treated as success: {}", body);
        return Ok(WriteOutcome::Conflict(body));
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SurveyError::Backend {
            status: status.as_u16(),
            body,
        });
    }

    match kind {
        WriteKind::Delete(id) => Ok(WriteOutcome::Deleted { id }),
        WriteKind::Row => {
            let text = response.text().await?;
            if text.trim().is_empty() {
                return Ok(WriteOutcome::Applied(Value::Null));
            }
            let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
            Ok(WriteOutcome::Applied(body))
        }
    }
}

fn id_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn missing_upload(id: &str) -> SurveyError {
    SurveyError::MalformedRow(format!("no upload row with id '{}'", id))
}

fn upload_url(sheet: &Sheet, id: &str) -> Option<String> {
    sheet
        .data
        .iter()
        .find(|record| record.get("id").map(id_text).as_deref() == Some(id))
        .and_then(|record| record.get("_url"))
        .and_then(|url| url.as_str())
        .map(str::to_string)
}

/// Value of `name` in a `Cookie` header string
fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

#[async_trait]
impl RowWriter for SurveyClient {
    async fn update(&self, url: &str, values: Value) -> Result<WriteOutcome> {
        SurveyClient::update(self, url, values).await
    }

    async fn insert(&self, sheet: &Sheet, values: Value) -> Result<WriteOutcome> {
        SurveyClient::insert(self, sheet, values).await
    }

    async fn delete(&self, url: &str, id: &str) -> Result<WriteOutcome> {
        SurveyClient::delete(self, url, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_value() {
        let header = "sessionid=abc; csrftoken=tok123; other=x";
        assert_eq!(cookie_value(header, CSRF_COOKIE).as_deref(), Some("tok123"));
        assert_eq!(cookie_value("sessionid=abc", CSRF_COOKIE), None);
    }

    #[test]
    fn test_csrf_falls_back_to_config() {
        let client = SurveyClient::new(ClientConfig {
            csrf_token: Some("configured".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.csrf_token().as_deref(), Some("configured"));
    }

    #[test]
    fn test_invalid_base_url() {
        let result = SurveyClient::new(ClientConfig {
            base_url: "not a url".into(),
            ..Default::default()
        });
        assert!(matches!(result, Err(SurveyError::Config(_))));
    }

    #[test]
    fn test_base_path_is_kept() {
        let client = SurveyClient::new(ClientConfig {
            base_url: "http://host/survey".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            client.endpoint("api/question-data/").unwrap().as_str(),
            "http://host/survey/api/question-data/"
        );
        assert_eq!(
            client.endpoint("/api/survey/1/data/5/").unwrap().as_str(),
            "http://host/api/survey/1/data/5/"
        );
    }

    #[test]
    fn test_upload_url_lookup() {
        let sheet: Sheet = serde_json::from_value(serde_json::json!({
            "type": "Uploads",
            "_url": "/api/survey/1/data/",
            "data": [
                {"id": 4, "_url": "/api/survey/1/data/4/"},
                {"id": "doc-9", "_url": "/api/survey/1/data/9/"}
            ]
        }))
        .unwrap();

        assert_eq!(upload_url(&sheet, "4").as_deref(), Some("/api/survey/1/data/4/"));
        assert_eq!(upload_url(&sheet, "doc-9").as_deref(), Some("/api/survey/1/data/9/"));
        assert_eq!(upload_url(&sheet, "missing"), None);
    }

    #[tokio::test]
    async fn test_answers_without_key_is_config_error() {
        let client = SurveyClient::new(ClientConfig::default()).unwrap();
        let err = client.resolve(None, SheetType::Answers).await.unwrap_err();
        assert!(matches!(err, SurveyError::Config(_)));
    }
}
