//! Sign-in collaborator interface
//!
//! The OAuth provider itself lives outside this crate. What the survey needs
//! from it is an access token, obtained with explicit configuration.

use async_trait::async_trait;

/// OAuth client settings handed to the sign-in provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub client_id: String,
    pub scope: String,
}

/// Bearer token issued by the sign-in provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken(pub String);

impl AccessToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// What the provider reports back after an authorization attempt
#[derive(Debug, Clone, Default)]
pub struct AuthResult {
    pub error: Option<String>,
    pub signed_in: bool,
    pub access_token: Option<String>,
}

/// How the session should react to an [`AuthResult`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Authorization failed; offer the sign-in button
    ShowSignIn,
    /// Nothing to do (not signed in yet, or already holding a token)
    Unchanged,
    /// Proceed with loading the survey
    Authenticated(AccessToken),
}

impl AuthResult {
    pub fn evaluate(&self, current: Option<&AccessToken>) -> AuthState {
        if self.error.is_some() {
            return AuthState::ShowSignIn;
        }
        if !self.signed_in || current.is_some() {
            return AuthState::Unchanged;
        }
        match self.access_token {
            Some(ref token) if !token.is_empty() => {
                AuthState::Authenticated(AccessToken(token.clone()))
            }
            _ => AuthState::ShowSignIn,
        }
    }
}

/// Source of access tokens
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Attempt authorization; `immediate` means without prompting the user
    async fn authorize(&self, config: &AuthConfig, immediate: bool) -> AuthResult;
}

/// Authenticator for a token obtained out of band
#[derive(Debug, Clone, Default)]
pub struct StaticToken {
    token: Option<String>,
}

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

#[async_trait]
impl Authenticator for StaticToken {
    async fn authorize(&self, config: &AuthConfig, _immediate: bool) -> AuthResult {
        tracing::debug!(client_id = %config.client_id, "Using preconfigured access token");
        AuthResult {
            error: None,
            signed_in: self.token.is_some(),
            access_token: self.token.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate() {
        let failed = AuthResult {
            error: Some("access_denied".into()),
            ..Default::default()
        };
        assert_eq!(failed.evaluate(None), AuthState::ShowSignIn);

        assert_eq!(AuthResult::default().evaluate(None), AuthState::Unchanged);

        let ok = AuthResult {
            error: None,
            signed_in: true,
            access_token: Some("tok".into()),
        };
        assert_eq!(ok.evaluate(None), AuthState::Authenticated(AccessToken("tok".into())));

        let held = AccessToken("old".into());
        assert_eq!(ok.evaluate(Some(&held)), AuthState::Unchanged);
    }

    #[tokio::test]
    async fn test_static_token() {
        let config = AuthConfig {
            client_id: "client".into(),
            scope: "survey".into(),
        };
        let result = StaticToken::new(Some("abc".into())).authorize(&config, true).await;
        assert_eq!(result.evaluate(None), AuthState::Authenticated(AccessToken("abc".into())));

        let result = StaticToken::new(None).authorize(&config, true).await;
        assert_eq!(result.evaluate(None), AuthState::Unchanged);
    }
}
