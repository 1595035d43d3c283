//! OAuth 2.0 installed-application credentials for Google Drive.
//!
//! [`OAuthAuthenticator`] keeps a [`StoredToken`] on disk. On
//! [`authorize`](OAuthAuthenticator::authorize) it reuses a valid token,
//! refreshes an expired one, or runs the browser consent flow and captures
//! the redirect on a local port.
//!
//! This module is only available when the `drive` feature is enabled.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{RagError, Result};

/// Read-only Drive scope.
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Something that can hand out a bearer token for the file-storage API.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Return a currently valid access token.
    async fn access_token(&self) -> Result<String>;
}

/// The only observable state of the persisted credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    /// A usable or refreshable token is available.
    Valid,
    /// The user has to go through the consent flow.
    NeedsReauth,
}

/// OAuth client registration, as downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ClientSecrets {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    #[serde(default)]
    pub client_secret: String,
    /// Authorization endpoint.
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    /// Token endpoint.
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Parse a `credentials.json` document (`installed` or `web` section).
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(json).map_err(|e| {
            RagError::AuthenticationError(format!("invalid client secrets file: {e}"))
        })?;
        file.installed.or(file.web).ok_or_else(|| {
            RagError::AuthenticationError(
                "client secrets file has neither an 'installed' nor a 'web' section".into(),
            )
        })
    }

    /// Read and parse a `credentials.json` file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            RagError::AuthenticationError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }
}

/// An access token with its refresh token and expiry, as persisted on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredToken {
    /// Bearer token.
    pub access_token: String,
    /// Long-lived refresh token, if one was granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry instant of the access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl StoredToken {
    /// Whether the access token can still be used at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => now + Duration::seconds(EXPIRY_SKEW_SECS) < expires_at,
            None => true,
        }
    }

    /// Whether the token can be refreshed without user interaction.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_stored(self, previous_refresh: Option<String>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
            scope: self.scope,
        }
    }
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Installed-application OAuth flow with a persisted token file.
pub struct OAuthAuthenticator {
    secrets: ClientSecrets,
    token_path: PathBuf,
    redirect_port: u16,
    open_browser: bool,
    http: reqwest::Client,
    token: Mutex<Option<StoredToken>>,
}

impl OAuthAuthenticator {
    /// Create an authenticator persisting its token at `token_path`.
    pub fn new(secrets: ClientSecrets, token_path: impl Into<PathBuf>) -> Self {
        Self {
            secrets,
            token_path: token_path.into(),
            redirect_port: 8000,
            open_browser: true,
            http: reqwest::Client::new(),
            token: Mutex::new(None),
        }
    }

    /// Set the local port the consent redirect is captured on.
    pub fn with_redirect_port(mut self, port: u16) -> Self {
        self.redirect_port = port;
        self
    }

    /// Whether to try launching a browser for the consent page.
    pub fn with_open_browser(mut self, open: bool) -> Self {
        self.open_browser = open;
        self
    }

    /// Report whether a usable or refreshable token exists, without network access.
    pub async fn status(&self) -> CredentialStatus {
        let mut cached = self.token.lock().await;
        if cached.is_none() {
            *cached = self.load_token().await;
        }
        match cached.as_ref() {
            Some(token) if token.is_valid_at(Utc::now()) || token.can_refresh() => {
                CredentialStatus::Valid
            }
            _ => CredentialStatus::NeedsReauth,
        }
    }

    /// Make sure a valid token is available, refreshing or running the
    /// consent flow as needed, and persist it.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::AuthenticationError`] if refresh and consent both fail.
    pub async fn authorize(&self) -> Result<()> {
        let mut cached = self.token.lock().await;
        if cached.is_none() {
            *cached = self.load_token().await;
        }

        if let Some(token) = cached.clone() {
            if token.is_valid_at(Utc::now()) {
                debug!(path = %self.token_path.display(), "using stored token");
                return Ok(());
            }
            if token.can_refresh() {
                match self.refresh(&token).await {
                    Ok(fresh) => {
                        self.save_token(&fresh).await?;
                        *cached = Some(fresh);
                        return Ok(());
                    }
                    Err(e) => warn!(error = %e, "token refresh failed, falling back to consent"),
                }
            }
        }

        let fresh = self.run_consent_flow().await?;
        self.save_token(&fresh).await?;
        *cached = Some(fresh);
        Ok(())
    }

    async fn load_token(&self) -> Option<StoredToken> {
        let json = tokio::fs::read_to_string(&self.token_path).await.ok()?;
        match serde_json::from_str(&json) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(path = %self.token_path.display(), error = %e, "ignoring unreadable token file");
                None
            }
        }
    }

    async fn save_token(&self, token: &StoredToken) -> Result<()> {
        let json = serde_json::to_string_pretty(token)
            .map_err(|e| RagError::AuthenticationError(format!("cannot encode token: {e}")))?;
        tokio::fs::write(&self.token_path, json).await.map_err(|e| {
            RagError::AuthenticationError(format!(
                "cannot write {}: {e}",
                self.token_path.display()
            ))
        })?;
        debug!(path = %self.token_path.display(), "saved token");
        Ok(())
    }

    async fn refresh(&self, token: &StoredToken) -> Result<StoredToken> {
        let refresh_token = token.refresh_token.clone().unwrap_or_default();
        info!("refreshing Google Drive access token");
        let response = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
            ])
            .await?;
        Ok(response.into_stored(Some(refresh_token)))
    }

    fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/", self.redirect_port)
    }

    /// The consent page URL the user has to visit.
    pub fn authorization_url(&self) -> Result<Url> {
        Url::parse_with_params(
            &self.secrets.auth_uri,
            &[
                ("client_id", self.secrets.client_id.as_str()),
                ("redirect_uri", self.redirect_uri().as_str()),
                ("response_type", "code"),
                ("scope", DRIVE_READONLY_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| RagError::AuthenticationError(format!("invalid auth_uri: {e}")))
    }

    async fn run_consent_flow(&self) -> Result<StoredToken> {
        let auth_url = self.authorization_url()?;
        let listener = TcpListener::bind(("127.0.0.1", self.redirect_port)).await.map_err(|e| {
            RagError::AuthenticationError(format!(
                "cannot listen for the OAuth redirect on port {}: {e}",
                self.redirect_port
            ))
        })?;

        println!("Please visit this URL to authorize access to Google Drive:\n\n{auth_url}\n");
        if self.open_browser {
            open_in_browser(auth_url.as_str());
        }

        let code = capture_redirect(listener).await?;
        let redirect_uri = self.redirect_uri();
        let response = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
            ])
            .await?;
        info!("Google Drive authorization granted");
        Ok(response.into_stored(None))
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response =
            self.http.post(&self.secrets.token_uri).form(form).send().await.map_err(|e| {
                RagError::AuthenticationError(format!("token request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| match e.error_description {
                    Some(description) => format!("{}: {description}", e.error),
                    None => e.error,
                })
                .unwrap_or(body);
            return Err(RagError::AuthenticationError(format!(
                "token endpoint returned {status}: {detail}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RagError::AuthenticationError(format!("invalid token response: {e}")))
    }
}

#[async_trait]
impl TokenSource for OAuthAuthenticator {
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if cached.is_none() {
            *cached = self.load_token().await;
        }
        if let Some(token) = cached.as_ref().filter(|t| t.is_valid_at(Utc::now())) {
            return Ok(token.access_token.clone());
        }
        let expired = cached.clone().ok_or_else(|| {
            RagError::AuthenticationError("not authorized, run the login flow first".into())
        })?;
        if !expired.can_refresh() {
            return Err(RagError::AuthenticationError(
                "access token expired and no refresh token is available".into(),
            ));
        }
        let fresh = self.refresh(&expired).await?;
        self.save_token(&fresh).await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }
}

/// A fixed bearer token, for callers that manage credentials themselves.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Query parameters Google appends to the consent redirect.
#[derive(Debug, Default, Deserialize)]
struct RedirectParams {
    code: Option<String>,
    error: Option<String>,
}

type RedirectSlot = Arc<Mutex<Option<oneshot::Sender<Result<String>>>>>;

/// Serve the redirect target on `listener` until a request carrying `code`
/// or `error` arrives, then shut the server down and return the code.
///
/// Requests without either parameter, such as `/favicon.ico`, are answered
/// and otherwise ignored.
async fn capture_redirect(listener: TcpListener) -> Result<String> {
    let (code_tx, code_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let slot: RedirectSlot = Arc::new(Mutex::new(Some(code_tx)));
    let app = Router::new().fallback(handle_redirect).with_state(slot);

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let outcome = code_rx.await;
    let _ = shutdown_tx.send(());
    match server.await {
        Ok(Err(e)) => debug!(error = %e, "OAuth redirect server stopped with an error"),
        Err(e) => debug!(error = %e, "OAuth redirect server task failed"),
        Ok(Ok(())) => {}
    }

    outcome.map_err(|_| {
        RagError::AuthenticationError("OAuth redirect listener stopped before a code arrived".into())
    })?
}

async fn handle_redirect(
    State(slot): State<RedirectSlot>,
    Query(params): Query<RedirectParams>,
) -> (StatusCode, &'static str) {
    let (outcome, reply) = match (params.code, params.error) {
        (_, Some(error)) => (
            Err(RagError::AuthenticationError(format!("consent denied: {error}"))),
            "Authentication failed. Return to the terminal for details.",
        ),
        (Some(code), None) => {
            (Ok(code), "The authentication flow has completed. You may close this window.")
        }
        (None, None) => return (StatusCode::NOT_FOUND, "Waiting for the authorization redirect."),
    };

    match slot.lock().await.take() {
        Some(tx) => {
            debug!("received OAuth redirect");
            let _ = tx.send(outcome);
            (StatusCode::OK, reply)
        }
        None => (StatusCode::OK, "Authorization was already handled. You may close this window."),
    }
}

fn open_in_browser(url: &str) {
    let program = if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(target_os = "windows") {
        "explorer"
    } else {
        "xdg-open"
    };
    if let Err(e) = std::process::Command::new(program).arg(url).spawn() {
        debug!(program, error = %e, "could not launch a browser");
    }
}
