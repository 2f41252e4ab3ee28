//! Credential store and OAuth2 session
//!
//! Loads the client credential bundle and the persisted access/refresh token
//! pair, runs the interactive out-of-band grant exactly once when no usable
//! token exists, and hands out access tokens that are refreshed transparently
//! when stale. The interactive step is a pluggable [`AuthFlow`] strategy so
//! automated environments can provision a token file up front and never hit
//! a prompt.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::MailConfig;
use crate::errors::{MailError, MailResult};

/// OAuth2 scopes requested during the grant flow
///
/// `gmail.modify` covers both reading message bodies and clearing the unread
/// label. If the scope set changes, the persisted token must be regenerated.
const SCOPES: &[&str] = &["https://www.googleapis.com/auth/gmail.modify"];

/// Refresh the access token this long before its recorded expiry
const EXPIRY_SKEW_SECONDS: i64 = 60;

/// OAuth client credential bundle (Google "installed app" shape)
///
/// Immutable once loaded; owned by the [`Session`] for its lifetime. The
/// client secret is held in a type that prevents accidental logging.
#[derive(Debug, Clone)]
pub struct CredentialBundle {
    /// OAuth2 client identifier
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: SecretString,
    /// Authorization endpoint presented to the user during the grant flow
    pub auth_uri: String,
    /// Token endpoint for code exchange and refresh
    pub token_uri: String,
    /// Redirect target registered for the client
    pub redirect_uri: String,
}

/// Raw `credentials.json` layout
#[derive(Debug, Deserialize)]
struct RawBundle {
    installed: RawInstalled,
}

#[derive(Debug, Deserialize)]
struct RawInstalled {
    client_id: String,
    client_secret: String,
    #[serde(default = "default_auth_uri")]
    auth_uri: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_owned()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_owned()
}

/// Persisted access/refresh token pair
///
/// Written back to the token file whenever a new access token is obtained.
/// The `token` alias accepts files written by other Google client libraries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// Short-lived bearer token for API calls
    #[serde(alias = "token")]
    pub access_token: String,
    /// Long-lived credential used to mint new access tokens
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token expiry in RFC 3339 format
    #[serde(default)]
    pub expiry: Option<String>,
}

impl Token {
    /// Whether the access token needs a refresh
    ///
    /// A missing or unparseable expiry is treated as expired so the next call
    /// attempts a refresh rather than sending a stale bearer token.
    pub fn is_expired(&self) -> bool {
        let Some(expiry) = self.expiry.as_deref() else {
            return true;
        };
        match DateTime::parse_from_rfc3339(expiry) {
            Ok(expiry) => expiry <= Utc::now() + ChronoDuration::seconds(EXPIRY_SKEW_SECONDS),
            Err(_) => true,
        }
    }
}

/// Strategy for the one-time interactive authorization grant
///
/// The flow blocks on human input and is inherently non-automatable, so it is
/// injected rather than hard-wired: unattended runs provision a token file in
/// advance and the strategy is never invoked.
pub trait AuthFlow {
    /// Present the authorization URL and return the one-time code
    fn obtain_code(&self, auth_url: &str) -> MailResult<String>;
}

/// Interactive [`AuthFlow`] that prompts on standard input
pub struct StdinAuthFlow;

impl AuthFlow for StdinAuthFlow {
    fn obtain_code(&self, auth_url: &str) -> MailResult<String> {
        println!("Authorize this app by visiting this url: {auth_url}");
        print!("Enter the code from that page here: ");
        io::stdout().flush()?;

        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        let code = line.trim();
        if code.is_empty() {
            return Err(MailError::FlowCancelled);
        }
        Ok(code.to_owned())
    }
}

/// Authorized credential session
///
/// Owns the bundle and token for the process lifetime and serializes token
/// refreshes behind a mutex so concurrent verification calls cannot race two
/// refreshes and have one invalidate the other's token. Sessions are plain
/// owned values, so parallel test runs can each hold their own.
pub struct Session {
    bundle: CredentialBundle,
    token_path: PathBuf,
    token: Mutex<Token>,
    http: reqwest::Client,
}

impl Session {
    /// Load credential state and return an authorized session
    ///
    /// Fails fast if the credential bundle is absent or malformed. A missing
    /// or unreadable token file triggers the interactive grant through `flow`,
    /// and the resulting token is persisted before the session is returned.
    ///
    /// # Errors
    ///
    /// - `MissingCredentials` / `InvalidCredentials` for the bundle
    /// - `FlowCancelled` if the grant strategy produced no code
    /// - `Api` / `Http` if the code exchange fails
    pub async fn connect(config: &MailConfig, flow: &dyn AuthFlow) -> MailResult<Self> {
        let bundle = load_bundle(&config.credentials_path)?;
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()?;

        let token = match load_token(&config.token_path) {
            Ok(token) => token,
            Err(err) => {
                debug!(error = %err, "no usable persisted token, starting authorization grant");
                let token = authorize(&http, &bundle, flow).await?;
                save_token(&config.token_path, &token)?;
                info!("authorization grant complete, token persisted");
                token
            }
        };

        Ok(Self {
            bundle,
            token_path: config.token_path.clone(),
            token: Mutex::new(token),
            http,
        })
    }

    /// HTTP client shared with the provider transport
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Current access token, refreshed and re-persisted if stale
    ///
    /// Holding the token lock across the refresh gives single-writer
    /// semantics: a second caller arriving mid-refresh waits and then finds a
    /// fresh token instead of starting its own refresh.
    ///
    /// # Errors
    ///
    /// - `AuthorizationRevoked` if the provider reports the refresh
    ///   credential is no longer usable
    /// - `RefreshFailed` / `Http` for other refresh failures
    pub async fn access_token(&self) -> MailResult<String> {
        let mut token = self.token.lock().await;
        if token.is_expired() {
            debug!("access token stale, refreshing");
            let refreshed = self.refresh(&token).await?;
            save_token(&self.token_path, &refreshed)?;
            *token = refreshed;
        }
        Ok(token.access_token.clone())
    }

    /// Exchange the refresh token for a new access token
    async fn refresh(&self, token: &Token) -> MailResult<Token> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or(MailError::AuthorizationRevoked)?;

        let response = self
            .http
            .post(&self.bundle.token_uri)
            .form(&[
                ("client_id", self.bundle.client_id.as_str()),
                ("client_secret", self.bundle.client_secret.expose_secret()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            if is_invalid_grant(status.as_u16(), &body) {
                return Err(MailError::AuthorizationRevoked);
            }
            return Err(MailError::RefreshFailed(format!("HTTP {status}: {body}")));
        }

        let payload: serde_json::Value = serde_json::from_str(&body)?;
        token_from_response(&payload, token.refresh_token.as_deref())
    }
}

/// Whether a token-endpoint failure means the refresh credential is dead
///
/// Google reports `invalid_grant` with a 400 (occasionally 401) when the
/// refresh token has been revoked or expired.
fn is_invalid_grant(status: u16, body: &str) -> bool {
    (status == 400 || status == 401) && body.to_ascii_lowercase().contains("invalid_grant")
}

/// Run the interactive grant and exchange the code for a token
async fn authorize(
    http: &reqwest::Client,
    bundle: &CredentialBundle,
    flow: &dyn AuthFlow,
) -> MailResult<Token> {
    let auth_url = format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline",
        bundle.auth_uri,
        urlencode(&bundle.client_id),
        urlencode(&bundle.redirect_uri),
        urlencode(&SCOPES.join(" ")),
    );

    let code = flow.obtain_code(&auth_url)?;

    let response = http
        .post(&bundle.token_uri)
        .form(&[
            ("code", code.as_str()),
            ("client_id", bundle.client_id.as_str()),
            ("client_secret", bundle.client_secret.expose_secret()),
            ("redirect_uri", bundle.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(MailError::Api {
            status: status.as_u16(),
            message: body,
        });
    }

    let payload: serde_json::Value = serde_json::from_str(&body)?;
    token_from_response(&payload, None)
}

/// Build a [`Token`] from a token-endpoint JSON response
///
/// Refresh responses omit `refresh_token`, so the previous one is carried
/// forward via `fallback_refresh`.
fn token_from_response(
    payload: &serde_json::Value,
    fallback_refresh: Option<&str>,
) -> MailResult<Token> {
    let access_token = payload["access_token"]
        .as_str()
        .ok_or_else(|| MailError::RefreshFailed("no access_token in response".to_owned()))?
        .to_owned();
    let refresh_token = payload["refresh_token"]
        .as_str()
        .or(fallback_refresh)
        .map(str::to_owned);
    let expires_in = payload["expires_in"].as_u64().unwrap_or(3600);
    let expiry = Utc::now() + ChronoDuration::seconds(expires_in as i64);

    Ok(Token {
        access_token,
        refresh_token,
        expiry: Some(expiry.to_rfc3339()),
    })
}

/// Load and validate the credential bundle
fn load_bundle(path: &Path) -> MailResult<CredentialBundle> {
    if !path.exists() {
        return Err(MailError::MissingCredentials(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let raw: RawBundle = serde_json::from_str(&content)
        .map_err(|e| MailError::InvalidCredentials(format!("{}: {e}", path.display())))?;

    let installed = raw.installed;
    Ok(CredentialBundle {
        client_id: installed.client_id,
        client_secret: SecretString::new(installed.client_secret.into()),
        auth_uri: installed.auth_uri,
        token_uri: installed.token_uri,
        redirect_uri: installed
            .redirect_uris
            .into_iter()
            .next()
            .unwrap_or_else(|| "http://localhost".to_owned()),
    })
}

/// Load the persisted token file
pub fn load_token(path: &Path) -> MailResult<Token> {
    if !path.exists() {
        return Err(MailError::TokenNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let token: Token = serde_json::from_str(&content)?;
    Ok(token)
}

/// Persist the token atomically (write temp, then rename)
///
/// A crash mid-write leaves the previous token file intact.
pub fn save_token(path: &Path, token: &Token) -> MailResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_string_pretty(token)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Percent-encode a URL query parameter
fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
