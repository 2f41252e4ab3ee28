//! Application error model
//!
//! Defines a typed error hierarchy using `thiserror` for internal error
//! handling. Only credential-bundle failures and a revoked authorization are
//! fatal to a verification run; everything else either surfaces to the caller
//! as a transport fault or degrades to a per-message diagnostic.

use std::path::PathBuf;

use thiserror::Error;

/// Application error type
///
/// Covers all error cases the mail verification client may encounter.
/// "No message of the requested type arrived" is deliberately *not* an error;
/// the verification facade models it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum MailError {
    /// Credential bundle file absent
    #[error("credential file not found at {0}")]
    MissingCredentials(PathBuf),
    /// Credential bundle present but malformed
    #[error("invalid credential file: {0}")]
    InvalidCredentials(String),
    /// No persisted token at the configured path (triggers the grant flow)
    #[error("token file not found at {0}")]
    TokenNotFound(PathBuf),
    /// Interactive grant flow aborted or produced no code
    #[error("authorization flow cancelled")]
    FlowCancelled,
    /// Token endpoint rejected a refresh for a reason other than revocation
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
    /// The stored refresh credential is revoked or expired; only a manual
    /// re-authorization can recover, so callers must not retry
    #[error("stored authorization revoked or expired; re-run the interactive grant")]
    AuthorizationRevoked,
    /// HTTP transport failure (timeout, DNS, TLS)
    #[error("http transport: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider returned a non-success status outside the invalid-grant path
    #[error("provider API error {status}: {message}")]
    Api { status: u16, message: String },
    /// Message body payload failed to decode from its transport encoding
    #[error("body decode failed: {0}")]
    Decode(String),
    /// Filesystem failure reading or persisting credential state
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// JSON (de)serialization failure
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// A message-type name that is not in the recognized set
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
    /// Configuration value missing or malformed
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MailError {
    /// Whether this error ends the verification run
    ///
    /// Fatal errors cannot be fixed by retrying: the credential bundle is
    /// unusable or the refresh credential needs a human to re-authorize.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingCredentials(_) | Self::InvalidCredentials(_) | Self::AuthorizationRevoked
        )
    }
}

/// Type alias for fallible return values
///
/// Use this for all internal functions that can fail. Provides a consistent
/// error type throughout the codebase.
pub type MailResult<T> = Result<T, MailError>;
