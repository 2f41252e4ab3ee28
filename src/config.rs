//! Configuration module for the mail verification client
//!
//! All configuration is loaded from environment variables following the
//! pattern `MAIL_VERIFY_<KEY>`. Every key has a default so the client runs
//! out of the box against a `credentials/` directory next to the harness.

use std::env;
use std::env::VarError;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{MailError, MailResult};

/// Mail verification configuration
///
/// Holds file locations for the persisted credential state, the fixed sender
/// the transactional mails arrive from, and the timing knobs of a
/// verification call.
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Path to the OAuth client credential bundle (read-only)
    pub credentials_path: PathBuf,
    /// Path to the persisted token file (read at startup, overwritten on refresh)
    pub token_path: PathBuf,
    /// Fixed sender address the provider query filters on
    pub sender: String,
    /// Settle delay before the first fetch attempt, in milliseconds
    pub settle_delay_ms: u64,
    /// HTTP request timeout in milliseconds
    pub http_timeout_ms: u64,
}

impl MailConfig {
    /// Load all configuration from environment variables
    ///
    /// Reads a `.env` file first if one is present, then falls back to
    /// process environment and finally to built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a variable is set but malformed.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// MAIL_VERIFY_CREDENTIALS_PATH=credentials/credentials.json
    /// MAIL_VERIFY_TOKEN_PATH=credentials/token.json
    /// MAIL_VERIFY_SENDER=product.notification2@openturf.in
    /// MAIL_VERIFY_SETTLE_DELAY_MS=15000
    /// MAIL_VERIFY_HTTP_TIMEOUT_MS=30000
    /// ```
    pub fn load_from_env() -> MailResult<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            credentials_path: path_env(
                "MAIL_VERIFY_CREDENTIALS_PATH",
                "credentials/credentials.json",
            )?,
            token_path: path_env("MAIL_VERIFY_TOKEN_PATH", "credentials/token.json")?,
            sender: string_env("MAIL_VERIFY_SENDER", "product.notification2@openturf.in")?,
            settle_delay_ms: parse_u64_env("MAIL_VERIFY_SETTLE_DELAY_MS", 15_000)?,
            http_timeout_ms: parse_u64_env("MAIL_VERIFY_HTTP_TIMEOUT_MS", 30_000)?,
        })
    }

    /// Settle delay as a [`Duration`]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// HTTP timeout as a [`Duration`]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

/// Read a path environment variable with default fallback
fn path_env(key: &str, default: &str) -> MailResult<PathBuf> {
    Ok(PathBuf::from(string_env(key, default)?))
}

/// Read a string environment variable with default fallback
///
/// An empty or whitespace-only value is rejected rather than silently
/// producing an unfiltered provider query downstream.
fn string_env(key: &str, default: &str) -> MailResult<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        Ok(_) => Err(MailError::InvalidConfig(format!(
            "environment variable {key} is set but empty"
        ))),
        Err(VarError::NotPresent) => Ok(default.to_owned()),
        Err(VarError::NotUnicode(_)) => Err(MailError::InvalidConfig(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Parse a `u64` environment variable with default fallback
///
/// Returns `default` if unset.
///
/// # Errors
///
/// Returns `InvalidConfig` if the variable is set but not a valid `u64`.
fn parse_u64_env(key: &str, default: u64) -> MailResult<u64> {
    match env::var(key) {
        Ok(v) => v.parse::<u64>().map_err(|_| {
            MailError::InvalidConfig(format!("invalid u64 environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(MailError::InvalidConfig(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}
