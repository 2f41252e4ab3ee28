//! mail-verify-rs: Gmail-backed verification client for transactional QA emails
//!
//! This crate confirms that transactional emails (signup activation, OTP,
//! password reset, job-description assignment) were actually delivered and
//! extracts the dynamic values embedded in them (URLs, OTP codes, names) for
//! use in subsequent test steps. It is a pull-based, on-demand verifier: the
//! caller already knows approximately when a message should have arrived.
//!
//! # Architecture
//!
//! - [`config`]: Environment-driven configuration for credential paths and timing
//! - [`errors`]: Application error model with fatal/recoverable classification
//! - [`auth`]: Credential store, token persistence, and pluggable grant flow
//! - [`query`]: Message types and provider search expressions
//! - [`gmail`]: Gmail REST transport behind the `MailApi` seam
//! - [`classify`]: Ordered message-context registry and parameter extraction
//! - [`verify`]: Caller-facing verification facade, one operation per mail type
//!
//! # Example
//!
//! ```no_run
//! use mail_verify_rs::{MailConfig, StdinAuthFlow, Verifier};
//!
//! # async fn run() -> mail_verify_rs::MailResult<()> {
//! let config = MailConfig::load_from_env()?;
//! let verifier = Verifier::connect(&config, &StdinAuthFlow).await?;
//!
//! match verifier.recruiter_activation_url("recruiter@example.com").await? {
//!     Some(url) => println!("activation url: {url}"),
//!     None => println!("activation mail not received"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod classify;
pub mod config;
pub mod errors;
pub mod gmail;
pub mod query;
pub mod verify;

pub use auth::{AuthFlow, Session, StdinAuthFlow, Token};
pub use classify::{ExtractedMail, MessageContext, Registry};
pub use config::MailConfig;
pub use errors::{MailError, MailResult};
pub use gmail::{FetchOutcome, GmailClient, ListOutcome, MailApi, RawMessage};
pub use query::{MessageType, Query};
pub use verify::Verifier;
