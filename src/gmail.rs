//! Gmail REST transport: list, fetch/decode, and read-state operations
//!
//! Drives the Gmail API v1 over HTTPS. List queries are restricted to the
//! inbox label; message bodies arrive as URL-safe base64 and are decoded here
//! into text/HTML for classification. A provider-reported `invalid_grant`
//! condition is surfaced as a distinguished [`FetchOutcome::InvalidGrant`]
//! sentinel, distinct from "no results" and from transport failure, because
//! the remediation (re-run the interactive grant) differs from retry.

use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::Session;
use crate::errors::{MailError, MailResult};
use crate::query::Query;

/// Gmail API v1 base for the authorized user
const GMAIL_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// One fetched message: provider ID plus decoded body
///
/// Transient; created and discarded within a single verification call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Provider message identifier
    pub id: String,
    /// Decoded text/HTML body
    pub body: String,
}

/// Result of a list query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListOutcome {
    /// Stored authorization is revoked; listing cannot proceed
    InvalidGrant,
    /// Candidate message IDs in provider order (most recent first)
    Ids(Vec<String>),
}

/// Result of the full fetch stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Stored authorization is revoked; the run cannot continue unattended
    InvalidGrant,
    /// Zero or more decoded messages in provider order
    Messages(Vec<RawMessage>),
}

/// Provider operations the verification pipeline depends on
///
/// The seam between orchestration and the Gmail wire protocol; tests
/// substitute an in-memory implementation.
#[allow(async_fn_in_trait)]
pub trait MailApi {
    /// List candidate message IDs for a query, inbox-restricted
    ///
    /// Zero matches is an empty ID list, not an error: "no mail yet" is the
    /// expected steady state under polling.
    async fn list_message_ids(&self, access_token: &str, query: &Query)
    -> MailResult<ListOutcome>;

    /// Fetch one message and decode its body payload
    async fn fetch_body(&self, access_token: &str, message_id: &str) -> MailResult<String>;

    /// Remove the unread marker from a message
    ///
    /// Idempotent from the caller's perspective: removing an already-absent
    /// label succeeds.
    async fn mark_read(&self, access_token: &str, message_id: &str) -> MailResult<()>;
}

/// [`MailApi`] implementation over the Gmail REST API
#[derive(Debug, Clone)]
pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
}

impl GmailClient {
    /// Wrap an HTTP client (typically shared with the [`Session`])
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: GMAIL_BASE_URL.to_owned(),
        }
    }
}

impl MailApi for GmailClient {
    async fn list_message_ids(
        &self,
        access_token: &str,
        query: &Query,
    ) -> MailResult<ListOutcome> {
        let expression = query.to_search_expression();
        let response = self
            .http
            .get(format!("{}/messages", self.base_url))
            .bearer_auth(access_token)
            .query(&[("q", expression.as_str()), ("labelIds", "INBOX")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::UNAUTHORIZED || body.contains("invalid_grant") {
                return Ok(ListOutcome::InvalidGrant);
            }
            return Err(MailError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let list: MessageListResponse = response.json().await?;
        debug!(matches = list.messages.len(), query = %expression, "listed inbox candidates");
        Ok(ListOutcome::Ids(
            list.messages.into_iter().map(|m| m.id).collect(),
        ))
    }

    async fn fetch_body(&self, access_token: &str, message_id: &str) -> MailResult<String> {
        let response = self
            .http
            .get(format!("{}/messages/{message_id}", self.base_url))
            .bearer_auth(access_token)
            .query(&[("format", "full")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let detail: MessageDetail = response.json().await?;
        let payload = detail
            .payload
            .ok_or_else(|| MailError::Decode("message has no payload".to_owned()))?;
        let data = body_data(&payload)
            .ok_or_else(|| MailError::Decode("message payload has no body data".to_owned()))?;
        decode_body(data)
    }

    async fn mark_read(&self, access_token: &str, message_id: &str) -> MailResult<()> {
        let response = self
            .http
            .post(format!("{}/messages/{message_id}/modify", self.base_url))
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "removeLabelIds": ["UNREAD"] }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(())
    }
}

/// Execute the fetch stage: list, then retrieve and decode each candidate
///
/// A failure fetching or decoding one message is logged and that message is
/// excluded; it never aborts the rest of the batch. An invalid-grant signal
/// from either the token refresh or the list call maps to the sentinel.
pub async fn fetch_matching<A: MailApi>(
    api: &A,
    session: &Session,
    query: &Query,
) -> MailResult<FetchOutcome> {
    let access_token = match session.access_token().await {
        Ok(token) => token,
        Err(MailError::AuthorizationRevoked) => return Ok(FetchOutcome::InvalidGrant),
        Err(err) => return Err(err),
    };

    match api.list_message_ids(&access_token, query).await? {
        ListOutcome::InvalidGrant => Ok(FetchOutcome::InvalidGrant),
        ListOutcome::Ids(ids) => {
            let mut messages = Vec::with_capacity(ids.len());
            for id in ids {
                match api.fetch_body(&access_token, &id).await {
                    Ok(body) => messages.push(RawMessage { id, body }),
                    Err(err) => {
                        warn!(message_id = %id, error = %err, "skipping undecodable message");
                    }
                }
            }
            Ok(FetchOutcome::Messages(messages))
        }
    }
}

/// Mark a consumed message read
pub async fn mark_read<A: MailApi>(api: &A, session: &Session, message_id: &str) -> MailResult<()> {
    let access_token = session.access_token().await?;
    api.mark_read(&access_token, message_id).await
}

// Gmail API response shapes (subset this client reads)

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDetail {
    #[serde(default)]
    payload: Option<Payload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    body: Option<PayloadBody>,
    #[serde(default)]
    parts: Vec<Payload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadBody {
    #[serde(default)]
    data: Option<String>,
}

/// Locate the body data to decode
///
/// Single-part messages carry data directly on the top-level payload.
/// Multipart messages are walked for a `text/html` part first, since the
/// classification templates target the HTML rendering, then `text/plain`.
fn body_data(payload: &Payload) -> Option<&str> {
    if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_deref()) {
        return Some(data);
    }
    find_part_data(payload, "text/html").or_else(|| find_part_data(payload, "text/plain"))
}

/// Depth-first search of MIME parts for a given content type
fn find_part_data<'a>(payload: &'a Payload, mime_type: &str) -> Option<&'a str> {
    if payload.mime_type == mime_type {
        if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_deref()) {
            return Some(data);
        }
    }
    payload
        .parts
        .iter()
        .find_map(|part| find_part_data(part, mime_type))
}

/// Decode a URL-safe base64 body into text
///
/// Gmail emits the URL-safe alphabet; padding varies by producer, so both
/// padded and unpadded forms are accepted.
fn decode_body(data: &str) -> MailResult<String> {
    let bytes = URL_SAFE
        .decode(data)
        .or_else(|_| URL_SAFE_NO_PAD.decode(data))
        .map_err(|e| MailError::Decode(format!("invalid base64 body: {e}")))?;
    String::from_utf8(bytes).map_err(|e| MailError::Decode(format!("body is not UTF-8: {e}")))
}
