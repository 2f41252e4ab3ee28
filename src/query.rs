//! Message types and provider search queries
//!
//! Maps each recognized transactional message type to the fixed subject
//! fragment its notification mail carries, and renders the Gmail search
//! expression used to list candidates. Unknown message-type names fail to
//! parse instead of degrading to an unfiltered query, which would match
//! unrelated mail and corrupt downstream classification.

use std::fmt;
use std::str::FromStr;

use crate::errors::{MailError, MailResult};

/// Recognized transactional message types
///
/// One variant per notification mail the harness verifies. The string form
/// (used by spreadsheet-driven test data) is the upper snake-case name, e.g.
/// `RECRUITER_SIGNUP_ACTIVATION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Master-recruiter account signup, carries the activation link
    RecruiterSignupActivation,
    /// Job descriptions assigned to a recruiter
    JdAssignment,
    /// Candidate mobile verification, carries the OTP code
    CandidateVerifyOtp,
    /// Candidate username recovery confirmation
    CandidateRetrieveUsername,
    /// Password reset, carries the reset link
    PasswordReset,
}

impl MessageType {
    /// Subject fragment the provider query filters on for this type
    pub fn subject_fragment(self) -> &'static str {
        match self {
            Self::RecruiterSignupActivation => {
                "Verify Your Email Address for Curatal - Master Recruiter Account"
            }
            Self::JdAssignment => "Assignment of Job Descriptions in Job Portal",
            Self::CandidateVerifyOtp => "Verify Mobile",
            Self::CandidateRetrieveUsername => "Retrieve Username",
            Self::PasswordReset => "Reset Your Password for Curatal",
        }
    }

    /// Canonical string name, matching the test-data vocabulary
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RecruiterSignupActivation => "RECRUITER_SIGNUP_ACTIVATION",
            Self::JdAssignment => "JD_ASSIGNMENT",
            Self::CandidateVerifyOtp => "CANDIDATE_VERIFY_OTP",
            Self::CandidateRetrieveUsername => "CANDIDATE_RETRIEVE_USERNAME",
            Self::PasswordReset => "PASSWORD_RESET",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = MailError;

    fn from_str(s: &str) -> MailResult<Self> {
        match s {
            "RECRUITER_SIGNUP_ACTIVATION" => Ok(Self::RecruiterSignupActivation),
            "JD_ASSIGNMENT" => Ok(Self::JdAssignment),
            "CANDIDATE_VERIFY_OTP" => Ok(Self::CandidateVerifyOtp),
            "CANDIDATE_RETRIEVE_USERNAME" => Ok(Self::CandidateRetrieveUsername),
            "PASSWORD_RESET" => Ok(Self::PasswordReset),
            other => Err(MailError::UnknownMessageType(other.to_owned())),
        }
    }
}

/// Provider search query for one verification call
///
/// Transient value derived per message type; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Fixed notification sender address
    pub sender: String,
    /// Recipient address the caller is verifying mail for
    pub recipient: String,
    /// Subject fragment distinguishing the message type
    pub subject_fragment: String,
}

impl Query {
    /// Build the query for a message type and recipient
    ///
    /// Total over [`MessageType`]: every recognized type has a fixed subject
    /// fragment. Unknown type *names* are rejected earlier, at
    /// [`MessageType::from_str`].
    pub fn for_message(message_type: MessageType, sender: &str, recipient: &str) -> Self {
        Self {
            sender: sender.to_owned(),
            recipient: recipient.to_owned(),
            subject_fragment: message_type.subject_fragment().to_owned(),
        }
    }

    /// Render the Gmail search expression
    ///
    /// Shape matches what the Gmail `messages.list` `q` parameter expects:
    /// `from:(sender) to:(recipient) subject:(fragment)`. The inbox
    /// restriction is applied separately via `labelIds`.
    pub fn to_search_expression(&self) -> String {
        format!(
            "from:({}) to:({}) subject:({})",
            self.sender, self.recipient, self.subject_fragment
        )
    }
}
