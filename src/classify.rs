//! Message context registry and body classification
//!
//! Each transactional mail category is described by a *message context*: a
//! short distinguishing substring, a message type tag, a template pattern,
//! and the ordered parameter names its capture groups represent. Contexts are
//! evaluated in registration order and the first whose substring occurs in
//! the body is authoritative.
//!
//! # Ordering hazard
//!
//! Substring gating commits to a context before its full pattern runs: if the
//! chosen context's pattern then fails, classification fails for that message
//! and later contexts are *not* tried. Overlapping distinguishing substrings
//! across contexts are therefore order-dependent by design; register the more
//! specific context first.

use std::collections::BTreeMap;

use regex::Regex;
use tracing::debug;

use crate::errors::{MailError, MailResult};
use crate::query::MessageType;

/// One registered message context
///
/// Binds a distinguishing substring to a message type and the template that
/// extracts its parameters.
#[derive(Debug, Clone)]
pub struct MessageContext {
    key: &'static str,
    message_type: MessageType,
    pattern: Regex,
    parameters: &'static [&'static str],
}

impl MessageContext {
    /// Compile a context, rejecting an invalid template pattern
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the pattern does not compile or its capture
    /// group count differs from the parameter name count.
    pub fn new(
        key: &'static str,
        message_type: MessageType,
        pattern: &str,
        parameters: &'static [&'static str],
    ) -> MailResult<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            MailError::InvalidConfig(format!("context pattern for {message_type}: {e}"))
        })?;
        let context = Self {
            key,
            message_type,
            pattern,
            parameters,
        };
        context.check_arity()?;
        Ok(context)
    }

    /// Verify the capture-group count matches the parameter-name count
    ///
    /// Static invariant, checkable at startup without network access.
    fn check_arity(&self) -> MailResult<()> {
        let groups = self.pattern.captures_len() - 1;
        if groups != self.parameters.len() {
            return Err(MailError::InvalidConfig(format!(
                "context for {} declares {} parameter(s) but its pattern has {} capture group(s)",
                self.message_type,
                self.parameters.len(),
                groups
            )));
        }
        Ok(())
    }
}

/// Classification result: one recognized mail and its extracted parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMail {
    /// Which message context matched
    pub message_type: MessageType,
    /// Parameter name to captured text, in context-declared naming
    pub parameters: BTreeMap<String, String>,
}

impl ExtractedMail {
    /// Captured value for a parameter name, if the context declares it
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }
}

/// Ordered set of message contexts
///
/// An explicit list, not a map: matching priority is registration order and
/// must stay deterministic across runs.
#[derive(Debug, Clone)]
pub struct Registry {
    contexts: Vec<MessageContext>,
}

impl Registry {
    /// Build a registry from contexts in matching-priority order
    pub fn new(contexts: Vec<MessageContext>) -> Self {
        Self { contexts }
    }

    /// The standard registry of transactional mail contexts
    ///
    /// Registration order matters; see the module-level ordering hazard note.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a built-in template fails to compile, which
    /// indicates a programming error caught at startup.
    pub fn standard() -> MailResult<Self> {
        Ok(Self::new(vec![
            MessageContext::new(
                "Thank you for registering as a",
                MessageType::RecruiterSignupActivation,
                r"Dear (.+),(?:[^)]|\n)*?href='(.+?)'(?:[^)]|\n)*?>Click Here</a>",
                &["name", "url"],
            )?,
            MessageContext::new(
                "Master Recruiter has recently assigned job descriptions",
                MessageType::JdAssignment,
                r"Dear (.+),",
                &["name"],
            )?,
            MessageContext::new(
                "Your OTP",
                MessageType::CandidateVerifyOtp,
                r"Dear (|.+),(?:[^)]|\n)+?<p>Your OTP for Curatal is (.+).</p>",
                &["name", "otp"],
            )?,
            MessageContext::new(
                "We have successfully retrieved your account that has the user name",
                MessageType::CandidateRetrieveUsername,
                r"Dear (.+),",
                &["name"],
            )?,
            MessageContext::new(
                "We received a request to reset the password",
                MessageType::PasswordReset,
                r"Dear (.+),(?:[^)]|\n)*?href='(.+?)'(?:[^)]|\n)*?>Reset Password</a>",
                &["name", "url"],
            )?,
        ]))
    }

    /// Classify a decoded message body
    ///
    /// Finds the first context whose distinguishing substring occurs in the
    /// body and applies its pattern. Returns `None` when no substring matches,
    /// when the committed context's pattern fails, or when the match arity is
    /// unexpected; pattern failures are logged as diagnostics since they
    /// usually mean the mail template changed underneath the harness.
    pub fn classify(&self, body: &str) -> Option<ExtractedMail> {
        let context = self.contexts.iter().find(|c| body.contains(c.key))?;

        let Some(captures) = context.pattern.captures(body) else {
            debug!(
                message_type = %context.message_type,
                "distinguishing substring present but template did not match"
            );
            return None;
        };

        if captures.len() != context.parameters.len() + 1 {
            debug!(
                message_type = %context.message_type,
                "template matched with unexpected capture count"
            );
            return None;
        }

        let parameters = context
            .parameters
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let value = captures.get(index + 1).map_or("", |m| m.as_str());
                ((*name).to_owned(), value.to_owned())
            })
            .collect();

        Some(ExtractedMail {
            message_type: context.message_type,
            parameters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{MessageContext, Registry};
    use crate::query::MessageType;

    fn registry() -> Registry {
        Registry::standard().unwrap()
    }

    const ACTIVATION_BODY: &str = concat!(
        "<html><body><p>Dear Alice,</p>\n",
        "<p>Thank you for registering as a Master Recruiter.</p>\n",
        "<a href='https://x/y' target='_blank'>Click Here</a>\n",
        "</body></html>"
    );

    #[test]
    fn standard_registry_compiles_with_matching_arity() {
        // MessageContext::new enforces the capture/parameter invariant, so a
        // successful build is the property itself.
        registry();
    }

    #[test]
    fn activation_mail_yields_name_and_url() {
        let mail = registry().classify(ACTIVATION_BODY).unwrap();
        assert_eq!(mail.message_type, MessageType::RecruiterSignupActivation);
        assert_eq!(mail.parameter("name"), Some("Alice"));
        assert_eq!(mail.parameter("url"), Some("https://x/y"));
    }

    #[test]
    fn otp_mail_with_empty_name_yields_otp() {
        let body = concat!(
            "<p>Dear ,</p>\n",
            "<p>Your OTP is below.</p>\n",
            "<p>Your OTP for Curatal is 4821.</p>"
        );
        let mail = registry().classify(body).unwrap();
        assert_eq!(mail.message_type, MessageType::CandidateVerifyOtp);
        assert_eq!(mail.parameter("name"), Some(""));
        assert_eq!(mail.parameter("otp"), Some("4821"));
    }

    #[test]
    fn altered_otp_template_is_excluded_not_force_mapped() {
        let body = concat!(
            "<p>Dear ,</p>\n",
            "<p>Your OTP is below.</p>\n",
            "<p>Your one-time code for Curatal is 4821.</p>"
        );
        assert!(registry().classify(body).is_none());
    }

    #[test]
    fn body_without_any_registered_substring_is_unclassified() {
        assert!(
            registry()
                .classify("Dear Bob,\nYour weekly newsletter has arrived.")
                .is_none()
        );
    }

    #[test]
    fn overlapping_substrings_resolve_to_earlier_registration_deterministically() {
        let body = concat!(
            "<p>Dear Carol,</p>\n",
            "<p>Thank you for registering as a candidate. Your OTP is enclosed.</p>\n",
            "<a href='https://x/activate'>Click Here</a>"
        );
        for _ in 0..5 {
            let mail = registry().classify(body).unwrap();
            assert_eq!(mail.message_type, MessageType::RecruiterSignupActivation);
        }
    }

    #[test]
    fn committed_context_failure_does_not_fall_through_to_later_contexts() {
        // Activation substring present with a broken activation template, plus
        // a fully valid OTP template later in the body. The first substring
        // match commits, so the OTP context must not be consulted.
        let body = concat!(
            "<p>Dear Dave,</p>\n",
            "<p>Thank you for registering as a Master Recruiter.</p>\n",
            "<p>Your OTP for Curatal is 9999.</p>"
        );
        assert!(registry().classify(body).is_none());
    }

    #[test]
    fn password_reset_mail_yields_reset_url() {
        let body = concat!(
            "<p>Dear Erin,</p>\n",
            "<p>We received a request to reset the password for your account.</p>\n",
            "<a href='https://x/reset?code=abc'>Reset Password</a>"
        );
        let mail = registry().classify(body).unwrap();
        assert_eq!(mail.message_type, MessageType::PasswordReset);
        assert_eq!(mail.parameter("url"), Some("https://x/reset?code=abc"));
    }

    #[test]
    fn context_with_arity_mismatch_is_rejected_at_build_time() {
        let err = MessageContext::new(
            "Broken",
            MessageType::JdAssignment,
            r"Dear (.+), your code is (.+)",
            &["name"],
        )
        .unwrap_err();
        assert!(err.to_string().contains("capture group"));
    }
}
