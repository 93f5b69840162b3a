//! Tool input DTOs
//!
//! Each type derives `JsonSchema` so rmcp can publish the input schema the
//! host uses to call the tool.

use schemars::JsonSchema;
use serde::Deserialize;

/// Input: send one plain-text email
///
/// Used by `send_email`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SendEmailInput {
    /// Recipient email
    pub to: String,
    /// Email subject
    pub subject: String,
    /// Email body
    pub body: String,
}

/// Input: list unread messages
///
/// Used by `get_unread_emails`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetUnreadEmailsInput {
    /// Max emails (default: 10)
    #[serde(default = "default_limit")]
    pub limit: f64,
}

/// Input: AI drafts for every unread message
///
/// Used by `create_ai_draft_replies`. When omitted, the server's configured
/// default applies.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct CreateAiDraftRepliesInput {
    /// Number of emails to include in thread context (default: 10)
    #[serde(default)]
    pub context_limit: Option<f64>,
}

/// Default value for `limit` in `get_unread_emails`
fn default_limit() -> f64 {
    10.0
}

#[cfg(test)]
mod tests {
    use super::{CreateAiDraftRepliesInput, GetUnreadEmailsInput, SendEmailInput};

    #[test]
    fn limit_defaults_to_ten() {
        let input: GetUnreadEmailsInput = serde_json::from_str("{}").expect("valid input");
        assert_eq!(input.limit, 10.0);
        let input: GetUnreadEmailsInput =
            serde_json::from_str(r#"{"limit":5}"#).expect("valid input");
        assert_eq!(input.limit, 5.0);
    }

    #[test]
    fn context_limit_is_optional() {
        let input: CreateAiDraftRepliesInput = serde_json::from_str("{}").expect("valid input");
        assert_eq!(input.context_limit, None);
    }

    #[test]
    fn any_json_number_is_accepted_for_later_validation() {
        let input: GetUnreadEmailsInput =
            serde_json::from_str(r#"{"limit":-1}"#).expect("valid input");
        assert_eq!(input.limit, -1.0);
        let input: CreateAiDraftRepliesInput =
            serde_json::from_str(r#"{"context_limit":5.5}"#).expect("valid input");
        assert_eq!(input.context_limit, Some(5.5));
    }

    #[test]
    fn send_email_requires_all_fields() {
        let err = serde_json::from_str::<SendEmailInput>(r#"{"to":"a@b.c","subject":"s"}"#)
            .expect_err("must fail");
        assert!(err.to_string().contains("body"));
    }
}
