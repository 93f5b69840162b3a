//! Application error model and tool outcome mapping
//!
//! Defines a typed error hierarchy using `thiserror` for internal error handling,
//! and a tagged [`ToolOutcome`] that every tool collapses into before it is
//! rendered as MCP text content. Operational failures never surface as
//! protocol-level faults; the calling assistant reads them as text.

use rmcp::model::{CallToolResult, Content};
use thiserror::Error;

/// Application error type
///
/// Covers every failure a tool invocation may hit, from missing credentials to
/// mail store and completion service faults.
#[derive(Debug, Error)]
pub enum AppError {
    /// Required configuration is absent for this operation
    ///
    /// Rendered verbatim so the text reads as an instruction
    /// (`Set GMAIL_USER and ...`).
    #[error("{0}")]
    MissingConfig(String),
    /// Invalid user input (validation failed, malformed request)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Resource not found (mailbox, message)
    #[error("not found: {0}")]
    NotFound(String),
    /// Authentication failure (bad credentials, account disabled)
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    /// Operation timeout (TCP connect, TLS handshake, IMAP/SMTP response)
    #[error("operation timed out: {0}")]
    Timeout(String),
    /// Completion service failed or returned no usable text
    #[error("completion failed: {0}")]
    Completion(String),
    /// Internal error (unexpected failure, external crate error)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Type alias for fallible return values
///
/// Use this for all internal functions that can fail. Provides a consistent
/// error type throughout the codebase.
pub type AppResult<T> = Result<T, AppError>;

/// Tagged result of one tool invocation
///
/// Either the text payload of a successful run or the message of the error
/// that ended it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    /// Operation completed; payload is the human-readable result text
    Success(String),
    /// Operation failed; payload is the error message without the `Error: ` prefix
    Failure(String),
}

impl ToolOutcome {
    /// Text content the host receives for this outcome
    pub fn text(&self) -> String {
        match self {
            Self::Success(text) => text.clone(),
            Self::Failure(msg) => format!("Error: {msg}"),
        }
    }

    /// Convert to an MCP tool result
    ///
    /// Failures carry `isError = true` but are still a normal tool response.
    pub fn into_call_result(self) -> CallToolResult {
        let text = self.text();
        match self {
            Self::Success(_) => CallToolResult::success(vec![Content::text(text)]),
            Self::Failure(_) => CallToolResult::error(vec![Content::text(text)]),
        }
    }
}

impl From<AppResult<String>> for ToolOutcome {
    fn from(result: AppResult<String>) -> Self {
        match result {
            Ok(text) => Self::Success(text),
            Err(e) => Self::Failure(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, AppResult, ToolOutcome};

    #[test]
    fn missing_config_renders_as_instruction() {
        let result: AppResult<String> = Err(AppError::MissingConfig(
            "Set GMAIL_USER and GMAIL_APP_PASSWORD environment variables".to_owned(),
        ));
        let outcome = ToolOutcome::from(result);
        assert_eq!(
            outcome.text(),
            "Error: Set GMAIL_USER and GMAIL_APP_PASSWORD environment variables"
        );
    }

    #[test]
    fn failure_sets_error_flag_but_keeps_text_content() {
        let outcome = ToolOutcome::Failure("boom".to_owned());
        let result = outcome.into_call_result();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.content.len(), 1);
    }

    #[test]
    fn success_passes_text_through() {
        let outcome = ToolOutcome::from(Ok::<_, AppError>("Email sent to a@b.c".to_owned()));
        assert_eq!(
            outcome,
            ToolOutcome::Success("Email sent to a@b.c".to_owned())
        );
        assert_eq!(outcome.into_call_result().is_error, Some(false));
    }
}
