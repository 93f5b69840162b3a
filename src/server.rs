//! MCP server implementation with tool handlers
//!
//! Implements the `ServerHandler` trait and registers the four mail tools.
//! Each handler validates configuration and input before any network call,
//! runs its operation inside a scoped mailbox session, and reports the result
//! (success or `Error: ...`) as text content.

use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, ErrorData, ServerCapabilities, ServerInfo};
use rmcp::{ServerHandler, tool, tool_handler, tool_router};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::drafts::{self, DraftTarget, MailboxTask};
use crate::errors::{AppError, AppResult, ToolOutcome};
use crate::imap::ImapStore;
use crate::llm::AnthropicClient;
use crate::models::{CreateAiDraftRepliesInput, GetUnreadEmailsInput, SendEmailInput};
use crate::smtp::{self, Outgoing};

/// Mail drafting MCP server
///
/// Holds shared configuration. Implements MCP tool handlers via `#[tool]`
/// attribute macro and `ServerHandler` trait.
#[derive(Clone)]
pub struct MailDraftServer {
    /// Server config (credentials, endpoints, limits)
    config: Arc<ServerConfig>,
    /// Tool router for dispatching MCP tool calls
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl MailDraftServer {
    /// Create a new MCP server instance
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            tool_router: Self::tool_router(),
        }
    }

    /// Tool: Send one plain-text email over SMTP
    #[tool(name = "send_email", description = "Send an email using Gmail")]
    async fn send_email(
        &self,
        Parameters(input): Parameters<SendEmailInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool("send_email", started, self.send_email_impl(input).await)
    }

    /// Tool: List the most recent unread emails
    #[tool(
        name = "get_unread_emails",
        description = "Get all unread emails from Gmail inbox"
    )]
    async fn get_unread_emails(
        &self,
        Parameters(input): Parameters<GetUnreadEmailsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            "get_unread_emails",
            started,
            self.get_unread_emails_impl(input).await,
        )
    }

    /// Tool: Placeholder reply drafts for every unread email
    #[tool(
        name = "create_draft_replies",
        description = "Create draft replies for all unread emails"
    )]
    async fn create_draft_replies(&self) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            "create_draft_replies",
            started,
            self.create_draft_replies_impl().await,
        )
    }

    /// Tool: Generated reply drafts using conversation context
    #[tool(
        name = "create_ai_draft_replies",
        description = "Create AI-powered draft replies for all unread emails using conversation context"
    )]
    async fn create_ai_draft_replies(
        &self,
        Parameters(input): Parameters<CreateAiDraftRepliesInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            "create_ai_draft_replies",
            started,
            self.create_ai_draft_replies_impl(input).await,
        )
    }
}

/// MCP server handler implementation
///
/// Provides server info and capabilities to MCP client.
#[tool_handler(router = self.tool_router)]
impl ServerHandler for MailDraftServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build()).with_instructions(
            "Mail drafting MCP server. Sends mail, lists unread mail, and saves threaded reply drafts (template or AI-generated) to the drafts mailbox.",
        )
    }
}

/// Tool implementation methods
///
/// Private methods handle the actual business logic for each tool, separated
/// from the public `#[tool]` methods that handle response formatting.
impl MailDraftServer {
    async fn send_email_impl(&self, input: SendEmailInput) -> AppResult<String> {
        let credentials = self.config.require_mail_credentials()?;
        validate_no_controls(&input.to, "to")?;
        validate_no_controls(&input.subject, "subject")?;

        smtp::send(
            &self.config,
            credentials,
            &Outgoing {
                to: &input.to,
                subject: &input.subject,
                body: &input.body,
            },
        )
        .await?;
        Ok(format!("Email sent to {}", input.to))
    }

    async fn get_unread_emails_impl(&self, input: GetUnreadEmailsInput) -> AppResult<String> {
        let credentials = self.config.require_mail_credentials()?;
        let limit = validate_count(input.limit, self.config.max_result_limit, "limit")?;

        let store = ImapStore::open(&self.config, credentials).await?;
        drafts::run_in_session::<_, AnthropicClient>(store, MailboxTask::ListUnread { limit }).await
    }

    async fn create_draft_replies_impl(&self) -> AppResult<String> {
        let credentials = self.config.require_mail_credentials()?;
        let target = DraftTarget {
            sender: &credentials.user,
            mailbox: &self.config.drafts_mailbox,
        };

        let store = ImapStore::open(&self.config, credentials).await?;
        drafts::run_in_session::<_, AnthropicClient>(store, MailboxTask::TemplateDrafts { target })
            .await
    }

    async fn create_ai_draft_replies_impl(
        &self,
        input: CreateAiDraftRepliesInput,
    ) -> AppResult<String> {
        let credentials = self.config.require_mail_credentials()?;
        let api_key = self.config.require_completion_key()?;
        let context_limit = match input.context_limit {
            Some(value) => validate_count(value, self.config.max_result_limit, "context_limit")?,
            None => self.config.default_context_limit,
        };

        let completion = AnthropicClient::new(&self.config, api_key.clone())?;
        let target = DraftTarget {
            sender: &credentials.user,
            mailbox: &self.config.drafts_mailbox,
        };

        let store = ImapStore::open(&self.config, credentials).await?;
        drafts::run_in_session(
            store,
            MailboxTask::AiDrafts {
                completion: &completion,
                target,
                context_limit,
            },
        )
        .await
    }
}

/// Calculate elapsed milliseconds
fn duration_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Collapse an operation result into the text-content tool response
///
/// Never yields a protocol error: failures are reported in the content.
fn finalize_tool(
    tool: &str,
    started: Instant,
    result: AppResult<String>,
) -> Result<CallToolResult, ErrorData> {
    let outcome = ToolOutcome::from(result);
    match &outcome {
        ToolOutcome::Success(_) => {
            info!(tool, duration_ms = duration_ms(started), "tool completed");
        }
        ToolOutcome::Failure(msg) => {
            warn!(tool, duration_ms = duration_ms(started), error = %msg, "tool failed");
        }
    }
    Ok(outcome.into_call_result())
}

/// Validate a JSON number as a whole count in `1..=max`
fn validate_count(value: f64, max: usize, field: &str) -> AppResult<usize> {
    if value.fract() != 0.0 || value < 1.0 || value > max as f64 {
        return Err(AppError::InvalidInput(format!(
            "{field} must be a whole number from 1 to {max}"
        )));
    }
    Ok(value as usize)
}

/// Reject control characters in values that end up in message headers
fn validate_no_controls(value: &str, field: &str) -> AppResult<()> {
    if value.chars().any(|ch| ch.is_ascii_control()) {
        return Err(AppError::InvalidInput(format!(
            "{field} must not contain control characters"
        )));
    }
    Ok(())
}
