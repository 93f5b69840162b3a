//! One-shot SMTP submission
//!
//! Builds a plain-text message with `lettre` and submits it over implicit TLS.

use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Mailboxes};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use tracing::info;

use crate::config::{MailCredentials, ServerConfig};
use crate::errors::{AppError, AppResult};

/// Outgoing message fields supplied by the `send_email` tool
#[derive(Debug, Clone)]
pub struct Outgoing<'a> {
    pub to: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
}

/// Build the RFC 5322 message for `outgoing`
///
/// `to` may list several comma-separated mailboxes; each one is a recipient.
fn build_message(credentials: &MailCredentials, outgoing: &Outgoing<'_>) -> AppResult<Message> {
    let from: Mailbox = credentials.user.parse().map_err(|e| {
        AppError::invalid(format!(
            "invalid sender address '{}': {e}",
            credentials.user
        ))
    })?;
    let recipients: Mailboxes = outgoing.to.parse().map_err(|e| {
        AppError::invalid(format!("invalid recipient address '{}': {e}", outgoing.to))
    })?;
    if recipients.iter().next().is_none() {
        return Err(AppError::invalid(
            "at least one recipient address is required",
        ));
    }

    let mut builder = Message::builder().from(from);
    for recipient in recipients {
        builder = builder.to(recipient);
    }
    builder
        .subject(outgoing.subject)
        .header(ContentType::TEXT_PLAIN)
        .body(outgoing.body.to_owned())
        .map_err(|e| AppError::Internal(format!("failed to build message: {e}")))
}

/// Submit `outgoing` through the configured SMTP relay
///
/// # Errors
///
/// - `InvalidInput` for unparseable addresses
/// - `AuthFailed` if the relay rejects the credentials
/// - `Internal` for connection and protocol failures
pub async fn send(
    config: &ServerConfig,
    credentials: &MailCredentials,
    outgoing: &Outgoing<'_>,
) -> AppResult<()> {
    let message = build_message(credentials, outgoing)?;

    let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        .map_err(|e| AppError::Internal(format!("invalid SMTP relay '{}': {e}", config.smtp_host)))?
        .port(config.smtp_port)
        .timeout(Some(Duration::from_millis(config.socket_timeout_ms)))
        .credentials(Credentials::new(
            credentials.user.clone(),
            credentials.pass.expose_secret().to_owned(),
        ))
        .build();

    transport.send(message).await.map_err(|e| {
        if e.is_permanent() && e.to_string().to_ascii_lowercase().contains("auth") {
            AppError::AuthFailed(e.to_string())
        } else if e.is_timeout() {
            AppError::Timeout(format!("SMTP submission: {e}"))
        } else {
            AppError::Internal(format!("SMTP submission failed: {e}"))
        }
    })?;

    info!(to = outgoing.to, "message submitted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Outgoing, build_message};
    use crate::config::test_config;

    #[test]
    fn builds_plain_text_message() {
        let config = test_config();
        let credentials = config.mail.as_ref().expect("credentials");
        let message = build_message(
            credentials,
            &Outgoing {
                to: "bob@example.com",
                subject: "Status",
                body: "All good.",
            },
        )
        .expect("message builds");
        let text = String::from_utf8(message.formatted()).expect("utf8");
        assert!(text.contains("From: me@example.com"));
        assert!(text.contains("To: bob@example.com"));
        assert!(text.contains("Subject: Status"));
        assert!(text.contains("All good."));
    }

    #[test]
    fn delivers_to_every_listed_recipient() {
        let config = test_config();
        let credentials = config.mail.as_ref().expect("credentials");
        let message = build_message(
            credentials,
            &Outgoing {
                to: "a@example.com, Bob <b@example.com>",
                subject: "Team",
                body: "Hello both.",
            },
        )
        .expect("message builds");
        let recipients: Vec<String> = message
            .envelope()
            .to()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(recipients, vec!["a@example.com", "b@example.com"]);
        let text = String::from_utf8(message.formatted()).expect("utf8");
        assert!(text.contains("To: a@example.com, Bob <b@example.com>"));
    }

    #[test]
    fn rejects_invalid_recipient() {
        let config = test_config();
        let credentials = config.mail.as_ref().expect("credentials");
        let err = build_message(
            credentials,
            &Outgoing {
                to: "nobody",
                subject: "s",
                body: "b",
            },
        )
        .expect_err("must fail");
        assert!(err.to_string().contains("invalid recipient address"));
    }
}
