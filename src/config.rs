//! Configuration module for mail credentials and server settings
//!
//! All configuration is loaded once from environment variables at startup and
//! passed explicitly into each tool. Credentials are optional at load time:
//! each operation checks only the subset it needs, so a missing completion key
//! does not stop `send_email` from working.

use std::env;
use std::env::VarError;

use secrecy::SecretString;

use crate::errors::{AppError, AppResult};

const MAIL_CREDENTIALS_HINT: &str = "Set GMAIL_USER and GMAIL_APP_PASSWORD environment variables";
const COMPLETION_KEY_HINT: &str = "Set ANTHROPIC_API_KEY environment variable";

/// Mail account credentials
///
/// The secret is stored using `SecretString` to prevent accidental logging.
#[derive(Debug, Clone)]
pub struct MailCredentials {
    /// Login identity, also used as the `From` address of drafts and sent mail
    pub user: String,
    /// App password or account secret
    pub pass: SecretString,
}

/// Server-wide configuration
///
/// Immutable for the process lifetime. Cloned into MCP tool handlers via
/// `Arc` for shared access.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Mail account identity and secret, if configured
    pub mail: Option<MailCredentials>,
    /// Completion service API key, if configured
    pub completion_api_key: Option<SecretString>,
    /// IMAP server hostname
    pub imap_host: String,
    /// IMAP server port (TLS)
    pub imap_port: u16,
    /// SMTP submission hostname
    pub smtp_host: String,
    /// SMTP submission port (implicit TLS)
    pub smtp_port: u16,
    /// Mailbox searched for unseen messages
    pub inbox_mailbox: String,
    /// Mailbox drafts are appended to
    pub drafts_mailbox: String,
    /// TCP connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// TLS handshake, greeting, and login timeout in milliseconds
    pub greeting_timeout_ms: u64,
    /// Socket I/O timeout in milliseconds
    pub socket_timeout_ms: u64,
    /// Completion service base URL (no trailing slash)
    pub completion_base_url: String,
    /// Completion model identifier
    pub completion_model: String,
    /// Maximum tokens the completion service may return
    pub completion_max_tokens: u32,
    /// Ancestor count used when `context_limit` is omitted
    pub default_context_limit: usize,
    /// Upper bound for `limit` and `context_limit` tool arguments
    pub max_result_limit: usize,
}

impl ServerConfig {
    /// Load all configuration from environment variables
    ///
    /// Credentials (`GMAIL_USER`, `GMAIL_APP_PASSWORD`, `ANTHROPIC_API_KEY`)
    /// may be absent; they are validated per operation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a numeric setting is malformed or the default
    /// context limit falls outside `1..=MAIL_MAX_RESULT_LIMIT`.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// GMAIL_USER=user@gmail.com
    /// GMAIL_APP_PASSWORD=app-password
    /// ANTHROPIC_API_KEY=sk-ant-...
    /// MAIL_DRAFTS_MAILBOX=[Gmail]/Drafts
    /// ```
    pub fn load_from_env() -> AppResult<Self> {
        let mail = match (
            optional_env("GMAIL_USER")?,
            optional_env("GMAIL_APP_PASSWORD")?,
        ) {
            (Some(user), Some(pass)) => Some(MailCredentials {
                user,
                pass: SecretString::new(pass.into()),
            }),
            _ => None,
        };
        let completion_api_key =
            optional_env("ANTHROPIC_API_KEY")?.map(|key| SecretString::new(key.into()));

        let max_result_limit = parse_usize_env("MAIL_MAX_RESULT_LIMIT", 50)?;
        let default_context_limit = parse_usize_env("MAIL_DEFAULT_CONTEXT_LIMIT", 10)?;
        if default_context_limit == 0 || default_context_limit > max_result_limit {
            return Err(AppError::InvalidInput(format!(
                "MAIL_DEFAULT_CONTEXT_LIMIT must be in range 1..{max_result_limit}"
            )));
        }

        Ok(Self {
            mail,
            completion_api_key,
            imap_host: string_env("MAIL_IMAP_HOST", "imap.gmail.com")?,
            imap_port: parse_u16_env("MAIL_IMAP_PORT", 993)?,
            smtp_host: string_env("MAIL_SMTP_HOST", "smtp.gmail.com")?,
            smtp_port: parse_u16_env("MAIL_SMTP_PORT", 465)?,
            inbox_mailbox: string_env("MAIL_INBOX_MAILBOX", "INBOX")?,
            drafts_mailbox: string_env("MAIL_DRAFTS_MAILBOX", "[Gmail]/Drafts")?,
            connect_timeout_ms: parse_u64_env("MAIL_CONNECT_TIMEOUT_MS", 30_000)?,
            greeting_timeout_ms: parse_u64_env("MAIL_GREETING_TIMEOUT_MS", 15_000)?,
            socket_timeout_ms: parse_u64_env("MAIL_SOCKET_TIMEOUT_MS", 300_000)?,
            completion_base_url: string_env("ANTHROPIC_BASE_URL", "https://api.anthropic.com/v1")?
                .trim_end_matches('/')
                .to_owned(),
            completion_model: string_env("ANTHROPIC_MODEL", "claude-3-haiku-20240307")?,
            completion_max_tokens: parse_u32_env("ANTHROPIC_MAX_TOKENS", 1024)?,
            default_context_limit,
            max_result_limit,
        })
    }

    /// Mail credentials required by every mailbox and SMTP operation
    ///
    /// # Errors
    ///
    /// Returns `MissingConfig` naming both variables if either is unset.
    pub fn require_mail_credentials(&self) -> AppResult<&MailCredentials> {
        self.mail
            .as_ref()
            .ok_or_else(|| AppError::MissingConfig(MAIL_CREDENTIALS_HINT.to_owned()))
    }

    /// Completion service key required by AI drafting
    ///
    /// # Errors
    ///
    /// Returns `MissingConfig` if `ANTHROPIC_API_KEY` is unset.
    pub fn require_completion_key(&self) -> AppResult<&SecretString> {
        self.completion_api_key
            .as_ref()
            .ok_or_else(|| AppError::MissingConfig(COMPLETION_KEY_HINT.to_owned()))
    }
}

/// Read an optional environment variable, treating blank values as unset
fn optional_env(key: &str) -> AppResult<Option<String>> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(Some(v)),
        Ok(_) | Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Read a string environment variable with default fallback
fn string_env(key: &str, default: &str) -> AppResult<String> {
    Ok(optional_env(key)?.unwrap_or_else(|| default.to_owned()))
}

/// Parse a `u16` environment variable with default fallback
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set but not a valid `u16`.
fn parse_u16_env(key: &str, default: u16) -> AppResult<u16> {
    match optional_env(key)? {
        Some(v) => parse_number(key, &v, "u16"),
        None => Ok(default),
    }
}

fn parse_u32_env(key: &str, default: u32) -> AppResult<u32> {
    match optional_env(key)? {
        Some(v) => parse_number(key, &v, "u32"),
        None => Ok(default),
    }
}

fn parse_u64_env(key: &str, default: u64) -> AppResult<u64> {
    match optional_env(key)? {
        Some(v) => parse_number(key, &v, "u64"),
        None => Ok(default),
    }
}

fn parse_usize_env(key: &str, default: usize) -> AppResult<usize> {
    match optional_env(key)? {
        Some(v) => parse_number(key, &v, "usize"),
        None => Ok(default),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str, kind: &str) -> AppResult<T> {
    value.trim().parse::<T>().map_err(|_| {
        AppError::InvalidInput(format!(
            "invalid {kind} environment variable {key}: '{value}'"
        ))
    })
}

#[cfg(test)]
pub(crate) fn test_config() -> ServerConfig {
    ServerConfig {
        mail: Some(MailCredentials {
            user: "me@example.com".to_owned(),
            pass: SecretString::new("secret".into()),
        }),
        completion_api_key: Some(SecretString::new("key".into())),
        imap_host: "imap.example.com".to_owned(),
        imap_port: 993,
        smtp_host: "smtp.example.com".to_owned(),
        smtp_port: 465,
        inbox_mailbox: "INBOX".to_owned(),
        drafts_mailbox: "Drafts".to_owned(),
        connect_timeout_ms: 1_000,
        greeting_timeout_ms: 1_000,
        socket_timeout_ms: 1_000,
        completion_base_url: "http://127.0.0.1:9".to_owned(),
        completion_model: "test-model".to_owned(),
        completion_max_tokens: 256,
        default_context_limit: 10,
        max_result_limit: 50,
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_number, test_config};

    #[test]
    fn parse_number_accepts_padded_values() {
        assert_eq!(parse_number::<u16>("K", " 993 ", "u16").ok(), Some(993));
    }

    #[test]
    fn parse_number_rejects_garbage() {
        let err =
            parse_number::<u64>("MAIL_SOCKET_TIMEOUT_MS", "soon", "u64").expect_err("must fail");
        assert!(err.to_string().contains("MAIL_SOCKET_TIMEOUT_MS"));
    }

    #[test]
    fn missing_mail_credentials_names_both_variables() {
        let mut config = test_config();
        config.mail = None;
        let err = config.require_mail_credentials().expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "Set GMAIL_USER and GMAIL_APP_PASSWORD environment variables"
        );
    }

    #[test]
    fn missing_completion_key_is_reported_separately() {
        let mut config = test_config();
        config.completion_api_key = None;
        assert!(config.require_mail_credentials().is_ok());
        let err = config.require_completion_key().expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "Set ANTHROPIC_API_KEY environment variable"
        );
    }
}
