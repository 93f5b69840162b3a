//! Mail store client over IMAP
//!
//! Provides the [`MailStore`] seam used by thread assembly and the draft
//! batches, and [`ImapStore`], its timeout-bounded `async-imap` implementation.
//! All network calls are enforced to use TLS, and timeouts are derived from
//! server config.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_imap::types::Fetch;
use async_imap::{Client, Session};
use futures::TryStreamExt;
use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::config::{MailCredentials, ServerConfig};
use crate::errors::{AppError, AppResult};

/// Type alias for authenticated IMAP session over TLS
pub type ImapSession = Session<tokio_rustls::client::TlsStream<TcpStream>>;

/// Operations the drafting pipeline needs from a mail store
///
/// Ids are store-assigned and ascend in arrival order. Implementations work
/// against one already-selected mailbox.
pub trait MailStore {
    /// Ids of all unseen messages, ascending
    fn search_unseen(&mut self) -> impl Future<Output = AppResult<Vec<u32>>> + Send;

    /// Full raw source of one message, without marking it seen
    fn fetch_by_id(&mut self, id: u32) -> impl Future<Output = AppResult<Vec<u8>>> + Send;

    /// Ids of messages whose `Message-ID` header equals `message_id`, ascending
    fn search_by_message_id(
        &mut self,
        message_id: &str,
    ) -> impl Future<Output = AppResult<Vec<u32>>> + Send;

    /// Persist a rendered message into `mailbox`
    fn append_draft(
        &mut self,
        mailbox: &str,
        content: &[u8],
    ) -> impl Future<Output = AppResult<()>> + Send;

    /// End the session; failures are logged, never returned
    fn logout(self) -> impl Future<Output = ()> + Send
    where
        Self: Sized;
}

/// Authenticated IMAP session with the inbox selected
///
/// Acquired with [`ImapStore::open`] and released with [`MailStore::logout`],
/// normally through `drafts::run_in_session`.
pub struct ImapStore<'a> {
    config: &'a ServerConfig,
    session: ImapSession,
}

impl<'a> ImapStore<'a> {
    /// Connect, authenticate, and SELECT the configured inbox
    ///
    /// If the SELECT fails the session is logged out before returning.
    pub async fn open(config: &'a ServerConfig, credentials: &MailCredentials) -> AppResult<Self> {
        let mut session = connect_authenticated(config, credentials).await?;
        let store = match select_mailbox(config, &mut session, &config.inbox_mailbox).await {
            Ok(()) => Self { config, session },
            Err(e) => {
                Self { config, session }.logout().await;
                return Err(e);
            }
        };
        Ok(store)
    }
}

impl MailStore for ImapStore<'_> {
    async fn search_unseen(&mut self) -> AppResult<Vec<u32>> {
        uid_search(self.config, &mut self.session, "UNSEEN").await
    }

    async fn fetch_by_id(&mut self, id: u32) -> AppResult<Vec<u8>> {
        fetch_raw_message(self.config, &mut self.session, id).await
    }

    async fn search_by_message_id(&mut self, message_id: &str) -> AppResult<Vec<u32>> {
        let Some(query) = message_id_query(message_id) else {
            warn!(message_id, "unsearchable message-id; treating as not found");
            return Ok(Vec::new());
        };
        uid_search(self.config, &mut self.session, &query).await
    }

    async fn append_draft(&mut self, mailbox: &str, content: &[u8]) -> AppResult<()> {
        append(self.config, &mut self.session, mailbox, content).await
    }

    /// Send LOGOUT and drop the connection
    async fn logout(mut self) {
        match timeout(socket_timeout(self.config), self.session.logout()).await {
            Ok(Ok(())) => debug!("IMAP session logged out"),
            Ok(Err(e)) => warn!(error = %e, "IMAP logout failed"),
            Err(_) => warn!("IMAP logout timed out"),
        }
    }
}

/// Get socket timeout duration from server config
fn socket_timeout(server: &ServerConfig) -> Duration {
    Duration::from_millis(server.socket_timeout_ms)
}

/// Connect to IMAP server and authenticate
///
/// Performs full connection sequence with timeouts:
/// 1. TCP connect
/// 2. TLS handshake with webpki root certificates
/// 3. Read IMAP greeting
/// 4. LOGIN authentication
///
/// # Errors
///
/// - `InvalidInput` if hostname is invalid for TLS SNI
/// - `Timeout` if any connection phase times out
/// - `AuthFailed` if authentication fails
/// - `Internal` for TCP, TLS, or greeting failures
async fn connect_authenticated(
    server: &ServerConfig,
    credentials: &MailCredentials,
) -> AppResult<ImapSession> {
    let connect_duration = Duration::from_millis(server.connect_timeout_ms);
    let greeting_duration = Duration::from_millis(server.greeting_timeout_ms);

    let tcp = timeout(
        connect_duration,
        TcpStream::connect((server.imap_host.as_str(), server.imap_port)),
    )
    .await
    .map_err(|_| AppError::Timeout("tcp connect timeout".to_owned()))
    .and_then(|r| r.map_err(|e| AppError::Internal(format!("tcp connect failed: {e}"))))?;

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(tls_config));

    let server_name = ServerName::try_from(server.imap_host.clone())
        .map_err(|_| AppError::InvalidInput("invalid IMAP host for TLS SNI".to_owned()))?;
    let tls_stream = timeout(greeting_duration, connector.connect(server_name, tcp))
        .await
        .map_err(|_| AppError::Timeout("TLS handshake timeout".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Internal(format!("TLS handshake failed: {e}"))))?;

    let mut client = Client::new(tls_stream);
    let greeting = timeout(greeting_duration, client.read_response())
        .await
        .map_err(|_| AppError::Timeout("IMAP greeting timeout".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Internal(format!("IMAP greeting failed: {e}"))))?;

    if greeting.is_none() {
        return Err(AppError::Internal(
            "IMAP server closed connection before greeting".to_owned(),
        ));
    }

    let pass = credentials.pass.expose_secret();
    let session = timeout(
        greeting_duration,
        client.login(credentials.user.as_str(), pass),
    )
    .await
    .map_err(|_| AppError::Timeout("IMAP login timeout".to_owned()))
    .and_then(|r| {
        r.map_err(|(e, _)| {
            let msg = e.to_string();
            if msg.to_ascii_lowercase().contains("auth") || msg.contains("LOGIN") {
                AppError::AuthFailed(msg)
            } else {
                AppError::Internal(msg)
            }
        })
    })?;

    debug!(host = %server.imap_host, "IMAP session authenticated");
    Ok(session)
}

/// Select mailbox in read-write mode
///
/// Uses `SELECT` so drafts can be appended in the same session. Bodies are
/// always fetched with `BODY.PEEK[]`, so selection alone changes no flags.
async fn select_mailbox(
    server: &ServerConfig,
    session: &mut ImapSession,
    mailbox: &str,
) -> AppResult<()> {
    timeout(socket_timeout(server), session.select(mailbox))
        .await
        .map_err(|_| AppError::Timeout(format!("SELECT timed out for mailbox '{mailbox}'")))
        .and_then(|r| {
            r.map_err(|e| AppError::NotFound(format!("cannot select mailbox '{mailbox}': {e}")))
        })?;
    Ok(())
}

/// Fetch full message source without setting `\Seen`
///
/// # Errors
///
/// - `NotFound` if UID does not exist in mailbox
/// - `Timeout` or `Internal` for network/protocol errors
async fn fetch_raw_message(
    server: &ServerConfig,
    session: &mut ImapSession,
    uid: u32,
) -> AppResult<Vec<u8>> {
    debug!(uid, "UID FETCH BODY.PEEK[]");
    let stream = timeout(
        socket_timeout(server),
        session.uid_fetch(uid.to_string(), "(UID BODY.PEEK[])"),
    )
    .await
    .map_err(|_| AppError::Timeout("UID FETCH timed out".to_owned()))
    .and_then(|r| r.map_err(|e| AppError::Internal(format!("uid fetch failed: {e}"))))?;
    let fetches: Vec<Fetch> = timeout(socket_timeout(server), stream.try_collect())
        .await
        .map_err(|_| AppError::Timeout("UID FETCH stream timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Internal(format!("uid fetch stream failed: {e}"))))?;

    let fetch = fetches
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("message uid {uid} not found")))?;
    let body = fetch
        .body()
        .ok_or_else(|| AppError::Internal(format!("message uid {uid} has no body")))?;
    Ok(body.to_vec())
}

/// Search for messages matching query
///
/// Runs `UID SEARCH` and returns matching UIDs in ascending (arrival) order.
async fn uid_search(
    server: &ServerConfig,
    session: &mut ImapSession,
    query: &str,
) -> AppResult<Vec<u32>> {
    debug!(query, "UID SEARCH");
    let set = timeout(socket_timeout(server), session.uid_search(query))
        .await
        .map_err(|_| AppError::Timeout("UID SEARCH timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Internal(format!("uid search failed: {e}"))))?;
    let mut uids: Vec<u32> = set.into_iter().collect();
    uids.sort_unstable();
    Ok(uids)
}

/// Append raw RFC822 message to mailbox
async fn append(
    server: &ServerConfig,
    session: &mut ImapSession,
    mailbox: &str,
    content: &[u8],
) -> AppResult<()> {
    debug!(mailbox, size_bytes = content.len(), "APPEND");
    timeout(
        socket_timeout(server),
        session.append(mailbox, None, None, content),
    )
    .await
    .map_err(|_| AppError::Timeout("APPEND timed out".to_owned()))
    .and_then(|r| r.map_err(|e| AppError::Internal(format!("APPEND failed: {e}"))))
}

/// Build a `HEADER Message-ID` search for an exact id
///
/// Returns `None` for ids that cannot be expressed as an IMAP quoted string.
fn message_id_query(message_id: &str) -> Option<String> {
    if message_id.is_empty() || message_id.chars().any(|ch| ch.is_ascii_control()) {
        return None;
    }
    let escaped = message_id.replace('\\', "\\\\").replace('"', "\\\"");
    Some(format!("HEADER Message-ID \"{escaped}\""))
}

#[cfg(test)]
mod tests {
    use super::message_id_query;

    #[test]
    fn builds_header_search_for_message_id() {
        assert_eq!(
            message_id_query("<m1@example.com>").as_deref(),
            Some("HEADER Message-ID \"<m1@example.com>\"")
        );
    }

    #[test]
    fn escapes_quotes_and_backslashes() {
        assert_eq!(
            message_id_query("<a\"b\\c@x>").as_deref(),
            Some("HEADER Message-ID \"<a\\\"b\\\\c@x>\"")
        );
    }

    #[test]
    fn rejects_injection_like_ids() {
        assert_eq!(message_id_query("<m1@x>\r\nA1 LOGOUT"), None);
        assert_eq!(message_id_query(""), None);
    }
}
