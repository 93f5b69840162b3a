//! Message decoding
//!
//! Turns a raw RFC822 record into a [`NormalizedMessage`] using `mailparse`.
//! Decoding is pure and never fails: absent headers fall back to defaults,
//! undecodable bytes are replaced, and a message without a plain-text part
//! simply has an empty body.

use mailparse::{MailAddr, MailHeader, MailHeaderMap, ParsedMail};
use tracing::warn;

const DEFAULT_FROM: &str = "Unknown";
const DEFAULT_SUBJECT: &str = "No Subject";

/// One mailbox from an address header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correspondent {
    /// Display name, RFC 2047 decoded
    pub name: Option<String>,
    /// Bare address
    pub email: String,
}

/// Normalized view of one message
///
/// Lives only for the duration of a tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedMessage {
    /// `From` header (RFC 2047 decoded), `Unknown` if absent
    pub from: String,
    /// Mailboxes parsed from the raw `From` header; empty if absent or unparseable
    pub senders: Vec<Correspondent>,
    /// `Subject` header (RFC 2047 decoded), `No Subject` if absent
    pub subject: String,
    /// `Message-ID` header, if present and non-blank
    pub message_id: Option<String>,
    /// `References` message-ids, oldest first as stored in the header
    pub references: Vec<String>,
    /// Plain-text body, trimmed
    pub body: String,
}

/// Decode a raw mail-store record
///
/// Body policy: for multipart messages the first `text/plain` part in
/// depth-first order wins and later parts are ignored; a single-part message
/// has its payload decoded regardless of type.
pub fn decode(raw: &[u8]) -> NormalizedMessage {
    let parsed = match mailparse::parse_mail(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "failed to parse message; using header defaults");
            return NormalizedMessage {
                from: DEFAULT_FROM.to_owned(),
                senders: Vec::new(),
                subject: DEFAULT_SUBJECT.to_owned(),
                message_id: None,
                references: Vec::new(),
                body: String::new(),
            };
        }
    };

    let headers = parsed.get_headers();
    let from = headers
        .get_first_value("From")
        .unwrap_or_else(|| DEFAULT_FROM.to_owned());
    let senders = headers
        .get_first_header("From")
        .map(parse_mailboxes)
        .unwrap_or_default();
    let subject = headers
        .get_first_value("Subject")
        .unwrap_or_else(|| DEFAULT_SUBJECT.to_owned());
    let message_id = headers
        .get_first_value("Message-ID")
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty());
    let references = headers
        .get_first_value("References")
        .map(|v| v.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default();

    NormalizedMessage {
        from,
        senders,
        subject,
        message_id,
        references,
        body: extract_body(&parsed),
    }
}

/// Parse an address header before decoding encoded words, so a decoded display
/// name containing a comma stays attached to its address
fn parse_mailboxes(header: &MailHeader<'_>) -> Vec<Correspondent> {
    match mailparse::addrparse_header(header) {
        Ok(list) => list
            .iter()
            .flat_map(|addr| match addr {
                MailAddr::Single(info) => vec![info.clone()],
                MailAddr::Group(group) => group.addrs.clone(),
            })
            .map(|info| Correspondent {
                name: info.display_name,
                email: info.addr,
            })
            .collect(),
        Err(e) => {
            warn!(error = %e, "unparseable address header");
            Vec::new()
        }
    }
}

fn extract_body(parsed: &ParsedMail<'_>) -> String {
    let text = if parsed.subparts.is_empty() {
        Some(part_text(parsed))
    } else {
        first_plain_part(parsed).map(part_text)
    };
    text.map(|t| t.trim().to_owned()).unwrap_or_default()
}

/// Depth-first search for the first `text/plain` part
fn first_plain_part<'a, 'b>(part: &'b ParsedMail<'a>) -> Option<&'b ParsedMail<'a>> {
    if part.ctype.mimetype.eq_ignore_ascii_case("text/plain") {
        return Some(part);
    }
    part.subparts.iter().find_map(|sub| first_plain_part(sub))
}

/// Decode a part's payload, replacing what cannot be decoded
fn part_text(part: &ParsedMail<'_>) -> String {
    match part.get_body() {
        Ok(text) => text,
        Err(e) => match part.get_body_raw() {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => {
                warn!(error = %e, "undecodable body part; treating as empty");
                String::new()
            }
        },
    }
}

/// Truncate string to maximum characters (Unicode-aware)
///
/// Preserves complete characters, never splitting multi-byte sequences.
pub fn truncate_chars(input: String, max_chars: usize) -> String {
    input.chars().take(max_chars).collect()
}
