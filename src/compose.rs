//! Reply composition: template and generated drafts rendered to RFC 5322
//!
//! Both modes share one threading policy: the draft is addressed to the source
//! sender, its subject gains a `Re: ` prefix unless it already starts with
//! exactly `Re:`, and when the source has a `Message-ID` it becomes both
//! `In-Reply-To` and `References`.

use lettre::Message;
use lettre::address::{Address, Envelope};
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Mailboxes};
use tracing::warn;

use crate::errors::{AppError, AppResult};
use crate::llm::CompletionService;
use crate::mime::{Correspondent, NormalizedMessage};
use crate::thread::Thread;

const TEMPLATE_BODY: &str = "[PLACEHOLDER: Edit before sending]\n\nThank you for your email.";
const REPLY_PREFIX: &str = "Re:";

/// A reply ready to be rendered and persisted as a draft
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftReply {
    pub body_text: String,
    pub to_address: String,
    /// Structured form of `to_address` used for the `To` header
    pub recipients: Vec<Correspondent>,
    pub subject_line: String,
    pub in_reply_to: Option<String>,
    pub references_header: Option<String>,
}

/// Subject line for a reply
///
/// Case-sensitive prefix check: `RE: hello` becomes `Re: RE: hello`.
pub fn reply_subject(subject: &str) -> String {
    if subject.starts_with(REPLY_PREFIX) {
        subject.to_owned()
    } else {
        format!("{REPLY_PREFIX} {subject}")
    }
}

/// Draft replying to `source` with `body_text`
fn reply_to(source: &NormalizedMessage, body_text: String) -> DraftReply {
    DraftReply {
        body_text,
        to_address: source.from.clone(),
        recipients: source.senders.clone(),
        subject_line: reply_subject(&source.subject),
        in_reply_to: source.message_id.clone(),
        references_header: source.message_id.clone(),
    }
}

/// Placeholder draft for `source`; pure and deterministic
pub fn compose_template(source: &NormalizedMessage) -> DraftReply {
    reply_to(source, TEMPLATE_BODY.to_owned())
}

/// Draft whose body is generated from the whole conversation
///
/// Calls `completion` exactly once and uses its text verbatim.
///
/// # Errors
///
/// Propagates any completion failure; no draft is produced.
pub async fn compose_generated<C: CompletionService>(
    thread: &Thread,
    recipient: &str,
    completion: &C,
) -> AppResult<DraftReply> {
    let prompt = render_prompt(thread, recipient);
    let body = completion.complete(&prompt).await?;
    Ok(reply_to(thread.trigger(), body))
}

/// Serialize a thread into the completion prompt
pub fn render_prompt(thread: &Thread, recipient: &str) -> String {
    let mut prompt = String::from("Conversation thread:\n\n");
    let delimiter = "=".repeat(50);
    for (i, msg) in thread.messages().iter().enumerate() {
        prompt.push_str(&format!(
            "Email {}:\nFrom: {}\nSubject: {}\n\n{}\n\n{delimiter}\n\n",
            i + 1,
            msg.from,
            msg.subject,
            msg.body
        ));
    }
    prompt.push_str(&format!(
        "\n\nBased on this email conversation, write a professional and helpful reply to {recipient}. \
         Keep it concise and appropriate for the context."
    ));
    prompt
}

/// Render a draft to RFC 5322 bytes with `From: sender`
///
/// `To` comes from the parsed sender mailboxes, falling back to `to_address`
/// as text. A recipient that still cannot be parsed (the `Unknown` default)
/// leaves `To` empty instead of failing; the draft is stored, not sent, so the
/// envelope always points back at the sender.
///
/// # Errors
///
/// Returns `InvalidInput` if `sender` is not a valid address and `Internal` if
/// the message cannot be built.
pub fn render_draft(draft: &DraftReply, sender: &str) -> AppResult<Vec<u8>> {
    let from: Mailbox = sender
        .parse()
        .map_err(|e| AppError::invalid(format!("invalid sender address '{sender}': {e}")))?;

    let mut builder = Message::builder()
        .from(from.clone())
        .subject(draft.subject_line.clone());

    for recipient in draft_recipients(draft) {
        builder = builder.to(recipient);
    }

    if let Some(id) = &draft.in_reply_to {
        builder = builder.in_reply_to(id.clone());
    }
    if let Some(refs) = &draft.references_header {
        builder = builder.references(refs.clone());
    }

    let envelope = Envelope::new(Some(from.email.clone()), vec![from.email])
        .map_err(|e| AppError::Internal(format!("failed to build draft envelope: {e}")))?;
    let message = builder
        .envelope(envelope)
        .header(ContentType::TEXT_PLAIN)
        .body(draft.body_text.clone())
        .map_err(|e| AppError::Internal(format!("failed to build draft message: {e}")))?;
    Ok(message.formatted())
}

fn draft_recipients(draft: &DraftReply) -> Vec<Mailbox> {
    let parsed: Vec<Mailbox> = draft
        .recipients
        .iter()
        .filter_map(|r| match r.email.parse::<Address>() {
            Ok(email) => Some(Mailbox::new(r.name.clone(), email)),
            Err(e) => {
                warn!(email = %r.email, error = %e, "skipping unparseable recipient");
                None
            }
        })
        .collect();
    if !parsed.is_empty() {
        return parsed;
    }

    match draft.to_address.parse::<Mailboxes>() {
        Ok(mailboxes) => mailboxes.into_iter().collect(),
        Err(e) => {
            warn!(to = %draft.to_address, error = %e, "unparseable recipient; leaving To empty");
            Vec::new()
        }
    }
}
