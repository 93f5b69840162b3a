//! Unread listing and draft batches
//!
//! Orchestration behind the mailbox tools, generic over [`MailStore`] and
//! [`CompletionService`]. Batches process unseen messages one at a time in
//! store order; the first failure aborts the rest, and drafts already appended
//! stay in the mailbox.

use tracing::info;

use crate::compose::{self, DraftReply};
use crate::errors::AppResult;
use crate::imap::MailStore;
use crate::llm::CompletionService;
use crate::mime::{self, NormalizedMessage};
use crate::thread;

/// Characters of body shown per message by `get_unread_emails`
const PREVIEW_MAX_CHARS: usize = 200;

pub const NO_UNREAD: &str = "No unread emails found.";

/// Where drafts are written and who they are from
#[derive(Debug, Clone, Copy)]
pub struct DraftTarget<'a> {
    /// Account address used as the draft `From`
    pub sender: &'a str,
    /// Mailbox drafts are appended to
    pub mailbox: &'a str,
}

/// One mailbox operation run inside a session
#[derive(Debug)]
pub enum MailboxTask<'a, C> {
    ListUnread {
        limit: usize,
    },
    TemplateDrafts {
        target: DraftTarget<'a>,
    },
    AiDrafts {
        completion: &'a C,
        target: DraftTarget<'a>,
        context_limit: usize,
    },
}

/// Run `task` against an open session, then log out whatever the outcome
pub async fn run_in_session<S: MailStore, C: CompletionService>(
    mut store: S,
    task: MailboxTask<'_, C>,
) -> AppResult<String> {
    let result = match task {
        MailboxTask::ListUnread { limit } => list_unread(&mut store, limit).await,
        MailboxTask::TemplateDrafts { target } => create_template_drafts(&mut store, target).await,
        MailboxTask::AiDrafts {
            completion,
            target,
            context_limit,
        } => create_ai_drafts(&mut store, completion, target, context_limit).await,
    };
    store.logout().await;
    result
}

/// Render up to `limit` most recent unseen messages, newest first
pub async fn list_unread<S: MailStore>(store: &mut S, limit: usize) -> AppResult<String> {
    let ids = store.search_unseen().await?;
    if ids.is_empty() {
        return Ok(NO_UNREAD.to_owned());
    }

    let recent = &ids[ids.len().saturating_sub(limit)..];
    let mut entries = Vec::with_capacity(recent.len());
    for &id in recent.iter().rev() {
        let msg = mime::decode(&store.fetch_by_id(id).await?);
        let preview = mime::truncate_chars(msg.body, PREVIEW_MAX_CHARS);
        entries.push(format!(
            "From: {}\nSubject: {}\n\n{preview}...\n{}",
            msg.from,
            msg.subject,
            "-".repeat(50)
        ));
    }

    Ok(format!(
        "Found {} unread email(s):\n\n{}",
        entries.len(),
        entries.join("\n\n")
    ))
}

/// Save a placeholder reply draft for every unseen message
pub async fn create_template_drafts<S: MailStore>(
    store: &mut S,
    target: DraftTarget<'_>,
) -> AppResult<String> {
    let ids = store.search_unseen().await?;
    if ids.is_empty() {
        return Ok(NO_UNREAD.to_owned());
    }

    let mut created = Vec::with_capacity(ids.len());
    for id in ids {
        let source = mime::decode(&store.fetch_by_id(id).await?);
        let draft = compose::compose_template(&source);
        save_draft(store, target, &draft).await?;
        created.push(format!("Draft reply to: {}", source.from));
    }

    info!(count = created.len(), "template drafts created");
    Ok(format!(
        "Created {} draft replies:\n\n{}",
        created.len(),
        created.join("\n")
    ))
}

/// Save a generated reply draft for every unseen message
///
/// Each message's thread is assembled from up to `context_limit` ancestors
/// and handed to `completion` once.
pub async fn create_ai_drafts<S: MailStore, C: CompletionService>(
    store: &mut S,
    completion: &C,
    target: DraftTarget<'_>,
    context_limit: usize,
) -> AppResult<String> {
    let ids = store.search_unseen().await?;
    if ids.is_empty() {
        return Ok(NO_UNREAD.to_owned());
    }

    let total = ids.len();
    info!(total, "processing unread emails");

    let mut created = Vec::with_capacity(total);
    for (index, id) in ids.into_iter().enumerate() {
        let position = index + 1;
        let trigger = mime::decode(&store.fetch_by_id(id).await?);
        info!(position, total, from = %trigger.from, subject = %trigger.subject, "fetched email");

        let from = trigger.from.clone();
        let draft = draft_with_context(store, completion, trigger, context_limit, position).await?;
        save_draft(store, target, &draft).await?;
        info!(position, total, "draft created");
        created.push(format!("AI draft reply to: {from}"));
    }

    Ok(format!(
        "Created {} AI-powered draft replies:\n\n{}",
        created.len(),
        created.join("\n")
    ))
}

async fn draft_with_context<S: MailStore, C: CompletionService>(
    store: &mut S,
    completion: &C,
    trigger: NormalizedMessage,
    context_limit: usize,
    position: usize,
) -> AppResult<DraftReply> {
    let recipient = trigger.from.clone();
    let thread = thread::build_thread(store, trigger, context_limit).await?;
    info!(
        position,
        messages = thread.len(),
        "conversation thread built"
    );

    let draft = compose::compose_generated(&thread, &recipient, completion).await?;
    info!(
        position,
        chars = draft.body_text.chars().count(),
        "reply generated"
    );
    Ok(draft)
}

async fn save_draft<S: MailStore>(
    store: &mut S,
    target: DraftTarget<'_>,
    draft: &DraftReply,
) -> AppResult<()> {
    let raw = compose::render_draft(draft, target.sender)?;
    store.append_draft(target.mailbox, &raw).await
}
