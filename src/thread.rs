//! Conversation thread reconstruction
//!
//! Resolves a message's `References` chain against the mail store to build an
//! ordered conversation, oldest ancestor first and the triggering message last.
//! Ancestors are matched by exact `Message-ID` header, never by subject.

use tracing::debug;

use crate::errors::AppResult;
use crate::imap::MailStore;
use crate::mime::{self, NormalizedMessage};

/// Ordered conversation ending with the message that triggered assembly
///
/// Invariants: never empty, the last element is the trigger, and the length is
/// at most `context_limit + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    messages: Vec<NormalizedMessage>,
}

impl Thread {
    /// Messages oldest first
    pub fn messages(&self) -> &[NormalizedMessage] {
        &self.messages
    }

    /// The message that triggered assembly
    pub fn trigger(&self) -> &NormalizedMessage {
        // Constructed only by `build_thread`, which always pushes the trigger.
        &self.messages[self.messages.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

/// Build the conversation for `trigger`
///
/// Takes the last `context_limit` ids of the `References` header (the
/// ancestors closest to the trigger) and resolves each in header order. Ids
/// the store does not hold are skipped; when an id matches several messages
/// the first one the store returns is used.
///
/// # Errors
///
/// Any store failure while resolving an ancestor aborts assembly; a partial
/// thread is never returned.
pub async fn build_thread<S: MailStore>(
    store: &mut S,
    trigger: NormalizedMessage,
    context_limit: usize,
) -> AppResult<Thread> {
    let start = trigger.references.len().saturating_sub(context_limit);
    let selected = &trigger.references[start..];

    let mut messages = Vec::with_capacity(selected.len() + 1);
    for message_id in selected {
        let found = store.search_by_message_id(message_id).await?;
        let Some(&id) = found.first() else {
            debug!(message_id = %message_id, "referenced message not in store; skipping");
            continue;
        };
        let raw = store.fetch_by_id(id).await?;
        messages.push(mime::decode(&raw));
    }
    messages.push(trigger);

    Ok(Thread { messages })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::build_thread;
    use crate::errors::{AppError, AppResult};
    use crate::imap::MailStore;
    use crate::mime::{self, NormalizedMessage};

    /// In-memory mail store keyed by ascending id
    #[derive(Debug, Default)]
    pub(crate) struct FakeStore {
        pub messages: BTreeMap<u32, Vec<u8>>,
        pub unseen: Vec<u32>,
        pub appended: Vec<(String, Vec<u8>)>,
        pub failing_message_ids: Vec<String>,
        pub searches: Vec<String>,
        /// Shared so the count survives the store being consumed by `logout`
        pub logouts: Arc<AtomicUsize>,
    }

    impl FakeStore {
        pub fn insert(&mut self, id: u32, raw: String) {
            self.messages.insert(id, raw.into_bytes());
        }
    }

    impl MailStore for FakeStore {
        async fn search_unseen(&mut self) -> AppResult<Vec<u32>> {
            Ok(self.unseen.clone())
        }

        async fn fetch_by_id(&mut self, id: u32) -> AppResult<Vec<u8>> {
            self.messages
                .get(&id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("message uid {id} not found")))
        }

        async fn search_by_message_id(&mut self, message_id: &str) -> AppResult<Vec<u32>> {
            self.searches.push(message_id.to_owned());
            if self.failing_message_ids.iter().any(|id| id == message_id) {
                return Err(AppError::Internal(
                    "uid search failed: connection reset".to_owned(),
                ));
            }
            Ok(self
                .messages
                .iter()
                .filter(|(_, raw)| mime::decode(raw).message_id.as_deref() == Some(message_id))
                .map(|(id, _)| *id)
                .collect())
        }

        async fn append_draft(&mut self, mailbox: &str, content: &[u8]) -> AppResult<()> {
            self.appended.push((mailbox.to_owned(), content.to_vec()));
            Ok(())
        }

        async fn logout(self) {
            self.logouts.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn raw_message(
        from: &str,
        message_id: &str,
        references: &str,
        body: &str,
    ) -> String {
        let mut raw = format!("From: {from}\r\nSubject: Plans\r\nMessage-ID: {message_id}\r\n");
        if !references.is_empty() {
            raw.push_str(&format!("References: {references}\r\n"));
        }
        raw.push_str(&format!("\r\n{body}\r\n"));
        raw
    }

    fn store_with_ancestors() -> FakeStore {
        let mut store = FakeStore::default();
        store.insert(1, raw_message("a@x", "<m1@x>", "", "first"));
        store.insert(2, raw_message("b@x", "<m2@x>", "<m1@x>", "second"));
        store.insert(3, raw_message("a@x", "<m3@x>", "<m1@x> <m2@x>", "third"));
        store
    }

    fn trigger(references: &str) -> NormalizedMessage {
        mime::decode(raw_message("b@x", "<m4@x>", references, "latest").as_bytes())
    }

    fn bodies(thread: &super::Thread) -> Vec<&str> {
        thread.messages().iter().map(|m| m.body.as_str()).collect()
    }

    #[tokio::test]
    async fn message_without_references_is_its_own_thread() {
        let mut store = store_with_ancestors();
        let trigger = trigger("");
        let thread = build_thread(&mut store, trigger.clone(), 10)
            .await
            .expect("build succeeds");
        assert_eq!(thread.messages(), &[trigger]);
        assert!(store.searches.is_empty());
    }

    #[tokio::test]
    async fn takes_most_recent_ancestors_oldest_first() {
        let mut store = store_with_ancestors();
        let thread = build_thread(&mut store, trigger("<m1@x> <m2@x> <m3@x>"), 2)
            .await
            .expect("build succeeds");
        assert_eq!(bodies(&thread), vec!["second", "third", "latest"]);
        assert_eq!(store.searches, vec!["<m2@x>", "<m3@x>"]);
    }

    #[tokio::test]
    async fn unresolved_ancestor_is_skipped() {
        let mut store = store_with_ancestors();
        store.messages.remove(&3);
        let thread = build_thread(&mut store, trigger("<m1@x> <m2@x> <m3@x>"), 2)
            .await
            .expect("build succeeds");
        assert_eq!(bodies(&thread), vec!["second", "latest"]);
    }

    #[tokio::test]
    async fn length_is_min_of_limit_and_references_plus_one() {
        for limit in 1..=5 {
            let mut store = store_with_ancestors();
            let thread = build_thread(&mut store, trigger("<m1@x> <m2@x> <m3@x>"), limit)
                .await
                .expect("build succeeds");
            assert_eq!(thread.len(), limit.min(3) + 1);
            assert_eq!(thread.trigger().body, "latest");
        }
    }

    #[tokio::test]
    async fn duplicate_message_ids_use_first_store_match() {
        let mut store = store_with_ancestors();
        store.insert(9, raw_message("dup@x", "<m3@x>", "", "duplicate"));
        let thread = build_thread(&mut store, trigger("<m3@x>"), 1)
            .await
            .expect("build succeeds");
        assert_eq!(bodies(&thread), vec!["third", "latest"]);
    }

    #[tokio::test]
    async fn store_failure_aborts_assembly() {
        let mut store = store_with_ancestors();
        store.failing_message_ids.push("<m2@x>".to_owned());
        let err = build_thread(&mut store, trigger("<m1@x> <m2@x> <m3@x>"), 3)
            .await
            .expect_err("must fail");
        assert!(err.to_string().contains("connection reset"));
    }
}
