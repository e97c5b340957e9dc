//! Append-only conversation log.
//!
//! The store orders messages and nothing else: content is never inspected
//! or validated, and insertion order is the only ordering.

use std::collections::HashSet;

use uuid::Uuid;

use cartwise_core::types::{Message, MessageDraft};

/// Ordered log of the messages of one session.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    ids: HashSet<String>,
    local_appends: usize,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message to the end of the log and return the stored copy.
    ///
    /// A missing or already-used id is replaced with a fresh one.
    pub fn append(&mut self, draft: MessageDraft) -> Message {
        self.local_appends += 1;
        self.push(draft)
    }

    /// Replace the log with backend history, preserving its order.
    ///
    /// Applies only while the log is empty. Returns `false` without touching
    /// the log otherwise, so a late history response cannot discard messages
    /// the user already produced.
    pub fn hydrate(&mut self, history: Vec<MessageDraft>) -> bool {
        if !self.messages.is_empty() {
            tracing::debug!(
                existing = self.messages.len(),
                "Skipping history hydration, log already has messages"
            );
            return false;
        }
        for draft in history {
            self.push(draft);
        }
        true
    }

    /// Remove every message.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.ids.clear();
        self.local_appends = 0;
    }

    /// The log in append order.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether any message was appended locally since the last reset.
    pub fn has_local_messages(&self) -> bool {
        self.local_appends > 0
    }

    fn push(&mut self, mut draft: MessageDraft) -> Message {
        let id = match draft.id.take() {
            Some(id) if !id.is_empty() && !self.ids.contains(&id) => id,
            _ => self.fresh_id(),
        };
        self.ids.insert(id.clone());
        let message = draft.into_message(id);
        self.messages.push(message.clone());
        message
    }

    fn fresh_id(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if !self.ids.contains(&id) {
                return id;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cartwise_core::types::{ContentType, Role};

    #[test]
    fn test_append_assigns_id_and_timestamp() {
        let mut store = MessageStore::new();
        let msg = store.append(MessageDraft::user_text("hello"));
        assert!(!msg.id.is_empty());
        assert!(!msg.timestamp.is_empty());
        assert_eq!(msg.role, Role::User);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_append_order_ignores_timestamps() {
        let mut store = MessageStore::new();
        let stamps = [
            "2030-01-01T00:00:00+00:00",
            "1999-01-01T00:00:00+00:00",
            "2015-06-01T00:00:00+00:00",
        ];
        for (i, ts) in stamps.iter().enumerate() {
            store.append(MessageDraft::user_text(format!("m{}", i)).with_timestamp(*ts));
        }
        let texts: Vec<_> = store
            .snapshot()
            .into_iter()
            .map(|m| m.text.unwrap_or_default())
            .collect();
        assert_eq!(texts, vec!["m0", "m1", "m2"]);
    }

    #[test]
    fn test_duplicate_id_replaced() {
        let mut store = MessageStore::new();
        let mut draft = MessageDraft::user_text("a");
        draft.id = Some("fixed".to_string());
        let first = store.append(draft.clone());
        let second = store.append(draft);
        assert_eq!(first.id, "fixed");
        assert_ne!(second.id, "fixed");
    }

    #[test]
    fn test_malformed_fields_accepted() {
        let mut store = MessageStore::new();
        let draft = MessageDraft {
            content_type: ContentType::Image,
            ..MessageDraft::default()
        };
        let msg = store.append(draft);
        assert_eq!(msg.content_type, ContentType::Image);
        assert!(msg.image_url.is_none());
        assert_eq!(msg.role, Role::Assistant);
    }

    #[test]
    fn test_hydrate_empty_log() {
        let mut store = MessageStore::new();
        let applied = store.hydrate(vec![
            MessageDraft::user_text("q"),
            MessageDraft::assistant_text("a"),
        ]);
        assert!(applied);
        assert_eq!(store.len(), 2);
        assert!(!store.has_local_messages());
        assert_eq!(store.snapshot()[0].text.as_deref(), Some("q"));
    }

    #[test]
    fn test_hydrate_after_local_append_is_noop() {
        let mut store = MessageStore::new();
        store.append(MessageDraft::user_text("mine"));
        assert!(!store.hydrate(vec![MessageDraft::assistant_text("old")]));
        assert_eq!(store.len(), 1);
        assert_eq!(store.snapshot()[0].text.as_deref(), Some("mine"));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut store = MessageStore::new();
        store.append(MessageDraft::user_text("x"));
        store.reset();
        assert!(store.is_empty());
        assert!(!store.has_local_messages());
        assert!(store.hydrate(vec![MessageDraft::assistant_text("again")]));
    }

    #[test]
    fn test_get_by_id() {
        let mut store = MessageStore::new();
        let msg = store.append(MessageDraft::assistant_text("hi"));
        assert_eq!(store.get(&msg.id), Some(&msg));
        assert!(store.get("missing").is_none());
    }
}
