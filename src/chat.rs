//! In-memory deduplicated chat log.
//!
//! Append-only log keyed by `(origin_id, seqno)`, holding `add_message`,
//! `has_message`, `get_recent_messages` and `get_messages_since` over a
//! mutex-guarded `Vec`. Lets a consumer bind a chat UI without committing to a
//! storage engine; swapping in a real backing store is a drop-in replacement.

use std::sync::Mutex;

use crate::mesh::NodeId;

/// One stored chat message, keyed uniquely by `(origin_id, seqno)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub origin_id: NodeId,
    pub seqno: u32,
    pub channel: String,
    pub nick: String,
    pub text: String,
    pub ts: f64,
}

#[derive(Default)]
struct Inner {
    messages: Vec<ChatMessage>,
}

/// Append-only, deduplicated-on-`(origin_id, seqno)` chat log.
pub struct ChatStore {
    inner: Mutex<Inner>,
}

impl ChatStore {
    pub fn new() -> Self {
        ChatStore {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Insert a message, ignoring it if `(origin_id, seqno)` is already present.
    pub fn add_message(
        &self,
        origin_id: NodeId,
        seqno: u32,
        channel: impl Into<String>,
        nick: impl Into<String>,
        text: impl Into<String>,
        ts: f64,
    ) {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .messages
            .iter()
            .any(|m| m.origin_id == origin_id && m.seqno == seqno)
        {
            return;
        }
        inner.messages.push(ChatMessage {
            origin_id,
            seqno,
            channel: channel.into(),
            nick: nick.into(),
            text: text.into(),
            ts,
        });
    }

    pub fn has_message(&self, origin_id: NodeId, seqno: u32) -> bool {
        self.inner
            .lock()
            .unwrap()
            .messages
            .iter()
            .any(|m| m.origin_id == origin_id && m.seqno == seqno)
    }

    /// Latest `limit` messages in `channel`, oldest first (matching the original's
    /// `ORDER BY ts ASC`).
    pub fn get_recent_messages(&self, channel: &str, limit: usize) -> Vec<ChatMessage> {
        let inner = self.inner.lock().unwrap();
        let mut matching: Vec<ChatMessage> = inner
            .messages
            .iter()
            .filter(|m| m.channel == channel)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.ts.partial_cmp(&b.ts).unwrap());
        matching.truncate(limit);
        matching
    }

    /// Messages in `channel` with `ts > since_ts`, oldest first.
    pub fn get_messages_since(
        &self,
        channel: &str,
        since_ts: f64,
        limit: usize,
    ) -> Vec<ChatMessage> {
        let inner = self.inner.lock().unwrap();
        let mut matching: Vec<ChatMessage> = inner
            .messages
            .iter()
            .filter(|m| m.channel == channel && m.ts > since_ts)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.ts.partial_cmp(&b.ts).unwrap());
        matching.truncate(limit);
        matching
    }
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_has_message() {
        let store = ChatStore::new();
        let origin = [1u8; 8];
        assert!(!store.has_message(origin, 1));
        store.add_message(origin, 1, "general", "n0call", "hello", 100.0);
        assert!(store.has_message(origin, 1));
    }

    #[test]
    fn duplicate_key_is_ignored() {
        let store = ChatStore::new();
        let origin = [1u8; 8];
        store.add_message(origin, 1, "general", "n0call", "hello", 100.0);
        store.add_message(origin, 1, "general", "n0call", "rewritten", 200.0);
        let recent = store.get_recent_messages("general", 10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].text, "hello");
    }

    #[test]
    fn recent_messages_are_ordered_oldest_first_and_limited() {
        let store = ChatStore::new();
        let origin = [1u8; 8];
        for i in 0..5u32 {
            store.add_message(origin, i, "general", "n0call", format!("msg{i}"), i as f64);
        }
        let recent = store.get_recent_messages("general", 3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].text, "msg0");
        assert_eq!(recent[2].text, "msg2");
    }

    #[test]
    fn messages_since_filters_by_timestamp() {
        let store = ChatStore::new();
        let origin = [1u8; 8];
        for i in 0..5u32 {
            store.add_message(origin, i, "general", "n0call", format!("msg{i}"), i as f64);
        }
        let since = store.get_messages_since("general", 2.0, 10);
        assert_eq!(since.len(), 2);
        assert_eq!(since[0].text, "msg3");
        assert_eq!(since[1].text, "msg4");
    }

    #[test]
    fn channels_are_isolated() {
        let store = ChatStore::new();
        let origin = [1u8; 8];
        store.add_message(origin, 1, "general", "n0call", "hi", 1.0);
        store.add_message(origin, 2, "other", "n0call", "hi-there", 2.0);
        assert_eq!(store.get_recent_messages("general", 10).len(), 1);
        assert_eq!(store.get_recent_messages("other", 10).len(), 1);
    }
}
