//! Continuation tokens and per-conversation history.

use crate::Message;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Maximum number of messages kept per conversation.
const DEFAULT_MAX_MESSAGES: usize = 20;

/// Maximum number of conversations kept before the least recently used is
/// dropped.
const DEFAULT_MAX_CONVERSATIONS: usize = 1024;

#[derive(Debug, Default)]
struct Conversation {
    history: Vec<Message>,
    last_used: u64,
}

#[derive(Debug, Default)]
struct Conversations {
    entries: HashMap<String, Conversation>,
    clock: u64,
}

impl Conversations {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict_to(&mut self, capacity: usize) {
        while self.entries.len() > capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, c)| c.last_used)
                .map(|(token, _)| token.clone());
            match oldest {
                Some(token) => {
                    self.entries.remove(&token);
                    tracing::debug!(%token, "evicted idle conversation");
                }
                None => break,
            }
        }
    }
}

/// In-memory conversation history keyed by continuation token.
///
/// Remote chat APIs are stateless, so the clients keep a sliding window of
/// recent messages here and hand the caller an opaque token to resume it.
/// At most `max_conversations` are kept; the least recently used goes first.
/// A dropped token simply starts a fresh conversation.
#[derive(Debug)]
pub struct ConversationStore {
    conversations: Mutex<Conversations>,
    max_messages: usize,
    max_conversations: usize,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::with_max_messages(DEFAULT_MAX_MESSAGES)
    }

    pub fn with_max_messages(max_messages: usize) -> Self {
        Self {
            conversations: Mutex::new(Conversations::default()),
            max_messages: max_messages.max(2),
            max_conversations: DEFAULT_MAX_CONVERSATIONS,
        }
    }

    /// Limit how many conversations are kept at once.
    pub fn with_max_conversations(mut self, max_conversations: usize) -> Self {
        self.max_conversations = max_conversations.max(1);
        self
    }

    /// Resolve a continuation token into (token, history).
    ///
    /// Unknown or missing tokens start a fresh conversation under a new token.
    pub async fn resume(&self, token: Option<&str>) -> (String, Vec<Message>) {
        let mut conversations = self.conversations.lock().await;
        let now = conversations.tick();
        match token.and_then(|t| conversations.entries.get_mut(t).map(|c| (t, c))) {
            Some((token, conversation)) => {
                conversation.last_used = now;
                (token.to_string(), conversation.history.clone())
            }
            None => (Uuid::new_v4().to_string(), Vec::new()),
        }
    }

    /// Append one exchange to a conversation, trimming old messages.
    pub async fn record(&self, token: &str, prompt: &str, reply: &str) {
        let mut conversations = self.conversations.lock().await;
        let now = conversations.tick();
        let conversation = conversations.entries.entry(token.to_string()).or_default();
        conversation.last_used = now;
        conversation.history.push(Message::user(prompt));
        conversation.history.push(Message::assistant(reply));
        if conversation.history.len() > self.max_messages {
            let excess = conversation.history.len() - self.max_messages;
            conversation.history.drain(..excess);
        }
        conversations.evict_to(self.max_conversations);
    }

    /// Number of tracked conversations.
    pub async fn len(&self) -> usize {
        self.conversations.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_token_starts_fresh() {
        let store = ConversationStore::new();
        let (token, history) = store.resume(Some("missing")).await;
        assert_ne!(token, "missing");
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_history_is_resumed_and_trimmed() {
        let store = ConversationStore::with_max_messages(4);
        let (token, _) = store.resume(None).await;

        store.record(&token, "one", "1").await;
        store.record(&token, "two", "2").await;
        store.record(&token, "three", "3").await;

        let (resumed, history) = store.resume(Some(&token)).await;
        assert_eq!(resumed, token);
        assert_eq!(history.len(), 4);
        assert_eq!(history[0], Message::user("two"));
        assert_eq!(history[3], Message::assistant("3"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_conversation_count_is_bounded() {
        let store = ConversationStore::new().with_max_conversations(3);
        for i in 0..50 {
            let (token, _) = store.resume(None).await;
            store.record(&token, &format!("turn {i}"), "ok").await;
        }
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_least_recently_used_is_evicted() {
        let store = ConversationStore::new().with_max_conversations(2);
        let (a, _) = store.resume(None).await;
        store.record(&a, "a", "1").await;
        let (b, _) = store.resume(None).await;
        store.record(&b, "b", "1").await;

        // Touch `a` so `b` is the oldest.
        let (resumed, _) = store.resume(Some(&a)).await;
        assert_eq!(resumed, a);

        let (c, _) = store.resume(None).await;
        store.record(&c, "c", "1").await;

        assert_eq!(store.len().await, 2);
        assert_eq!(store.resume(Some(&a)).await.0, a);
        assert_ne!(store.resume(Some(&b)).await.0, b);
    }
}
