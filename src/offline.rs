//! Offline message cache
//!
//! Keeps the last N normal messages for every joining user and, per
//! mentioned nickname, the last N messages that mention that nickname.
//! Both are fixed-capacity rings: a full ring overwrites its oldest slot.
//! Only the broadcaster actor touches the cache.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::message::{Message, MessageKind};
use crate::user::User;

/// Fixed-capacity circular buffer
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    /// Next slot to write
    cursor: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty ring
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
            cursor: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert, overwriting the oldest entry once full
    pub fn push(&mut self, value: T) {
        self.slots[self.cursor] = Some(value);
        self.cursor = (self.cursor + 1) % self.slots.len();
        self.len = (self.len + 1).min(self.slots.len());
    }

    /// Entries from oldest to newest; unwritten slots are skipped
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let (newer, older) = self.slots.split_at(self.cursor);
        older.iter().chain(newer).filter_map(Option::as_ref)
    }
}

/// Replay store for recent and mention-targeted messages
#[derive(Debug)]
pub struct OfflineCache {
    capacity: usize,
    recent: RingBuffer<Arc<Message>>,
    mentions: HashMap<String, RingBuffer<Arc<Message>>>,
}

impl OfflineCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            recent: RingBuffer::new(capacity),
            mentions: HashMap::new(),
        }
    }

    /// Record a message; anything but a normal chat message is ignored
    pub fn save(&mut self, msg: &Arc<Message>) {
        if msg.kind() != MessageKind::Normal {
            return;
        }

        self.recent.push(Arc::clone(msg));

        let capacity = self.capacity;
        for nickname in msg.mentioned_nicknames() {
            self.mentions
                .entry(nickname.to_string())
                .or_insert_with(|| RingBuffer::new(capacity))
                .push(Arc::clone(msg));
        }
    }

    /// Messages to replay to a user who just entered the room
    ///
    /// Always includes the shared recent history. A returning user also gets
    /// the messages that mentioned them, which are then discarded. A mention
    /// still present in the recent history is not repeated.
    pub fn replay(&mut self, user: &User) -> Vec<Arc<Message>> {
        let mut out: Vec<_> = self.recent.iter().cloned().collect();
        let recent_len = out.len();

        if user.is_new() {
            return out;
        }

        if let Some(ring) = self.mentions.remove(user.nickname()) {
            debug!(
                nickname = %user.nickname(),
                count = ring.len(),
                "Replaying mentions"
            );
            for msg in ring.iter() {
                if !out[..recent_len].iter().any(|m| Arc::ptr_eq(m, msg)) {
                    out.push(Arc::clone(msg));
                }
            }
        }

        out
    }

    /// Number of nicknames with pending mentions
    pub fn pending_mention_rings(&self) -> usize {
        self.mentions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;

    fn user(nickname: &str, is_new: bool) -> User {
        User::new(UserId(9), nickname, "127.0.0.1:1", "tok", is_new)
    }

    fn normal(content: &str) -> Arc<Message> {
        Arc::new(Message::normal(&user("bob", true), content))
    }

    fn contents(msgs: &[Arc<Message>]) -> Vec<&str> {
        msgs.iter().map(|m| m.content()).collect()
    }

    #[test]
    fn test_ring_partial_fill() {
        let mut ring = RingBuffer::new(3);
        ring.push(1);
        ring.push(2);

        assert_eq!(ring.len(), 2);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_ring_overwrites_oldest() {
        let mut ring = RingBuffer::new(3);
        for i in 1..=5 {
            ring.push(i);
        }

        assert_eq!(ring.len(), 3);
        assert_eq!(ring.capacity(), 3);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[test]
    fn test_recent_keeps_last_n() {
        let mut cache = OfflineCache::new(3);
        for content in ["a", "b", "c", "d"] {
            cache.save(&normal(content));
        }

        let replay = cache.replay(&user("carol", true));
        assert_eq!(contents(&replay), vec!["b", "c", "d"]);

        // Shared history survives replay
        let again = cache.replay(&user("dave", true));
        assert_eq!(contents(&again), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_non_normal_messages_ignored() {
        let mut cache = OfflineCache::new(3);
        let bob = user("bob", true);
        cache.save(&Arc::new(Message::user_entered(&bob)));
        cache.save(&Arc::new(Message::welcome(&bob)));
        cache.save(&Arc::new(Message::error("oops")));

        assert!(cache.replay(&user("carol", false)).is_empty());
    }

    #[test]
    fn test_mentions_consumed_once() {
        let mut cache = OfflineCache::new(3);
        cache.save(&normal("@alice hi"));
        assert_eq!(cache.pending_mention_rings(), 1);

        let first = cache.replay(&user("alice", false));
        assert_eq!(contents(&first), vec!["@alice hi"]);
        assert_eq!(cache.pending_mention_rings(), 0);

        let second = cache.replay(&user("alice", false));
        assert_eq!(contents(&second), vec!["@alice hi"]);
    }

    #[test]
    fn test_new_user_skips_mentions() {
        let mut cache = OfflineCache::new(3);
        cache.save(&normal("@alice hi"));

        let replay = cache.replay(&user("alice", true));
        assert_eq!(contents(&replay), vec!["@alice hi"]);
        // Ring is kept for a later returning session
        assert_eq!(cache.pending_mention_rings(), 1);
    }

    #[test]
    fn test_mentions_outlive_recent_history() {
        let mut cache = OfflineCache::new(2);
        for content in ["@alice 1", "x", "y"] {
            cache.save(&normal(content));
        }

        let replay = cache.replay(&user("alice", false));
        assert_eq!(contents(&replay), vec!["x", "y", "@alice 1"]);

        let again = cache.replay(&user("alice", false));
        assert_eq!(contents(&again), vec!["x", "y"]);
    }

    #[test]
    fn test_mention_ring_is_bounded() {
        let mut cache = OfflineCache::new(2);
        for content in ["@alice 1", "@alice 2", "@alice 3", "x", "y"] {
            cache.save(&normal(content));
        }

        let replay = cache.replay(&user("alice", false));
        assert_eq!(contents(&replay), vec!["x", "y", "@alice 2", "@alice 3"]);
    }
}
