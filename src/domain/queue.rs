// src/domain/queue.rs

//! Outbound queue and queue entries.
//!
//! A [`QueueEntry`] is the record exchanged between the client and the bound
//! transport: an owned message copy, an optional completion callback, the
//! caller's opaque context and an absolute expiry. Both sides treat the
//! record as-is; the transport may move entries out of the queue when it
//! starts sending them, but it must eventually hand them back through the
//! batch completion contract.
//!
//! Every entry reaches exactly one terminal status. The callback is an
//! `FnOnce` taken out of the entry the first time a status is delivered, and
//! an entry dropped without an explicit status reports
//! [`ConfirmationResult::Destroyed`] from its destructor, so an entry can be
//! neither silently lost nor confirmed twice.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::Message;

/// Terminal status delivered to a completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationResult {
    /// The transport reported the batch containing this message as sent.
    Confirmed,
    /// The client was destroyed while the message was still pending.
    Destroyed,
    /// The message expired before the transport picked it up.
    Timeout,
    /// The transport reported the batch containing this message as failed.
    Error,
}

/// Opaque application data returned to the callback by identity.
pub type UserContext = Arc<dyn Any + Send + Sync>;

/// Completion callback, invoked exactly once per accepted message.
pub type ConfirmationCallback = Box<dyn FnOnce(ConfirmationResult, Option<UserContext>) + Send>;

/// One accepted, not yet resolved outbound message.
pub struct QueueEntry {
    message: Message,
    callback: Option<ConfirmationCallback>,
    context: Option<UserContext>,
    expiry_ms: u64,
}

impl QueueEntry {
    /// Build an entry around an already copied message.
    ///
    /// `expiry_ms == 0` means the entry never expires.
    pub(crate) fn new(
        message: Message,
        callback: Option<ConfirmationCallback>,
        context: Option<UserContext>,
        expiry_ms: u64,
    ) -> Self {
        // ---
        Self {
            message,
            callback,
            context,
            expiry_ms,
        }
    }

    /// The client-owned copy of the application message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Absolute expiry in clock milliseconds, `0` for never.
    pub fn expiry_ms(&self) -> u64 {
        self.expiry_ms
    }

    /// Whether this entry has expired at `now_ms`.
    ///
    /// Expiry is strict: an entry due at `t` is still live when the clock
    /// reads exactly `t`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expiry_ms != 0 && self.expiry_ms < now_ms
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Deliver the terminal status and release the entry.
    pub(crate) fn complete(mut self, result: ConfirmationResult) {
        // ---
        self.fire(result);
    }

    fn fire(&mut self, result: ConfirmationResult) {
        // ---
        if let Some(callback) = self.callback.take() {
            callback(result, self.context.take());
        }
    }
}

impl Drop for QueueEntry {
    fn drop(&mut self) {
        // ---
        if self.callback.is_some() {
            crate::log_warn!("queue entry dropped without a terminal status; reporting Destroyed");
            self.fire(ConfirmationResult::Destroyed);
        }
    }
}

impl fmt::Debug for QueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        f.debug_struct("QueueEntry")
            .field("message_id", &self.message.message_id())
            .field("has_callback", &self.callback.is_some())
            .field("has_context", &self.context.is_some())
            .field("expiry_ms", &self.expiry_ms)
            .finish()
    }
}

/// A batch of entries detached from the queue by a transport.
pub type Batch = Vec<QueueEntry>;

/// FIFO of entries waiting for the transport, owned by one client.
///
/// Appends go to the tail and transports take from the head, so send order
/// is preserved. [`OutboundQueue::remove_where`] removes entries from the
/// middle while keeping the relative order of everything else.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    entries: VecDeque<QueueEntry>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn push_back(&mut self, entry: QueueEntry) {
        self.entries.push_back(entry);
    }

    /// Detach the oldest entry.
    pub fn pop_front(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    /// Detach up to `max` entries from the head, oldest first.
    pub fn take_batch(&mut self, max: usize) -> Batch {
        // ---
        let count = max.min(self.entries.len());
        self.entries.drain(..count).collect()
    }

    /// Detach every entry, oldest first.
    pub fn take_all(&mut self) -> Batch {
        self.entries.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    /// Remove every entry matching `predicate` in a single head-to-tail pass.
    ///
    /// Removed entries are returned in queue order. Entries that stay keep
    /// their relative order; removing one entry never causes the next one
    /// to be skipped. The queue is compacted in place.
    pub(crate) fn remove_where<F>(&mut self, mut predicate: F) -> Batch
    where
        F: FnMut(&QueueEntry) -> bool,
    {
        // ---
        let mut removed = Vec::new();

        for _ in 0..self.entries.len() {
            let Some(entry) = self.entries.pop_front() else {
                break;
            };
            if predicate(&entry) {
                removed.push(entry);
            } else {
                self.entries.push_back(entry);
            }
        }

        removed
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::sync::Mutex;

    fn entry(id: &str, expiry_ms: u64) -> QueueEntry {
        // ---
        let mut msg = Message::from_text(id);
        msg.set_message_id(id);
        QueueEntry::new(msg, None, None, expiry_ms)
    }

    fn ids(queue: &OutboundQueue) -> Vec<String> {
        // ---
        queue
            .iter()
            .map(|e| e.message().message_id().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_fifo_take() {
        // ---
        let mut queue = OutboundQueue::new();
        for id in ["a", "b", "c"] {
            queue.push_back(entry(id, 0));
        }

        let batch = queue.take_batch(2);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].message().message_id(), Some("a"));
        assert_eq!(batch[1].message().message_id(), Some("b"));
        assert_eq!(ids(&queue), vec!["c"]);

        assert_eq!(queue.take_batch(10).len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_adjacent_entries_keeps_order() {
        // ---
        let mut queue = OutboundQueue::new();
        queue.push_back(entry("a", 5));
        queue.push_back(entry("b", 5));
        queue.push_back(entry("c", 0));
        queue.push_back(entry("d", 5));
        queue.push_back(entry("e", 50));

        let removed = queue.remove_where(|e| e.is_expired(10));

        let removed_ids: Vec<_> = removed
            .iter()
            .map(|e| e.message().message_id().unwrap())
            .collect();
        assert_eq!(removed_ids, vec!["a", "b", "d"]);
        assert_eq!(ids(&queue), vec!["c", "e"]);
    }

    #[test]
    fn test_remove_without_match_keeps_storage() {
        // ---
        let mut queue = OutboundQueue::new();
        for id in ["a", "b", "c"] {
            queue.push_back(entry(id, 0));
        }
        let capacity = queue.entries.capacity();

        let removed = queue.remove_where(|e| e.is_expired(1_000));

        assert!(removed.is_empty());
        assert_eq!(removed.capacity(), 0);
        assert_eq!(queue.entries.capacity(), capacity);
        assert_eq!(ids(&queue), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_expiry_is_strict() {
        // ---
        let e = entry("a", 100);
        assert!(!e.is_expired(99));
        assert!(!e.is_expired(100));
        assert!(e.is_expired(101));

        let never = entry("b", 0);
        assert!(!never.is_expired(u64::MAX));
    }

    #[test]
    fn test_callback_fires_once_with_context() {
        // ---
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let context: UserContext = Arc::new(7u32);

        let e = QueueEntry::new(
            Message::from_text("x"),
            Some(Box::new(move |result, ctx| {
                let value = ctx.and_then(|c| c.downcast_ref::<u32>().copied());
                seen_clone.lock().unwrap().push((result, value));
            })),
            Some(context),
            0,
        );

        e.complete(ConfirmationResult::Confirmed);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(ConfirmationResult::Confirmed, Some(7))]
        );
    }

    #[test]
    fn test_dropped_entry_reports_destroyed() {
        // ---
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let e = QueueEntry::new(
            Message::from_text("x"),
            Some(Box::new(move |result, _| {
                seen_clone.lock().unwrap().push(result);
            })),
            None,
            0,
        );
        drop(e);

        assert_eq!(*seen.lock().unwrap(), vec![ConfirmationResult::Destroyed]);
    }
}
