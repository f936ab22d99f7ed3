//! Bounded index of delivered responses, for reaction-driven follow-ups.
//!
//! Each delivered response is remembered together with who asked for it and
//! which scope produced it, so a later delete/regenerate reaction can be
//! author-gated and can fix up the right history. The index is an LRU over
//! insertion order; once full, the oldest record silently stops being
//! actionable, which is fine for a reaction affordance.

use crate::scope::ScopeKey;
use banter_channels::{ChannelId, MessageId, UserId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub const MAX_TRACKED_RESPONSES: usize = 1000;

/// Everything needed to act on a delivered response later.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedResponse {
    /// The user whose message triggered the response. Only they may act.
    pub author_id: UserId,
    pub scope: ScopeKey,
    pub channel_id: ChannelId,
    /// All platform messages the response was delivered as, in send order.
    pub message_ids: Vec<MessageId>,
    /// The prompt text the response answered, kept for regeneration.
    pub prompt: String,
}

struct RegistryInner {
    by_message: HashMap<MessageId, Arc<TrackedResponse>>,
    // Primary (first) message id per record, oldest first.
    order: VecDeque<MessageId>,
}

pub struct ResponseRegistry {
    capacity: usize,
    inner: Mutex<RegistryInner>,
}

impl Default for ResponseRegistry {
    fn default() -> Self {
        Self::new(MAX_TRACKED_RESPONSES)
    }
}

impl ResponseRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(RegistryInner {
                by_message: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Record a delivered response. Every message id of the response becomes
    /// a lookup key for the same record. A record with no message ids is
    /// not actionable and is ignored.
    pub fn track(&self, response: TrackedResponse) {
        let Some(primary) = response.message_ids.first().cloned() else {
            return;
        };
        let record = Arc::new(response);
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        for id in &record.message_ids {
            inner.by_message.insert(id.clone(), record.clone());
        }
        inner.order.push_back(primary);
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                Self::drop_record(&mut inner, &oldest);
            }
        }
    }

    /// The record a reacted-to message belongs to, if still tracked.
    pub fn lookup(&self, message_id: &MessageId) -> Option<TrackedResponse> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        inner.by_message.get(message_id).map(|r| (**r).clone())
    }

    /// Forget the record owning this message id (all of its ids at once).
    /// Returns the record so the caller can clean up the visible messages.
    pub fn remove(&self, message_id: &MessageId) -> Option<TrackedResponse> {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let record = inner.by_message.get(message_id)?.clone();
        let primary = record.message_ids.first().cloned();
        Self::drop_record(&mut inner, message_id);
        if let Some(primary) = primary {
            inner.order.retain(|id| *id != primary);
        }
        Some((*record).clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("registry lock poisoned").order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn drop_record(inner: &mut RegistryInner, member: &MessageId) {
        if let Some(record) = inner.by_message.get(member).cloned() {
            for id in &record.message_ids {
                inner.by_message.remove(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(primary: &str, author: &str) -> TrackedResponse {
        TrackedResponse {
            author_id: UserId::new(author),
            scope: ScopeKey::DirectMessage(UserId::new(author)),
            channel_id: ChannelId::new("c1"),
            message_ids: vec![MessageId::new(primary)],
            prompt: "what is rust".to_string(),
        }
    }

    #[test]
    fn track_lookup_remove_round_trip() {
        let registry = ResponseRegistry::new(10);
        registry.track(response("m1", "u1"));

        let found = registry.lookup(&MessageId::new("m1")).expect("tracked");
        assert_eq!(found.author_id, UserId::new("u1"));

        let removed = registry.remove(&MessageId::new("m1")).expect("removed");
        assert_eq!(removed.message_ids, vec![MessageId::new("m1")]);
        assert!(registry.lookup(&MessageId::new("m1")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn every_message_id_resolves_to_the_same_record() {
        let registry = ResponseRegistry::new(10);
        let mut multi = response("m1", "u1");
        multi.message_ids.push(MessageId::new("m2"));
        registry.track(multi);

        assert!(registry.lookup(&MessageId::new("m1")).is_some());
        assert!(registry.lookup(&MessageId::new("m2")).is_some());
        assert_eq!(registry.len(), 1);

        // Removing via a non-primary id still drops the whole record.
        registry.remove(&MessageId::new("m2")).expect("removed");
        assert!(registry.lookup(&MessageId::new("m1")).is_none());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn oldest_record_is_evicted_at_capacity() {
        let registry = ResponseRegistry::new(3);
        for i in 0..4 {
            registry.track(response(&format!("m{i}"), "u1"));
        }

        assert_eq!(registry.len(), 3);
        assert!(registry.lookup(&MessageId::new("m0")).is_none());
        assert!(registry.lookup(&MessageId::new("m1")).is_some());
        assert!(registry.lookup(&MessageId::new("m3")).is_some());
    }

    #[test]
    fn untracked_lookups_and_removes_are_none() {
        let registry = ResponseRegistry::new(3);
        assert!(registry.lookup(&MessageId::new("ghost")).is_none());
        assert!(registry.remove(&MessageId::new("ghost")).is_none());
    }

    #[test]
    fn empty_message_id_list_is_ignored() {
        let registry = ResponseRegistry::new(3);
        let mut r = response("m1", "u1");
        r.message_ids.clear();
        registry.track(r);
        assert!(registry.is_empty());
    }
}
