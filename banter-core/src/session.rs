//! Per-scope conversational state: history, settings, pending context.
//!
//! Every operation is a single atomic map access with no suspension point
//! between read and write, so concurrent tasks never observe a torn update
//! for a given scope. None of these operations fail; absent entries default.

use crate::scope::ScopeKey;
use banter_channels::{ChannelId, UserId};
use banter_llm::{Content, Role, ThinkingLevel};
use dashmap::DashMap;

pub const DEFAULT_MAX_HISTORY: usize = 30;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSettings {
    pub thinking: ThinkingLevel,
    pub persona: Option<String>,
}

/// Temporarily injected context, consumed by the next `remaining_uses`
/// messages in the scope. `listen_channel` arms mention-free responses in
/// that channel while the context lives.
#[derive(Debug, Clone)]
pub struct PendingContext {
    pub contents: Vec<Content>,
    pub remaining_uses: u32,
    pub listen_channel: Option<ChannelId>,
}

pub struct SessionStore {
    max_history: usize,
    histories: DashMap<ScopeKey, Vec<Content>>,
    settings: DashMap<ScopeKey, SessionSettings>,
    pending: DashMap<ScopeKey, PendingContext>,
}

impl SessionStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history,
            histories: DashMap::new(),
            settings: DashMap::new(),
            pending: DashMap::new(),
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Stored settings, or defaults. Reading never creates an entry.
    pub fn settings(&self, scope: &ScopeKey) -> SessionSettings {
        self.settings
            .get(scope)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Full replace, not a merge.
    pub fn set_settings(&self, scope: &ScopeKey, settings: SessionSettings) {
        self.settings.insert(scope.clone(), settings);
    }

    /// Append one entry, evicting from the front while over the bound.
    /// Entries with no parts are dropped so an empty generation result never
    /// lands in history.
    pub fn append_history(&self, scope: &ScopeKey, entry: Content) {
        if entry.parts.is_empty() {
            return;
        }
        let mut history = self.histories.entry(scope.clone()).or_default();
        history.push(entry);
        let len = history.len();
        if len > self.max_history {
            history.drain(0..len - self.max_history);
        }
    }

    /// Copy-on-read snapshot; later mutations do not show through.
    pub fn history(&self, scope: &ScopeKey) -> Vec<Content> {
        self.histories
            .get(scope)
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    pub fn clear_history(&self, scope: &ScopeKey) {
        self.histories.remove(scope);
    }

    /// Remove the most recent Model-role entry, searching from the end.
    /// Keeps history aligned with the visible chat after a delete/regenerate.
    pub fn remove_last_model_entry(&self, scope: &ScopeKey) {
        if let Some(mut history) = self.histories.get_mut(scope) {
            if let Some(pos) = history.iter().rposition(|c| c.role == Role::Model) {
                history.remove(pos);
            }
        }
    }

    /// Replaces any existing pending context for the scope.
    pub fn set_pending_context(
        &self,
        scope: &ScopeKey,
        contents: Vec<Content>,
        remaining_uses: u32,
        listen_channel: Option<ChannelId>,
    ) {
        self.pending.insert(
            scope.clone(),
            PendingContext {
                contents,
                remaining_uses: remaining_uses.max(1),
                listen_channel,
            },
        );
    }

    /// Read-only fetch; safe to repeat without consuming a use.
    pub fn pending_context(&self, scope: &ScopeKey) -> Option<Vec<Content>> {
        self.pending.get(scope).map(|p| p.contents.clone())
    }

    pub fn pending_context_status(&self, scope: &ScopeKey) -> Option<(usize, u32)> {
        self.pending
            .get(scope)
            .map(|p| (p.contents.len(), p.remaining_uses))
    }

    /// Burn one use. Deletes the entry when it reaches zero; returns the
    /// remaining uses afterwards (0 when absent or just deleted).
    pub fn decrement_pending_context(&self, scope: &ScopeKey) -> u32 {
        let Some(mut entry) = self.pending.get_mut(scope) else {
            return 0;
        };
        entry.remaining_uses = entry.remaining_uses.saturating_sub(1);
        let remaining = entry.remaining_uses;
        drop(entry);
        if remaining == 0 {
            self.pending.remove(scope);
        }
        remaining
    }

    pub fn clear_pending_context(&self, scope: &ScopeKey) {
        self.pending.remove(scope);
    }

    /// Whether any of the user's pending contexts is armed to auto-respond
    /// in this channel, letting the bot answer without an explicit mention.
    pub fn has_auto_respond_channel(&self, user: &UserId, channel: &ChannelId) -> bool {
        self.pending.iter().any(|entry| {
            entry.key().user_id() == Some(user)
                && entry.value().listen_channel.as_ref() == Some(channel)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_llm::ContentPart;

    fn scope() -> ScopeKey {
        ScopeKey::DirectMessage(UserId::new("u1"))
    }

    #[test]
    fn history_never_exceeds_the_bound() {
        let store = SessionStore::new(3);
        let scope = scope();
        for i in 0..10 {
            store.append_history(&scope, Content::user_text(format!("m{i}")));
            assert!(store.history(&scope).len() <= 3);
        }
        let history = store.history(&scope);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].parts[0].as_text(), Some("m7"));
        assert_eq!(history[2].parts[0].as_text(), Some("m9"));
    }

    #[test]
    fn empty_entries_are_not_recorded() {
        let store = SessionStore::new(5);
        let scope = scope();
        store.append_history(
            &scope,
            Content {
                role: Role::Model,
                parts: vec![],
            },
        );
        assert!(store.history(&scope).is_empty());
    }

    #[test]
    fn settings_read_does_not_create_state() {
        let store = SessionStore::new(5);
        let scope = scope();
        let settings = store.settings(&scope);
        assert_eq!(settings, SessionSettings::default());
        assert_eq!(store.settings.len(), 0);

        store.set_settings(
            &scope,
            SessionSettings {
                thinking: ThinkingLevel::High,
                persona: Some("pirate".to_string()),
            },
        );
        assert_eq!(store.settings(&scope).thinking, ThinkingLevel::High);
    }

    #[test]
    fn pending_context_decrements_to_deletion() {
        let store = SessionStore::new(5);
        let scope = scope();
        store.set_pending_context(&scope, vec![Content::user_text("ctx")], 3, None);

        assert_eq!(store.decrement_pending_context(&scope), 2);
        assert_eq!(store.decrement_pending_context(&scope), 1);
        assert!(store.pending_context(&scope).is_some());
        assert_eq!(store.pending_context_status(&scope), Some((1, 1)));

        assert_eq!(store.decrement_pending_context(&scope), 0);
        assert!(store.pending_context(&scope).is_none());
        // Absent entry keeps returning 0.
        assert_eq!(store.decrement_pending_context(&scope), 0);
    }

    #[test]
    fn pending_context_read_is_repeatable() {
        let store = SessionStore::new(5);
        let scope = scope();
        store.set_pending_context(&scope, vec![Content::user_text("ctx")], 2, None);
        assert!(store.pending_context(&scope).is_some());
        assert!(store.pending_context(&scope).is_some());
        assert_eq!(store.pending_context_status(&scope), Some((1, 2)));
    }

    #[test]
    fn auto_respond_matches_user_and_channel() {
        let store = SessionStore::new(5);
        let scope = ScopeKey::Mention(UserId::new("u1"));
        let channel = ChannelId::new("c9");
        store.set_pending_context(
            &scope,
            vec![Content::user_text("ctx")],
            5,
            Some(channel.clone()),
        );

        assert!(store.has_auto_respond_channel(&UserId::new("u1"), &channel));
        assert!(!store.has_auto_respond_channel(&UserId::new("u2"), &channel));
        assert!(!store.has_auto_respond_channel(&UserId::new("u1"), &ChannelId::new("other")));

        store.clear_pending_context(&scope);
        assert!(!store.has_auto_respond_channel(&UserId::new("u1"), &channel));
    }

    #[test]
    fn remove_last_model_entry_trims_from_the_end() {
        let store = SessionStore::new(10);
        let scope = scope();
        store.append_history(&scope, Content::user_text("A"));
        store.append_history(&scope, Content::model_text("B"));
        store.append_history(&scope, Content::user_text("C"));
        store.append_history(&scope, Content::model_text("D"));

        store.remove_last_model_entry(&scope);
        let history = store.history(&scope);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].parts[0].as_text(), Some("A"));
        assert_eq!(history[1].parts[0].as_text(), Some("B"));
        assert_eq!(history[2].parts[0].as_text(), Some("C"));

        // Idempotent when no model entry is left between calls.
        store.remove_last_model_entry(&scope);
        store.remove_last_model_entry(&scope);
        assert_eq!(store.history(&scope).len(), 1);
    }

    #[test]
    fn clears_are_idempotent() {
        let store = SessionStore::new(5);
        let scope = scope();
        store.clear_history(&scope);
        store.clear_pending_context(&scope);
        store.append_history(&scope, Content::user_text("x"));
        store.clear_history(&scope);
        assert!(store.history(&scope).is_empty());
    }

    #[test]
    fn three_exchanges_with_bound_two_keep_the_last_pair() {
        let store = SessionStore::new(2);
        let scope = scope();
        for i in 0..3 {
            store.append_history(&scope, Content::user_text(format!("hello {i}")));
            store.append_history(&scope, Content::model_text(format!("reply {i}")));
        }
        let history = store.history(&scope);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].parts[0].as_text(), Some("hello 2"));
        assert_eq!(history[1].parts[0].as_text(), Some("reply 2"));
    }
}
