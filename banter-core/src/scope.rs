//! Scope keys: which conversation's state an event belongs to.

use banter_channels::{ChannelId, ThreadId, UserId};

/// Index for all per-conversation state. Managed threads share one scope for
/// everyone in the thread; the other variants are per-user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    Thread(ThreadId),
    DirectMessage(UserId),
    TrackedChannel(UserId),
    Mention(UserId),
}

impl ScopeKey {
    /// The owning user, when the scope is per-user.
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Thread(_) => None,
            Self::DirectMessage(user) | Self::TrackedChannel(user) | Self::Mention(user) => {
                Some(user)
            }
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::Thread(_) => "this thread",
            Self::DirectMessage(_) => "your DMs",
            Self::TrackedChannel(_) => "this tracked channel",
            Self::Mention(_) => "your @mentions",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScopeInput<'a> {
    pub channel_id: &'a ChannelId,
    pub sender_id: &'a UserId,
    /// The channel is a thread the bot created and responds in.
    pub is_managed_thread: bool,
    /// The channel is on the always-respond tracked list.
    pub is_tracked_channel: bool,
    pub is_direct: bool,
}

/// Resolve the scope for an inbound event. Priority is fixed:
/// Thread > DirectMessage > TrackedChannel > Mention, so a thread inside a
/// tracked channel uses the shared thread scope, not a per-user one.
/// Infallible: every event resolves to exactly one key.
pub fn resolve_scope(input: ScopeInput<'_>) -> ScopeKey {
    if input.is_managed_thread {
        return ScopeKey::Thread(input.channel_id.as_thread());
    }
    if input.is_direct {
        return ScopeKey::DirectMessage(input.sender_id.clone());
    }
    if input.is_tracked_channel {
        return ScopeKey::TrackedChannel(input.sender_id.clone());
    }
    ScopeKey::Mention(input.sender_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(
        channel_id: &'a ChannelId,
        sender_id: &'a UserId,
        thread: bool,
        tracked: bool,
        direct: bool,
    ) -> ScopeInput<'a> {
        ScopeInput {
            channel_id,
            sender_id,
            is_managed_thread: thread,
            is_tracked_channel: tracked,
            is_direct: direct,
        }
    }

    #[test]
    fn thread_wins_over_everything() {
        let channel = ChannelId::new("c1");
        let sender = UserId::new("u1");
        let scope = resolve_scope(input(&channel, &sender, true, true, true));
        assert_eq!(scope, ScopeKey::Thread(ThreadId::new("c1")));
    }

    #[test]
    fn direct_message_wins_over_tracked() {
        let channel = ChannelId::new("c1");
        let sender = UserId::new("u1");
        let scope = resolve_scope(input(&channel, &sender, false, true, true));
        assert_eq!(scope, ScopeKey::DirectMessage(UserId::new("u1")));
    }

    #[test]
    fn tracked_channel_wins_over_mention() {
        let channel = ChannelId::new("c1");
        let sender = UserId::new("u1");
        let scope = resolve_scope(input(&channel, &sender, false, true, false));
        assert_eq!(scope, ScopeKey::TrackedChannel(UserId::new("u1")));
    }

    #[test]
    fn mention_is_the_fallback() {
        let channel = ChannelId::new("c1");
        let sender = UserId::new("u1");
        let scope = resolve_scope(input(&channel, &sender, false, false, false));
        assert_eq!(scope, ScopeKey::Mention(UserId::new("u1")));
    }

    #[test]
    fn identity_is_by_tag_and_id() {
        assert_ne!(
            ScopeKey::DirectMessage(UserId::new("u1")),
            ScopeKey::Mention(UserId::new("u1"))
        );
        assert_eq!(
            ScopeKey::TrackedChannel(UserId::new("u1")),
            ScopeKey::TrackedChannel(UserId::new("u1"))
        );
    }
}
