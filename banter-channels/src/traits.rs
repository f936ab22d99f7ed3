use crate::types::{
    ChannelId, InboundEvent, MessageId, OutboundMessage, RecentMessage, ThreadId, UserId,
};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Platform I/O surface consumed by the gateway and the coordinator.
///
/// Implementations are pure adapters: they translate between platform
/// payloads and `InboundEvent` / `OutboundMessage` and hold no
/// conversational state.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Start receiving events. Spawns the connection loop and returns once
    /// it is running; each inbound message or reaction is pushed to `tx`
    /// until the connection is torn down.
    async fn start(&self, tx: mpsc::Sender<InboundEvent>) -> Result<()>;

    /// Send a message; the returned id is what the response registry tracks.
    async fn send_message(&self, channel: &ChannelId, message: OutboundMessage)
    -> Result<MessageId>;

    async fn edit_message(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        content: &str,
    ) -> Result<()>;

    async fn delete_message(&self, channel: &ChannelId, message: &MessageId) -> Result<()>;

    /// One ephemeral typing ping; the platform clears it after roughly ten
    /// seconds, so the concurrency gate re-sends while requests are in flight.
    async fn start_typing(&self, channel: &ChannelId) -> Result<()>;

    async fn add_reaction(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        emoji: &str,
    ) -> Result<()>;

    /// Remove a reaction; `user` of `None` means the bot's own reaction.
    async fn remove_reaction(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        emoji: &str,
        user: Option<&UserId>,
    ) -> Result<()>;

    /// The most recent messages in a channel, oldest first, up to `limit`.
    async fn recent_messages(&self, channel: &ChannelId, limit: u32) -> Result<Vec<RecentMessage>>;

    /// Create a thread off an existing message.
    async fn create_thread(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        name: &str,
    ) -> Result<ThreadId>;
}
