//! Chat-platform adapter for Banter.
//!
//! Adapters are pure I/O: they convert platform payloads to/from
//! [`InboundEvent`] / [`OutboundMessage`] and hold no conversational state.

mod discord;
mod traits;
mod types;

pub use discord::DiscordAdapter;
pub use traits::ChatPlatform;
pub use types::{
    ChannelId, InboundEvent, InboundEventKind, MessageId, OutboundAttachment, OutboundMessage,
    RecentMessage, ThreadId, UserId,
};
