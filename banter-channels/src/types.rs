use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

id_newtype!(MessageId);
id_newtype!(ChannelId);
id_newtype!(UserId);
id_newtype!(ThreadId);

impl ChannelId {
    /// A managed thread is addressed by the same snowflake as its channel.
    pub fn as_thread(&self) -> ThreadId {
        ThreadId::new(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundEventKind {
    Message,
    ReactionAdded,
}

/// A platform event normalized for the gateway. For reactions, `message_id`
/// is the message the reaction landed on and `emoji` carries the symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub kind: InboundEventKind,
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    pub sender_id: UserId,
    pub is_direct: bool,
    pub mentions_bot: bool,
    pub content: String,
    #[serde(default)]
    pub emoji: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub content: String,
    #[serde(default)]
    pub reply_to_message_id: Option<MessageId>,
    #[serde(default)]
    pub attachment: Option<OutboundAttachment>,
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn reply(content: impl Into<String>, reply_to: MessageId) -> Self {
        Self {
            content: content.into(),
            reply_to_message_id: Some(reply_to),
            attachment: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A channel message fetched over REST, used to seed injected context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentMessage {
    pub sender_id: UserId,
    pub sender_name: String,
    pub content: String,
    pub from_bot: bool,
}
