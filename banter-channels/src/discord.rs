use crate::traits::ChatPlatform;
use crate::types::{
    ChannelId, InboundEvent, InboundEventKind, MessageId, OutboundMessage, RecentMessage, ThreadId,
    UserId,
};
use anyhow::Result;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_tungstenite::tungstenite::Message;

const DISCORD_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

// GUILD_MESSAGES | GUILD_MESSAGE_REACTIONS | DIRECT_MESSAGES |
// DIRECT_MESSAGE_REACTIONS | MESSAGE_CONTENT
const DISCORD_DEFAULT_INTENTS: u64 = (1 << 9) | (1 << 10) | (1 << 12) | (1 << 13) | (1 << 15);

#[derive(Clone)]
pub struct DiscordAdapter {
    http: reqwest::Client,
    bot_token: String,
    gateway_intents: u64,
    bot_user_id: Arc<RwLock<Option<String>>>,
}

impl DiscordAdapter {
    pub fn new(bot_token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            bot_token: bot_token.to_string(),
            gateway_intents: DISCORD_DEFAULT_INTENTS,
            bot_user_id: Arc::new(RwLock::new(None)),
        })
    }

    pub fn with_gateway_intents(mut self, gateway_intents: u64) -> Self {
        self.gateway_intents = gateway_intents;
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("https://discord.com/api/v10{path}")
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.bot_token)
    }

    async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "discord {what} failed: status={status} body={text}"
            ));
        }
        Ok(resp)
    }
}

#[async_trait::async_trait]
impl ChatPlatform for DiscordAdapter {
    async fn start(&self, tx: mpsc::Sender<InboundEvent>) -> Result<()> {
        let adapter = self.clone();
        tokio::spawn(async move {
            if let Err(e) = adapter.run_gateway(tx).await {
                tracing::error!(%e, "discord gateway loop exited");
            }
        });
        Ok(())
    }

    async fn send_message(
        &self,
        channel: &ChannelId,
        message: OutboundMessage,
    ) -> Result<MessageId> {
        let url = self.api_url(&format!("/channels/{channel}/messages"));
        let mut payload = serde_json::json!({ "content": message.content });
        if let Some(reply_to) = message.reply_to_message_id.as_ref() {
            payload["message_reference"] = serde_json::json!({ "message_id": reply_to.as_str() });
        }

        let request = self.http.post(url).header("Authorization", self.auth());
        let resp = if let Some(attachment) = message.attachment {
            payload["attachments"] =
                serde_json::json!([{ "id": 0, "filename": attachment.filename }]);
            let part = reqwest::multipart::Part::bytes(attachment.bytes)
                .file_name(attachment.filename.clone())
                .mime_str(&attachment.content_type)?;
            let form = reqwest::multipart::Form::new()
                .text("payload_json", payload.to_string())
                .part("files[0]", part);
            request.multipart(form).send().await?
        } else {
            request.json(&payload).send().await?
        };

        let resp = Self::check(resp, "send").await?;
        let created: DiscordMessageRef = resp.json().await?;
        Ok(created.id.into())
    }

    async fn edit_message(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        content: &str,
    ) -> Result<()> {
        let url = self.api_url(&format!("/channels/{channel}/messages/{message}"));
        let resp = self
            .http
            .patch(url)
            .header("Authorization", self.auth())
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await?;
        Self::check(resp, "edit").await?;
        Ok(())
    }

    async fn delete_message(&self, channel: &ChannelId, message: &MessageId) -> Result<()> {
        let url = self.api_url(&format!("/channels/{channel}/messages/{message}"));
        let resp = self
            .http
            .delete(url)
            .header("Authorization", self.auth())
            .send()
            .await?;
        Self::check(resp, "delete").await?;
        Ok(())
    }

    async fn start_typing(&self, channel: &ChannelId) -> Result<()> {
        let url = self.api_url(&format!("/channels/{channel}/typing"));
        let resp = self
            .http
            .post(url)
            .header("Authorization", self.auth())
            .header("Content-Length", "0")
            .send()
            .await?;
        Self::check(resp, "typing").await?;
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        emoji: &str,
    ) -> Result<()> {
        let url = self.api_url(&format!(
            "/channels/{channel}/messages/{message}/reactions/{}/@me",
            percent_encode(emoji)
        ));
        let resp = self
            .http
            .put(url)
            .header("Authorization", self.auth())
            .header("Content-Length", "0")
            .send()
            .await?;
        Self::check(resp, "add reaction").await?;
        Ok(())
    }

    async fn remove_reaction(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        emoji: &str,
        user: Option<&UserId>,
    ) -> Result<()> {
        let target = match user {
            Some(user) => user.as_str().to_string(),
            None => "@me".to_string(),
        };
        let url = self.api_url(&format!(
            "/channels/{channel}/messages/{message}/reactions/{}/{target}",
            percent_encode(emoji)
        ));
        let resp = self
            .http
            .delete(url)
            .header("Authorization", self.auth())
            .send()
            .await?;
        Self::check(resp, "remove reaction").await?;
        Ok(())
    }

    async fn recent_messages(&self, channel: &ChannelId, limit: u32) -> Result<Vec<RecentMessage>> {
        let url = self.api_url(&format!("/channels/{channel}/messages?limit={limit}"));
        let resp = self
            .http
            .get(url)
            .header("Authorization", self.auth())
            .send()
            .await?;
        let resp = Self::check(resp, "list messages").await?;
        // Discord returns newest first.
        let mut messages: Vec<DiscordStoredMessage> = resp.json().await?;
        messages.reverse();
        Ok(messages
            .into_iter()
            .map(|m| RecentMessage {
                sender_id: m.author.id.clone().into(),
                sender_name: if m.author.username.is_empty() {
                    m.author.id
                } else {
                    m.author.username
                },
                content: m.content,
                from_bot: m.author.bot,
            })
            .collect())
    }

    async fn create_thread(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        name: &str,
    ) -> Result<ThreadId> {
        let url = self.api_url(&format!("/channels/{channel}/messages/{message}/threads"));
        let resp = self
            .http
            .post(url)
            .header("Authorization", self.auth())
            .json(&serde_json::json!({ "name": name, "auto_archive_duration": 1440 }))
            .send()
            .await?;
        let resp = Self::check(resp, "create thread").await?;
        let created: DiscordMessageRef = resp.json().await?;
        Ok(created.id.into())
    }
}

impl DiscordAdapter {
    async fn run_gateway(&self, tx: mpsc::Sender<InboundEvent>) -> Result<()> {
        let (ws, _) = tokio_tungstenite::connect_async(DISCORD_GATEWAY_URL).await?;
        let (write, mut read) = ws.split();
        let write = Arc::new(Mutex::new(write));

        // HELLO.
        let heartbeat_interval_ms: u64 = if let Some(msg) = read.next().await {
            let msg = msg?;
            let v: serde_json::Value = serde_json::from_str(msg.to_text()?)?;
            v.get("d")
                .and_then(|d| d.get("heartbeat_interval"))
                .and_then(|x| x.as_u64())
                .ok_or_else(|| anyhow::anyhow!("discord HELLO missing heartbeat_interval"))?
        } else {
            return Err(anyhow::anyhow!("discord gateway closed before HELLO"));
        };

        // IDENTIFY.
        let identify = serde_json::json!({
            "op": 2,
            "d": {
                "token": format!("Bot {}", self.bot_token),
                "intents": self.gateway_intents,
                "properties": { "os": "linux", "browser": "banter", "device": "banter" }
            }
        });
        write
            .lock()
            .await
            .send(Message::Text(identify.to_string().into()))
            .await?;

        let seq: Arc<RwLock<Option<i64>>> = Arc::new(RwLock::new(None));

        // Heartbeat loop.
        {
            let write = write.clone();
            let seq = seq.clone();
            tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval(std::time::Duration::from_millis(heartbeat_interval_ms));
                loop {
                    interval.tick().await;
                    let s = *seq.read().await;
                    let payload = serde_json::json!({ "op": 1, "d": s });
                    if write
                        .lock()
                        .await
                        .send(Message::Text(payload.to_string().into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            });
        }

        while let Some(msg) = read.next().await {
            let msg = msg?;
            let txt = msg.to_text()?;
            let v: serde_json::Value = serde_json::from_str(txt)?;

            if let Some(s) = v.get("s").and_then(|s| s.as_i64()) {
                *seq.write().await = Some(s);
            }

            let op = v
                .get("op")
                .and_then(|o| o.as_i64())
                .ok_or_else(|| anyhow::anyhow!("discord payload missing op"))?;
            if op == 11 {
                continue;
            }

            match v.get("t").and_then(|t| t.as_str()) {
                Some("READY") => {
                    let id = v
                        .get("d")
                        .and_then(|d| d.get("user"))
                        .and_then(|u| u.get("id"))
                        .and_then(|id| id.as_str())
                        .map(|s| s.to_string());
                    tracing::info!(bot_user_id = ?id, "discord gateway ready");
                    *self.bot_user_id.write().await = id;
                }
                Some("MESSAGE_CREATE") => {
                    let payload = v
                        .get("d")
                        .cloned()
                        .ok_or_else(|| anyhow::anyhow!("discord MESSAGE_CREATE missing payload"))?;
                    let event: DiscordMessageCreate = serde_json::from_value(payload)?;
                    if event.author.bot || event.mention_everyone {
                        continue;
                    }

                    let bot_id = self.bot_user_id.read().await.clone();
                    let (mentions_bot, content) = strip_bot_mention(&event.content, bot_id.as_deref());

                    let inbound = InboundEvent {
                        kind: InboundEventKind::Message,
                        message_id: event.id.into(),
                        channel_id: event.channel_id.into(),
                        sender_id: event.author.id.into(),
                        is_direct: event.guild_id.is_none(),
                        mentions_bot,
                        content,
                        emoji: None,
                        received_at: Utc::now(),
                    };
                    tx.send(inbound)
                        .await
                        .map_err(|e| anyhow::anyhow!("discord inbound queue closed: {e}"))?;
                }
                Some("MESSAGE_REACTION_ADD") => {
                    let payload = v.get("d").cloned().ok_or_else(|| {
                        anyhow::anyhow!("discord MESSAGE_REACTION_ADD missing payload")
                    })?;
                    let event: DiscordReactionAdd = serde_json::from_value(payload)?;
                    if self.bot_user_id.read().await.as_deref() == Some(event.user_id.as_str()) {
                        continue;
                    }

                    let inbound = InboundEvent {
                        kind: InboundEventKind::ReactionAdded,
                        message_id: event.message_id.into(),
                        channel_id: event.channel_id.into(),
                        sender_id: event.user_id.into(),
                        is_direct: event.guild_id.is_none(),
                        mentions_bot: false,
                        content: String::new(),
                        emoji: Some(event.emoji.name.unwrap_or_default()),
                        received_at: Utc::now(),
                    };
                    tx.send(inbound)
                        .await
                        .map_err(|e| anyhow::anyhow!("discord inbound queue closed: {e}"))?;
                }
                _ => {}
            }
        }

        Err(anyhow::anyhow!("discord gateway stream ended unexpectedly"))
    }
}

/// Detect and strip `<@id>` / `<@!id>` mentions of the bot itself.
fn strip_bot_mention(content: &str, bot_id: Option<&str>) -> (bool, String) {
    let Some(bot_id) = bot_id else {
        return (false, content.trim().to_string());
    };
    let plain = format!("<@{bot_id}>");
    let nick = format!("<@!{bot_id}>");
    if !content.contains(&plain) && !content.contains(&nick) {
        return (false, content.trim().to_string());
    }
    let cleaned = content.replace(&plain, "").replace(&nick, "");
    (true, cleaned.trim().to_string())
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[derive(Debug, Deserialize)]
struct DiscordMessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DiscordMessageCreate {
    id: String,
    channel_id: String,
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    mention_everyone: bool,
    author: DiscordAuthor,
}

#[derive(Debug, Deserialize)]
struct DiscordAuthor {
    id: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct DiscordStoredMessage {
    #[serde(default)]
    content: String,
    author: DiscordAuthor,
}

#[derive(Debug, Deserialize)]
struct DiscordReactionAdd {
    user_id: String,
    channel_id: String,
    message_id: String,
    #[serde(default)]
    guild_id: Option<String>,
    emoji: DiscordEmoji,
}

#[derive(Debug, Deserialize)]
struct DiscordEmoji {
    #[serde(default)]
    name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_both_mention_forms() {
        let (mentioned, cleaned) = strip_bot_mention("<@42> hello there", Some("42"));
        assert!(mentioned);
        assert_eq!(cleaned, "hello there");

        let (mentioned, cleaned) = strip_bot_mention("hey <@!42>, hi", Some("42"));
        assert!(mentioned);
        assert_eq!(cleaned, "hey , hi");
    }

    #[test]
    fn unrelated_mentions_are_kept() {
        let (mentioned, cleaned) = strip_bot_mention("<@99> hello", Some("42"));
        assert!(!mentioned);
        assert_eq!(cleaned, "<@99> hello");
    }

    #[test]
    fn emoji_is_percent_encoded_for_reaction_urls() {
        assert_eq!(percent_encode("🗑️"), "%F0%9F%97%91%EF%B8%8F");
        assert_eq!(percent_encode("abc"), "abc");
    }
}
