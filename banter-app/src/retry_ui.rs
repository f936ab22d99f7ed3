//! Reaction-driven retry affordance.
//!
//! When generation hits transient overload, the bot posts a notice and adds
//! a retry reaction to it. The router lets the in-flight handler wait for
//! that specific reaction from the original requester while the normal
//! reaction handler stays out of the way.

use banter_channels::{ChannelId, ChatPlatform, MessageId, OutboundMessage, UserId};
use banter_core::{RetryPrompt, RetryUi, MAX_RETRY_ATTEMPTS};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

pub const REGENERATE_EMOJI: &str = "\u{1f504}";
pub const DELETE_EMOJI: &str = "\u{1f5d1}\u{fe0f}";

struct Waiter {
    user: UserId,
    emoji: String,
    notify: oneshot::Sender<()>,
}

/// Routes reaction events to handlers waiting on a specific message.
#[derive(Default)]
pub struct ReactionRouter {
    waiters: DashMap<MessageId, Waiter>,
}

impl ReactionRouter {
    /// Arm a one-shot waiter. A second registration on the same message
    /// replaces the first.
    pub fn register(
        &self,
        message: MessageId,
        user: UserId,
        emoji: &str,
    ) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(
            message,
            Waiter {
                user,
                emoji: emoji.to_string(),
                notify: tx,
            },
        );
        rx
    }

    pub fn cancel(&self, message: &MessageId) {
        self.waiters.remove(message);
    }

    /// Returns true when the event matched a waiter and was consumed.
    pub fn dispatch(&self, message: &MessageId, user: &UserId, emoji: &str) -> bool {
        let matched = self
            .waiters
            .get(message)
            .is_some_and(|w| w.user == *user && w.emoji == emoji);
        if !matched {
            return false;
        }
        if let Some((_, waiter)) = self.waiters.remove(message) {
            let _ = waiter.notify.send(());
        }
        true
    }
}

/// `RetryUi` backed by a notice message with a retry reaction, gated to the
/// requester. One instance lives per in-flight generation.
pub struct ReactionRetryUi {
    platform: Arc<dyn ChatPlatform>,
    router: Arc<ReactionRouter>,
    channel: ChannelId,
    requester: UserId,
    reply_to: MessageId,
    notice: Mutex<Option<MessageId>>,
}

impl ReactionRetryUi {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        router: Arc<ReactionRouter>,
        channel: ChannelId,
        requester: UserId,
        reply_to: MessageId,
    ) -> Self {
        Self {
            platform,
            router,
            channel,
            requester,
            reply_to,
            notice: Mutex::new(None),
        }
    }

    fn notice_text(attempt: u32) -> String {
        format!(
            "\u{26a0}\u{fe0f} The model is overloaded right now (attempt {attempt}/{MAX_RETRY_ATTEMPTS}). \
             React {REGENERATE_EMOJI} to try again."
        )
    }
}

#[async_trait::async_trait]
impl RetryUi for ReactionRetryUi {
    async fn notify_overloaded(&self, attempt: u32) {
        let mut notice = self.notice.lock().await;
        match notice.as_ref() {
            Some(id) => {
                if let Err(e) = self
                    .platform
                    .edit_message(&self.channel, id, &Self::notice_text(attempt))
                    .await
                {
                    tracing::warn!(%e, "retry notice edit failed");
                }
            }
            None => {
                let message =
                    OutboundMessage::reply(Self::notice_text(attempt), self.reply_to.clone());
                match self.platform.send_message(&self.channel, message).await {
                    Ok(id) => {
                        if let Err(e) = self
                            .platform
                            .add_reaction(&self.channel, &id, REGENERATE_EMOJI)
                            .await
                        {
                            tracing::warn!(%e, "retry reaction add failed");
                        }
                        *notice = Some(id);
                    }
                    Err(e) => tracing::warn!(%e, "retry notice send failed"),
                }
            }
        }
    }

    async fn wait_for_retry(&self, idle_timeout: Duration) -> RetryPrompt {
        let notice_id = { self.notice.lock().await.clone() };
        let Some(notice_id) = notice_id else {
            // The notice never made it out; nothing for the user to press.
            return RetryPrompt::TimedOut;
        };

        let pressed = self.router.register(
            notice_id.clone(),
            self.requester.clone(),
            REGENERATE_EMOJI,
        );
        tokio::select! {
            result = pressed => match result {
                Ok(()) => {
                    // Clear the press so the reaction is armed for next time.
                    let _ = self
                        .platform
                        .remove_reaction(
                            &self.channel,
                            &notice_id,
                            REGENERATE_EMOJI,
                            Some(&self.requester),
                        )
                        .await;
                    RetryPrompt::Pressed
                }
                Err(_) => RetryPrompt::TimedOut,
            },
            _ = tokio::time::sleep(idle_timeout) => {
                self.router.cancel(&notice_id);
                RetryPrompt::TimedOut
            }
        }
    }

    async fn clear_indicator(&self) {
        let notice = { self.notice.lock().await.take() };
        if let Some(id) = notice {
            self.router.cancel(&id);
            if let Err(e) = self.platform.delete_message(&self.channel, &id).await {
                tracing::debug!(%e, "retry notice delete failed");
            }
        }
    }
}
