//! Event routing and the generation pipeline.
//!
//! One `BotRuntime` per process. Every inbound event is handled on its own
//! spawned task; all cross-task state lives in the coordinator structures
//! (`SessionStore`, `ConcurrencyGate`, `ResponseRegistry`) which are safe to
//! hit concurrently.

use crate::commands::{self, Command};
use crate::config::BanterConfig;
use crate::reactions;
use crate::retry_ui::{ReactionRetryUi, ReactionRouter, DELETE_EMOJI, REGENERATE_EMOJI};
use anyhow::Result;
use banter_channels::{
    ChannelId, ChatPlatform, DiscordAdapter, InboundEvent, InboundEventKind, MessageId,
    OutboundAttachment, OutboundMessage, ThreadId, UserId,
};
use banter_core::{
    resolve_scope, ConcurrencyGate, KeyPool, ResponseRegistry, RetryCoordinator, RetryError,
    RetryUi, ScopeInput, ScopeKey, SessionSettings, SessionStore, TrackedResponse, TypingSignal,
};
use banter_llm::{Content, GeminiClient, Role, SamplingConfig};
use dashmap::DashMap;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const INBOUND_QUEUE_DEPTH: usize = 256;
const TRANSIENT_NOTICE_TTL: Duration = Duration::from_secs(8);

pub struct BotRuntime {
    pub platform: Arc<dyn ChatPlatform>,
    pub sessions: Arc<SessionStore>,
    pub gate: ConcurrencyGate,
    pub registry: Arc<ResponseRegistry>,
    pub router: Arc<ReactionRouter>,
    retry: RetryCoordinator,
    http: reqwest::Client,
    model: String,
    image_model: String,
    system_prompt: String,
    tracked_channels: HashSet<ChannelId>,
    managed_threads: DashMap<ThreadId, ()>,
}

/// Adapts the platform's typing endpoint to the gate's signal trait.
struct PlatformTyping(Arc<dyn ChatPlatform>);

#[async_trait::async_trait]
impl TypingSignal for PlatformTyping {
    async fn start_typing(&self, channel: &ChannelId) -> Result<()> {
        self.0.start_typing(channel).await
    }
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = BanterConfig::load(config_path).await?;
    let platform: Arc<dyn ChatPlatform> = Arc::new(DiscordAdapter::new(&cfg.discord.bot_token)?);
    let runtime = Arc::new(BotRuntime::new(&cfg, platform)?);

    let (tx, mut rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
    runtime.platform.start(tx).await?;
    tracing::info!(
        model = %cfg.general.model,
        tracked_channels = cfg.discord.tracked_channels.len(),
        api_keys = cfg.keys.gemini_api_keys.len(),
        "banter serving"
    );

    while let Some(event) = rx.recv().await {
        let runtime = runtime.clone();
        tokio::spawn(async move {
            if let Err(e) = runtime.handle_event(event).await {
                tracing::error!(%e, "event handling failed");
            }
        });
    }
    Err(anyhow::anyhow!("inbound event stream closed"))
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = BanterConfig::load(config_path).await?;
    println!("config: ok");
    println!("model: {}", cfg.general.model);
    println!("image_model: {}", cfg.general.image_model);
    println!("max_history: {}", cfg.general.max_history);
    println!("gemini api keys: {}", cfg.keys.gemini_api_keys.len());
    println!(
        "discord token: {} chars",
        cfg.discord.bot_token.chars().count()
    );
    println!("tracked channels: {}", cfg.discord.tracked_channels.len());
    Ok(())
}

impl BotRuntime {
    pub fn new(cfg: &BanterConfig, platform: Arc<dyn ChatPlatform>) -> Result<Self> {
        let pool = KeyPool::new(cfg.keys.gemini_api_keys.clone())?;
        Ok(Self {
            sessions: Arc::new(SessionStore::new(cfg.general.max_history)),
            gate: ConcurrencyGate::new(Arc::new(PlatformTyping(platform.clone()))),
            registry: Arc::new(ResponseRegistry::default()),
            router: Arc::new(ReactionRouter::default()),
            retry: RetryCoordinator::new(pool),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()?,
            model: cfg.general.model.clone(),
            image_model: cfg.general.image_model.clone(),
            system_prompt: cfg.general.system_prompt.clone(),
            tracked_channels: cfg
                .discord
                .tracked_channels
                .iter()
                .map(|c| ChannelId::new(c.clone()))
                .collect(),
            managed_threads: DashMap::new(),
            platform,
        })
    }

    #[tracing::instrument(level = "debug", skip_all, fields(kind = ?event.kind, channel = %event.channel_id))]
    pub async fn handle_event(self: &Arc<Self>, event: InboundEvent) -> Result<()> {
        match event.kind {
            InboundEventKind::Message => self.handle_message(event).await,
            InboundEventKind::ReactionAdded => {
                let emoji = event.emoji.clone().unwrap_or_default();
                if self
                    .router
                    .dispatch(&event.message_id, &event.sender_id, &emoji)
                {
                    return Ok(());
                }
                reactions::handle_reaction(self, event, &emoji).await
            }
        }
    }

    async fn handle_message(self: &Arc<Self>, event: InboundEvent) -> Result<()> {
        // Commands are only honored where the bot would answer anyway, so a
        // stray "/shrug" in an unrelated channel stays ignored.
        if !self.should_respond(&event) || event.content.trim().is_empty() {
            return Ok(());
        }

        let scope = self.scope_for(&event);
        if let Some(parsed) = commands::parse_command(&event.content) {
            return match parsed {
                Ok(command) => self.execute_command(event, scope, command).await,
                Err(usage) => self.reply(&event, usage).await.map(|_| ()),
            };
        }
        self.respond(event, scope).await
    }

    fn should_respond(&self, event: &InboundEvent) -> bool {
        event.is_direct
            || event.mentions_bot
            || self.tracked_channels.contains(&event.channel_id)
            || self
                .managed_threads
                .contains_key(&event.channel_id.as_thread())
            || self
                .sessions
                .has_auto_respond_channel(&event.sender_id, &event.channel_id)
    }

    fn scope_for(&self, event: &InboundEvent) -> ScopeKey {
        resolve_scope(ScopeInput {
            channel_id: &event.channel_id,
            sender_id: &event.sender_id,
            is_managed_thread: self
                .managed_threads
                .contains_key(&event.channel_id.as_thread()),
            is_tracked_channel: self.tracked_channels.contains(&event.channel_id),
            is_direct: event.is_direct,
        })
    }

    /// The ordinary text pipeline: assemble context, generate with the full
    /// retry loop, then deliver and track. History and pending-context
    /// bookkeeping happen only after a successful delivery.
    async fn respond(self: &Arc<Self>, event: InboundEvent, scope: ScopeKey) -> Result<()> {
        let guard = self.gate.enter(&event.channel_id).await;

        let pending = self.sessions.pending_context(&scope);
        let user_entry = Content::user_text(&event.content);
        let mut contents = pending.clone().unwrap_or_default();
        contents.extend(self.sessions.history(&scope));
        contents.push(user_entry.clone());

        let settings = self.sessions.settings(&scope);
        let ui = ReactionRetryUi::new(
            self.platform.clone(),
            self.router.clone(),
            event.channel_id.clone(),
            event.sender_id.clone(),
            event.message_id.clone(),
        );

        let result = self
            .generate_text(&ui, &settings, contents.clone())
            .await;

        match result {
            Ok(text) => {
                self.sessions.append_history(&scope, user_entry);
                self.sessions
                    .append_history(&scope, Content::model_text(&text));
                if pending.is_some() {
                    self.sessions.decrement_pending_context(&scope);
                }
                self.deliver_and_track(
                    &event.channel_id,
                    &scope,
                    &event.sender_id,
                    &event.content,
                    Some(event.message_id.clone()),
                    text,
                    None,
                )
                .await?;
                guard.release().await;
                Ok(())
            }
            Err(e) => {
                ui.clear_indicator().await;
                guard.release().await;
                self.gate.force_stop_now(&event.channel_id).await;
                self.reply(&event, friendly_error(&e)).await?;
                Ok(())
            }
        }
    }

    pub async fn generate_text(
        &self,
        ui: &dyn RetryUi,
        settings: &SessionSettings,
        contents: Vec<Content>,
    ) -> Result<String, RetryError> {
        let system = self.system_instruction(settings);
        let sampling = SamplingConfig {
            thinking: settings.thinking,
            ..SamplingConfig::default()
        };
        self.retry
            .run(ui, |key| {
                let client = GeminiClient::with_http(self.http.clone(), &key, &self.model);
                let contents = contents.clone();
                let system = system.clone();
                let sampling = sampling.clone();
                async move { client.generate(&contents, &system, &sampling).await }
            })
            .await
    }

    /// Rotation-only generation for paths with no retry affordance.
    pub async fn generate_text_detached(
        &self,
        settings: &SessionSettings,
        contents: Vec<Content>,
    ) -> Result<String, RetryError> {
        let system = self.system_instruction(settings);
        let sampling = SamplingConfig {
            thinking: settings.thinking,
            ..SamplingConfig::default()
        };
        self.retry
            .run_detached(|key| {
                let client = GeminiClient::with_http(self.http.clone(), &key, &self.model);
                let contents = contents.clone();
                let system = system.clone();
                let sampling = sampling.clone();
                async move { client.generate(&contents, &system, &sampling).await }
            })
            .await
    }

    fn system_instruction(&self, settings: &SessionSettings) -> String {
        let mut instruction = self.system_prompt.clone();
        if let Some(persona) = settings.persona.as_deref() {
            instruction = format!("Adopt this persona: {persona}\n\n{instruction}");
        }
        instruction.push_str(&format!(
            "\n\nCurrent date/time: {}",
            chrono::Utc::now().to_rfc2822()
        ));
        instruction
    }

    /// Send the response, stop the typing signal, and register the message
    /// for reaction follow-ups.
    #[allow(clippy::too_many_arguments)]
    pub async fn deliver_and_track(
        self: &Arc<Self>,
        channel: &ChannelId,
        scope: &ScopeKey,
        author: &UserId,
        prompt: &str,
        reply_to: Option<MessageId>,
        text: String,
        attachment: Option<OutboundAttachment>,
    ) -> Result<MessageId> {
        self.gate.keep_alive(channel).await;
        let message = OutboundMessage {
            content: text,
            reply_to_message_id: reply_to,
            attachment,
        };
        let sent = self.platform.send_message(channel, message).await?;
        self.gate.force_stop_now(channel).await;

        for emoji in [DELETE_EMOJI, REGENERATE_EMOJI] {
            if let Err(e) = self.platform.add_reaction(channel, &sent, emoji).await {
                tracing::debug!(%e, "response reaction add failed");
            }
        }
        self.registry.track(TrackedResponse {
            author_id: author.clone(),
            scope: scope.clone(),
            channel_id: channel.clone(),
            message_ids: vec![sent.clone()],
            prompt: prompt.to_string(),
        });
        Ok(sent)
    }

    async fn execute_command(
        self: &Arc<Self>,
        event: InboundEvent,
        scope: ScopeKey,
        command: Command,
    ) -> Result<()> {
        match command {
            Command::Help => {
                self.reply(&event, commands::help_text()).await?;
            }
            Command::Forget => {
                self.sessions.clear_history(&scope);
                self.sessions.clear_pending_context(&scope);
                self.reply(&event, format!("Forgot our conversation in {}.", scope.describe()))
                    .await?;
            }
            Command::Thinking(None) => {
                let settings = self.sessions.settings(&scope);
                self.reply(
                    &event,
                    format!("Thinking level: {}", settings.thinking.as_str()),
                )
                .await?;
            }
            Command::Thinking(Some(level)) => {
                let mut settings = self.sessions.settings(&scope);
                settings.thinking = level;
                self.sessions.set_settings(&scope, settings);
                self.reply(&event, format!("Thinking level set to {}.", level.as_str()))
                    .await?;
            }
            Command::PersonaShow => {
                let settings = self.sessions.settings(&scope);
                let text = match settings.persona {
                    Some(p) => format!("Current persona: {p}"),
                    None => "No persona set; using the default.".to_string(),
                };
                self.reply(&event, text).await?;
            }
            Command::PersonaSet(persona) => {
                let mut settings = self.sessions.settings(&scope);
                settings.persona = Some(persona);
                self.sessions.set_settings(&scope, settings);
                self.reply(&event, "Persona updated.").await?;
            }
            Command::PersonaClear => {
                let mut settings = self.sessions.settings(&scope);
                settings.persona = None;
                self.sessions.set_settings(&scope, settings);
                self.reply(&event, "Persona reset to default.").await?;
            }
            Command::Settings => {
                let settings = self.sessions.settings(&scope);
                let pending = match self.sessions.pending_context_status(&scope) {
                    Some((messages, uses)) => {
                        format!("{messages} message(s), {uses} use(s) left")
                    }
                    None => "none".to_string(),
                };
                let text = format!(
                    "Settings for {}:\n- thinking: {}\n- persona: {}\n- pending context: {}\n- history kept: {} of up to {} entries",
                    scope.describe(),
                    settings.thinking.as_str(),
                    settings.persona.as_deref().unwrap_or("default"),
                    pending,
                    self.sessions.history(&scope).len(),
                    self.sessions.max_history(),
                );
                self.reply(&event, text).await?;
            }
            Command::Context { count, lasts_for } => {
                self.load_context(&event, &scope, count, lasts_for).await?;
            }
            Command::CreateThread { name } => {
                let thread = self
                    .platform
                    .create_thread(&event.channel_id, &event.message_id, &name)
                    .await?;
                self.managed_threads.insert(thread.clone(), ());
                let greeting = OutboundMessage::text(
                    "Thread ready. I will answer every message here.",
                );
                self.platform
                    .send_message(&ChannelId::new(thread.as_str()), greeting)
                    .await?;
            }
            Command::Image { prompt } => {
                self.respond_image(&event, &scope, prompt).await?;
            }
        }
        Ok(())
    }

    /// `/context`: pull recent channel messages in as pending context.
    async fn load_context(
        self: &Arc<Self>,
        event: &InboundEvent,
        scope: &ScopeKey,
        count: u32,
        lasts_for: u32,
    ) -> Result<()> {
        // Over-fetch by one to cover the command message itself.
        let recent = self
            .platform
            .recent_messages(&event.channel_id, count + 1)
            .await?;
        let contents: Vec<Content> = recent
            .iter()
            .filter(|m| !m.content.trim().is_empty() && !m.content.trim_start().starts_with('/'))
            .map(|m| {
                if m.from_bot {
                    Content::model_text(&m.content)
                } else {
                    Content::user_text(format!("{}: {}", m.sender_name, m.content))
                }
            })
            .take(count as usize)
            .collect();

        if contents.is_empty() {
            self.reply(event, "Nothing usable in the recent messages here.")
                .await?;
            return Ok(());
        }

        // Outside DMs and tracked channels, also arm mention-free responses
        // in this channel while the context lives.
        let listen_channel =
            matches!(scope, ScopeKey::Mention(_)).then(|| event.channel_id.clone());
        let listening = listen_channel.is_some();
        let loaded = contents.len();
        self.sessions
            .set_pending_context(scope, contents, lasts_for, listen_channel);

        let mut text = format!(
            "Loaded {loaded} message(s) as context for your next {lasts_for} message(s)."
        );
        if listening {
            text.push_str(" I will answer you here without an @mention while it lasts.");
        }
        self.reply(event, text).await?;
        Ok(())
    }

    /// `/image`: the paid-tier-aware generation path. Overload gets the same
    /// retry affordance as text.
    async fn respond_image(
        self: &Arc<Self>,
        event: &InboundEvent,
        scope: &ScopeKey,
        prompt: String,
    ) -> Result<()> {
        let guard = self.gate.enter(&event.channel_id).await;
        let ui = ReactionRetryUi::new(
            self.platform.clone(),
            self.router.clone(),
            event.channel_id.clone(),
            event.sender_id.clone(),
            event.message_id.clone(),
        );

        let result = self
            .retry
            .run(&ui, |key| {
                let client = GeminiClient::with_http(self.http.clone(), &key, &self.model);
                let image_model = self.image_model.clone();
                let prompt = prompt.clone();
                async move {
                    client
                        .generate_image(&image_model, &prompt, &[], None)
                        .await
                }
            })
            .await;

        match result {
            Ok(output) => {
                let attachment = output.image.map(|(bytes, content_type)| {
                    let extension = match content_type.as_str() {
                        "image/jpeg" => "jpg",
                        "image/webp" => "webp",
                        _ => "png",
                    };
                    OutboundAttachment {
                        filename: format!("banter.{extension}"),
                        content_type,
                        bytes,
                    }
                });
                let caption = output
                    .text
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| "Here you go.".to_string());
                self.deliver_and_track(
                    &event.channel_id,
                    scope,
                    &event.sender_id,
                    &event.content,
                    Some(event.message_id.clone()),
                    caption,
                    attachment,
                )
                .await?;
                guard.release().await;
            }
            Err(e) => {
                ui.clear_indicator().await;
                guard.release().await;
                self.gate.force_stop_now(&event.channel_id).await;
                self.reply(event, friendly_error(&e)).await?;
            }
        }
        Ok(())
    }

    async fn reply(&self, event: &InboundEvent, text: impl Into<String>) -> Result<MessageId> {
        let message = OutboundMessage::reply(text.into(), event.message_id.clone());
        self.platform.send_message(&event.channel_id, message).await
    }

    /// A notice that cleans itself up after a few seconds.
    pub async fn transient_notice(
        self: &Arc<Self>,
        channel: &ChannelId,
        text: impl Into<String>,
    ) {
        let sent = match self
            .platform
            .send_message(channel, OutboundMessage::text(text.into()))
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::debug!(%e, "transient notice send failed");
                return;
            }
        };
        let platform = self.platform.clone();
        let channel = channel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(TRANSIENT_NOTICE_TTL).await;
            if let Err(e) = platform.delete_message(&channel, &sent).await {
                tracing::debug!(%e, "transient notice delete failed");
            }
        });
    }

    /// Re-run the generation a tracked response came from, using the scope's
    /// history with the original prompt re-appended if it got evicted.
    pub async fn regeneration_contents(&self, record: &TrackedResponse) -> Vec<Content> {
        let mut contents = self.sessions.history(&record.scope);
        let ends_with_prompt = contents
            .last()
            .is_some_and(|c| c.role == Role::User);
        if !ends_with_prompt {
            contents.push(Content::user_text(&record.prompt));
        }
        contents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_channels::RecentMessage;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct MockPlatform {
        sent: AtomicU64,
    }

    #[async_trait::async_trait]
    impl ChatPlatform for MockPlatform {
        async fn start(&self, _tx: mpsc::Sender<InboundEvent>) -> Result<()> {
            Ok(())
        }

        async fn send_message(
            &self,
            _channel: &ChannelId,
            _message: OutboundMessage,
        ) -> Result<MessageId> {
            let n = self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(MessageId::new(format!("sent-{n}")))
        }

        async fn edit_message(
            &self,
            _channel: &ChannelId,
            _message: &MessageId,
            _content: &str,
        ) -> Result<()> {
            Ok(())
        }

        async fn delete_message(&self, _channel: &ChannelId, _message: &MessageId) -> Result<()> {
            Ok(())
        }

        async fn start_typing(&self, _channel: &ChannelId) -> Result<()> {
            Ok(())
        }

        async fn add_reaction(
            &self,
            _channel: &ChannelId,
            _message: &MessageId,
            _emoji: &str,
        ) -> Result<()> {
            Ok(())
        }

        async fn remove_reaction(
            &self,
            _channel: &ChannelId,
            _message: &MessageId,
            _emoji: &str,
            _user: Option<&UserId>,
        ) -> Result<()> {
            Ok(())
        }

        async fn recent_messages(
            &self,
            _channel: &ChannelId,
            _limit: u32,
        ) -> Result<Vec<RecentMessage>> {
            Ok(Vec::new())
        }

        async fn create_thread(
            &self,
            _channel: &ChannelId,
            _message: &MessageId,
            name: &str,
        ) -> Result<ThreadId> {
            Ok(ThreadId::new(format!("thread-{name}")))
        }
    }

    fn runtime() -> Arc<BotRuntime> {
        let cfg: BanterConfig = toml::from_str(
            r#"
            [general]
            model = "gemini-2.5-flash"

            [keys]
            gemini_api_keys = ["test-key"]

            [discord]
            bot_token = "test-token"
            tracked_channels = ["tracked-1"]
            "#,
        )
        .expect("valid toml");
        let platform = Arc::new(MockPlatform {
            sent: AtomicU64::new(0),
        });
        Arc::new(BotRuntime::new(&cfg, platform).expect("runtime"))
    }

    fn message_event(channel: &str, sender: &str) -> InboundEvent {
        InboundEvent {
            kind: InboundEventKind::Message,
            message_id: MessageId::new("m1"),
            channel_id: ChannelId::new(channel),
            sender_id: UserId::new(sender),
            is_direct: false,
            mentions_bot: false,
            content: "hello".to_string(),
            emoji: None,
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn response_triggers_follow_the_routing_rules() {
        let runtime = runtime();

        let mut dm = message_event("dm-1", "u1");
        dm.is_direct = true;
        assert!(runtime.should_respond(&dm));

        let mut mention = message_event("random", "u1");
        mention.mentions_bot = true;
        assert!(runtime.should_respond(&mention));

        assert!(runtime.should_respond(&message_event("tracked-1", "u1")));
        assert!(!runtime.should_respond(&message_event("random", "u1")));
    }

    #[tokio::test]
    async fn created_threads_become_managed_scopes() {
        let runtime = runtime();
        let thread = runtime
            .platform
            .create_thread(&ChannelId::new("c1"), &MessageId::new("m1"), "plans")
            .await
            .expect("thread");
        runtime.managed_threads.insert(thread.clone(), ());

        let event = message_event(thread.as_str(), "u1");
        assert!(runtime.should_respond(&event));
        assert_eq!(
            runtime.scope_for(&event),
            ScopeKey::Thread(ThreadId::new(thread.as_str()))
        );
    }

    #[tokio::test]
    async fn armed_listen_channel_answers_without_mention() {
        let runtime = runtime();
        let event = message_event("random", "u1");
        assert!(!runtime.should_respond(&event));

        let scope = runtime.scope_for(&event);
        assert_eq!(scope, ScopeKey::Mention(UserId::new("u1")));
        runtime.sessions.set_pending_context(
            &scope,
            vec![Content::user_text("ctx")],
            2,
            Some(event.channel_id.clone()),
        );
        assert!(runtime.should_respond(&event));

        // Someone else in the same channel is not covered.
        assert!(!runtime.should_respond(&message_event("random", "u2")));
    }

    #[tokio::test]
    async fn tracked_channel_scope_is_per_user() {
        let runtime = runtime();
        let a = runtime.scope_for(&message_event("tracked-1", "u1"));
        let b = runtime.scope_for(&message_event("tracked-1", "u2"));
        assert_eq!(a, ScopeKey::TrackedChannel(UserId::new("u1")));
        assert_ne!(a, b);
    }

    #[test]
    fn system_instruction_layers_persona_over_the_base() {
        let runtime = runtime();
        let plain = runtime.system_instruction(&SessionSettings::default());
        assert!(plain.contains("Current date/time:"));

        let settings = SessionSettings {
            persona: Some("a polite pirate".to_string()),
            ..SessionSettings::default()
        };
        let with_persona = runtime.system_instruction(&settings);
        assert!(with_persona.starts_with("Adopt this persona: a polite pirate"));
        assert!(with_persona.contains(&runtime.system_prompt));
    }
}

pub fn friendly_error(e: &RetryError) -> String {
    match e {
        RetryError::PoolExhausted { .. } => {
            "Every configured api key is out of quota for now. Try again later.".to_string()
        }
        RetryError::PaidTierOnly => {
            "That needs a paid-tier api key, and none is configured.".to_string()
        }
        RetryError::RetriesExhausted { attempts } => format!(
            "Still overloaded after {attempts} attempts. Give it a few minutes."
        ),
        RetryError::IdleTimeout(_) => {
            "Retry window expired. Mention me again when you want another go.".to_string()
        }
        RetryError::StillOverloaded => {
            "The model is overloaded right now. Try again shortly.".to_string()
        }
        RetryError::Fatal(inner) => format!("Generation failed: {inner}"),
    }
}
