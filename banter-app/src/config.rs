//! Banter configuration loader.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct BanterConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    pub discord: DiscordConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    pub model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeysConfig {
    /// Rotation pool, tried in order. Quota errors advance to the next key.
    #[serde(default)]
    pub gemini_api_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Channels the bot answers in without being mentioned.
    #[serde(default)]
    pub tracked_channels: Vec<String>,
}

fn default_image_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

fn default_system_prompt() -> String {
    "You are a helpful, concise chat assistant.".to_string()
}

fn default_max_history() -> usize {
    banter_core::DEFAULT_MAX_HISTORY
}

impl BanterConfig {
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = path.unwrap_or_else(default_config_path);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;

        let mut cfg: BanterConfig = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?;

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("BANTER_MODEL") {
            if !v.trim().is_empty() {
                self.general.model = v;
            }
        }
        if let Ok(v) = std::env::var("DISCORD_BOT_TOKEN") {
            if !v.trim().is_empty() {
                self.discord.bot_token = v;
            }
        }

        // GEMINI_API_KEY plus numbered GEMINI_API_KEY_1..N replace the
        // configured pool entirely when present.
        let mut env_keys = Vec::new();
        if let Ok(v) = std::env::var("GEMINI_API_KEY") {
            if !v.trim().is_empty() {
                env_keys.push(v);
            }
        }
        for n in 1.. {
            match std::env::var(format!("GEMINI_API_KEY_{n}")) {
                Ok(v) if !v.trim().is_empty() => env_keys.push(v),
                _ => break,
            }
        }
        if !env_keys.is_empty() {
            self.keys.gemini_api_keys = env_keys;
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.general.model.trim().is_empty() {
            return Err(anyhow::anyhow!("general.model is required"));
        }
        if self.general.max_history == 0 {
            return Err(anyhow::anyhow!("general.max_history must be > 0"));
        }
        if self.discord.bot_token.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "discord.bot_token is required (or set DISCORD_BOT_TOKEN)"
            ));
        }
        if self.keys.gemini_api_keys.is_empty() {
            return Err(anyhow::anyhow!(
                "keys.gemini_api_keys is required (or set GEMINI_API_KEY / GEMINI_API_KEY_1..N)"
            ));
        }
        Ok(())
    }
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".banter").join("config.toml")
}
