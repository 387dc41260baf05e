//! Telegram delivery of the morning digest.
//!
//! Each run becomes one `sendMessage` call to a single chat.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::SummarySink;
use crate::core::render_header;
use crate::domain::RoutineRun;

/// Telegram rejects longer messages
const MAX_MESSAGE_CHARS: usize = 4096;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram settings under `notify.telegram`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Environment variable holding the bot token
    #[serde(default = "default_token_env")]
    pub bot_token_env: String,

    pub chat_id: String,

    /// Deliver without a notification sound
    #[serde(default)]
    pub silent: bool,

    /// Bot API base URL (self-hosted Bot API servers)
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

impl TelegramConfig {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            bot_token_env: default_token_env(),
            chat_id: chat_id.into(),
            silent: false,
            api_base: default_api_base(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    disable_notification: bool,
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Posts each run summary to a Telegram chat
pub struct TelegramSink {
    endpoint: String,
    chat_id: String,
    silent: bool,
    client: reqwest::Client,
}

impl TelegramSink {
    /// Build from config, reading the bot token from the environment
    pub fn from_config(config: &TelegramConfig) -> Result<Self> {
        let token = std::env::var(&config.bot_token_env)
            .with_context(|| format!("Missing {} environment variable", config.bot_token_env))?;
        Ok(Self::with_token(config, &token))
    }

    pub fn with_token(config: &TelegramConfig, token: &str) -> Self {
        Self {
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_base.trim_end_matches('/'),
                token
            ),
            chat_id: config.chat_id.clone(),
            silent: config.silent,
            client: reqwest::Client::new(),
        }
    }

    fn message(&self, summary: &str, run: &RoutineRun) -> SendMessage<'_> {
        let text = format!("{}\n{}", render_header(run), summary.trim_end());
        SendMessage {
            chat_id: &self.chat_id,
            text: clamp(&text),
            disable_notification: self.silent,
        }
    }
}

#[async_trait]
impl SummarySink for TelegramSink {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn deliver(&self, summary: &str, run: &RoutineRun) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&self.message(summary, run))
            .send()
            .await
            .context("Telegram request failed")?;

        let status = response.status();
        let reply: ApiReply = response
            .json()
            .await
            .with_context(|| format!("Unreadable Telegram reply (HTTP {})", status))?;

        if !reply.ok {
            anyhow::bail!(
                "Telegram rejected the digest: {}",
                reply.description.unwrap_or_else(|| status.to_string())
            );
        }
        Ok(())
    }
}

fn clamp(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        text.to_string()
    } else {
        text.chars().take(MAX_MESSAGE_CHARS - 1).chain(['…']).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_endpoint_respects_api_base() {
        let mut config = TelegramConfig::new("42");
        assert_eq!(
            TelegramSink::with_token(&config, "T0K").endpoint,
            "https://api.telegram.org/botT0K/sendMessage"
        );

        config.api_base = "http://localhost:8081/".to_string();
        assert_eq!(
            TelegramSink::with_token(&config, "T0K").endpoint,
            "http://localhost:8081/botT0K/sendMessage"
        );
    }

    #[test]
    fn test_message_carries_header_and_silent_flag() {
        let run = RoutineRun::new(Uuid::nil(), Utc::now()).finalize();
        let mut config = TelegramConfig::new("42");

        let loud = TelegramSink::with_token(&config, "t");
        let body = serde_json::to_value(loud.message("  alarm  success\n", &run)).unwrap();
        assert_eq!(body["chat_id"], "42");
        assert!(body["text"]
            .as_str()
            .unwrap()
            .starts_with("Morning routine 00000000-0000-0000-0000-000000000000"));
        assert!(body.get("disable_notification").is_none());

        config.silent = true;
        let quiet = TelegramSink::with_token(&config, "t");
        let body = serde_json::to_value(quiet.message("x", &run)).unwrap();
        assert_eq!(body["disable_notification"], true);
    }

    #[test]
    fn test_long_digest_is_clamped() {
        let long = "x".repeat(MAX_MESSAGE_CHARS + 10);
        let clamped = clamp(&long);
        assert_eq!(clamped.chars().count(), MAX_MESSAGE_CHARS);
        assert!(clamped.ends_with('…'));
        assert_eq!(clamp("short"), "short");
    }

    #[test]
    fn test_config_defaults() {
        let config: TelegramConfig = serde_yaml::from_str("chat_id: \"42\"").unwrap();
        assert_eq!(config.bot_token_env, "TELEGRAM_BOT_TOKEN");
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert!(!config.silent);
    }
}
