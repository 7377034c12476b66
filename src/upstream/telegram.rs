//! Telegram Bot API client (membership lookups only)

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{read_body, TelegramApi, UpstreamError};

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct BotResponse<T> {
    ok: bool,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
}

/// Bot API client
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: Option<String>,
}

impl TelegramClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, bot_token: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bot_token,
        }
    }
}

#[async_trait]
impl TelegramApi for TelegramClient {
    async fn chat_member_status(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> Result<String, UpstreamError> {
        let token = self
            .bot_token
            .as_deref()
            .ok_or_else(|| UpstreamError::NotConfigured("TELEGRAM_BOT_TOKEN".into()))?;

        debug!(chat_id, "Telegram getChatMember");
        let resp = self
            .http
            .get(format!("{}/bot{}/getChatMember", self.base_url, token))
            .query(&[("chat_id", chat_id), ("user_id", user_id)])
            .send()
            .await?;

        // The Bot API reports "user not found" as 400 with a JSON body
        let status = resp.status();
        let body = if status.is_client_error() {
            resp.bytes().await?
        } else {
            read_body(resp).await?
        };

        let parsed: BotResponse<ChatMember> = serde_json::from_slice(&body)?;
        if !parsed.ok {
            return Err(UpstreamError::Envelope {
                code: parsed.error_code.unwrap_or_else(|| i64::from(status.as_u16())),
                msg: parsed.description.unwrap_or_default(),
            });
        }

        parsed
            .result
            .map(|m| m.status)
            .ok_or_else(|| UpstreamError::Parse("getChatMember returned no result".into()))
    }
}
