//! Clients for the external sources of truth
//!
//! Each upstream sits behind an `async_trait` seam so the verification
//! engine can be exercised with fakes. Vendor payloads are decoded into typed
//! projections; a payload of the wrong shape is a `Parse` failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub mod credentials;
pub mod discord;
pub mod telegram;
pub mod titan;
pub mod utools;

pub use credentials::CredentialPool;
pub use discord::DiscordClient;
pub use telegram::TelegramClient;
pub use titan::TitanClient;
pub use utools::UToolsClient;

/// Upstream call failures
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// Vendor reported failure inside a 200 response
    #[error("Vendor error {code}: {msg}")]
    Envelope { code: i64, msg: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl From<serde_json::Error> for UpstreamError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Post fields the quote/original-post predicates look at
#[derive(Debug, Clone, PartialEq)]
pub struct TweetDetail {
    pub author_id: String,
    /// Empty when the post quotes nothing
    pub quoted_id: String,
    pub created_at: DateTime<Utc>,
    pub full_text: String,
    pub mention_count: usize,
}

/// Twitter data (via the UTools API)
#[async_trait]
pub trait SocialApi: Send + Sync {
    /// Ids of the accounts `user_id` follows
    async fn followings(&self, user_id: &str) -> Result<Vec<String>, UpstreamError>;

    /// Ids of the accounts that liked `tweet_id`
    async fn favoriters(&self, tweet_id: &str) -> Result<Vec<String>, UpstreamError>;

    /// Ids of the accounts that reposted `tweet_id`
    async fn retweeters(&self, tweet_id: &str) -> Result<Vec<String>, UpstreamError>;

    async fn tweet_detail(&self, tweet_id: &str) -> Result<TweetDetail, UpstreamError>;
}

/// Telegram Bot API
#[async_trait]
pub trait TelegramApi: Send + Sync {
    /// Member status (`member`, `administrator`, `left`, ...) of a user in a chat
    async fn chat_member_status(&self, chat_id: &str, user_id: &str)
        -> Result<String, UpstreamError>;
}

/// Discord REST API
#[async_trait]
pub trait DiscordApi: Send + Sync {
    /// Effective permission bitmask of a user in a channel
    async fn channel_permissions(&self, user_id: &str, channel_id: &str)
        -> Result<u64, UpstreamError>;
}

/// Referral (KOL) code directory
#[async_trait]
pub trait ReferralDirectory: Send + Sync {
    /// Owner of a referral code, `None` when the code is unknown
    async fn code_owner(&self, code: &str) -> Result<Option<String>, UpstreamError>;
}

/// Shared HTTP client for upstream calls
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, UpstreamError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("quest-gateway/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(UpstreamError::Transport)
}

/// Read a successful response body, mapping non-2xx to `Status`
pub(crate) async fn read_body(resp: reqwest::Response) -> Result<bytes::Bytes, UpstreamError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(UpstreamError::Status(status.as_u16()));
    }
    Ok(resp.bytes().await?)
}
