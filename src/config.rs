//! Configuration for quest-gateway
//!
//! CLI arguments and environment variable handling using clap.

use chrono::{FixedOffset, Weekday};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::services::period::parse_utc_offset;

/// quest-gateway - mission verification and crediting service
#[derive(Parser, Debug, Clone)]
#[command(name = "quest-gateway")]
#[command(about = "Verifies social quest missions and credits reward points")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory stores, dev JWT secret)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "quest")]
    pub mongodb_db: String,

    /// JWT secret for bearer token validation (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "86400")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (pretty, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Optional JSONL file receiving one line per credit grant
    #[arg(long, env = "GRANT_LOG_PATH")]
    pub grant_log_path: Option<PathBuf>,

    /// JSON array of missions loaded into the in-memory catalog (dev mode)
    #[arg(long, env = "MISSION_SEED_PATH")]
    pub mission_seed_path: Option<PathBuf>,

    /// Upstream request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "15000")]
    pub request_timeout_ms: u64,

    /// Fixed UTC offset used for day/week boundaries (e.g. "+08:00")
    #[arg(long, env = "PERIOD_UTC_OFFSET", default_value = "+00:00")]
    pub period_utc_offset: String,

    /// First day of the week for weekly missions
    #[arg(long, env = "WEEK_STARTS_ON", default_value = "sunday")]
    pub week_starts_on: String,

    /// Percentage of each grant credited to the inviter
    #[arg(long, env = "REFERRAL_COMMISSION_PERCENT", default_value = "10")]
    pub referral_commission_percent: u64,

    /// Upstream verification API configuration
    #[command(flatten)]
    pub upstream: UpstreamArgs,

    /// Official website visit configuration
    #[command(flatten)]
    pub visit: VisitArgs,
}

/// Upstream API endpoints and credentials
#[derive(Parser, Debug, Clone)]
pub struct UpstreamArgs {
    /// Base URL of the UTools Twitter API
    #[arg(
        long,
        env = "UTOOLS_BASE_URL",
        default_value = "https://twitter.utools.me/api/base/apitools"
    )]
    pub utools_base_url: String,

    /// Comma-separated UTools API keys (rotated round-robin)
    #[arg(long, env = "UTOOLS_API_KEYS", default_value = "")]
    pub utools_api_keys: String,

    /// Twitter account that follow missions target when a mission has no target id
    #[arg(long, env = "OFFICIAL_TWITTER_USER_ID")]
    pub official_twitter_user_id: Option<String>,

    /// Telegram Bot API base URL
    #[arg(long, env = "TELEGRAM_API_URL", default_value = "https://api.telegram.org")]
    pub telegram_api_url: String,

    /// Telegram bot token used for membership queries
    #[arg(long, env = "TELEGRAM_BOT_TOKEN")]
    pub telegram_bot_token: Option<String>,

    /// Discord REST API base URL
    #[arg(long, env = "DISCORD_API_URL", default_value = "https://discord.com/api/v10")]
    pub discord_api_url: String,

    /// Discord bot token used for permission queries
    #[arg(long, env = "DISCORD_BOT_TOKEN")]
    pub discord_bot_token: Option<String>,

    /// Titan API base URL (referral code directory)
    #[arg(long, env = "TITAN_API_URL")]
    pub titan_api_url: Option<String>,

    /// Titan API bearer key
    #[arg(long, env = "TITAN_API_KEY")]
    pub titan_api_key: Option<String>,
}

/// Visit-and-dwell token configuration
#[derive(Parser, Debug, Clone)]
pub struct VisitArgs {
    /// 32-byte hex key sealing visit codes
    #[arg(long, env = "VISIT_SECRET")]
    pub visit_secret: Option<String>,

    /// Seconds a visitor must stay before the visit is credited
    #[arg(long, env = "VISIT_DWELL_SECONDS", default_value = "10")]
    pub visit_dwell_seconds: i64,

    /// Website the visit code is redeemed on
    #[arg(long, env = "OFFICIAL_WEBSITE_URI", default_value = "https://www.titannet.io")]
    pub official_website_uri: String,
}

impl Args {
    /// Get effective JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> Option<String> {
        if self.dev_mode {
            Some(
                self.jwt_secret
                    .clone()
                    .unwrap_or_else(|| "dev-only-insecure-secret-for-quests!".to_string()),
            )
        } else {
            self.jwt_secret.clone()
        }
    }

    /// Parsed UTools API key list
    pub fn utools_keys(&self) -> Vec<String> {
        self.upstream
            .utools_api_keys
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Configured period offset
    pub fn utc_offset(&self) -> Result<FixedOffset, String> {
        parse_utc_offset(&self.period_utc_offset)
    }

    /// Configured first weekday
    pub fn week_start(&self) -> Result<Weekday, String> {
        self.week_starts_on
            .trim()
            .parse::<Weekday>()
            .map_err(|_| format!("invalid WEEK_STARTS_ON: {}", self.week_starts_on))
    }

    /// Visit sealing key (fixed key in dev mode when unset)
    pub fn visit_key(&self) -> Result<[u8; 32], String> {
        let hex_key = match (&self.visit.visit_secret, self.dev_mode) {
            (Some(secret), _) => secret.clone(),
            (None, true) => "00".repeat(32),
            (None, false) => return Err("VISIT_SECRET is required in production mode".into()),
        };

        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| format!("VISIT_SECRET is not valid hex: {}", e))?;
        bytes
            .try_into()
            .map_err(|_| "VISIT_SECRET must be 32 bytes (64 hex chars)".to_string())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            if self.jwt_secret.is_none() {
                return Err("JWT_SECRET is required in production mode".to_string());
            }
            if self.utools_keys().is_empty() {
                return Err("UTOOLS_API_KEYS is required in production mode".to_string());
            }
        }

        if self.referral_commission_percent > 100 {
            return Err("REFERRAL_COMMISSION_PERCENT must be between 0 and 100".to_string());
        }

        if self.visit.visit_dwell_seconds < 0 {
            return Err("VISIT_DWELL_SECONDS must not be negative".to_string());
        }

        self.utc_offset()?;
        self.week_start()?;
        self.visit_key()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_args(extra: &[&str]) -> Args {
        let mut argv = vec!["quest-gateway", "--dev-mode"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_dev_defaults_validate() {
        let args = dev_args(&[]);
        assert!(args.validate().is_ok());
        assert!(args.jwt_secret().is_some());
        assert_eq!(args.week_start().unwrap(), Weekday::Sun);
    }

    #[test]
    fn test_key_list_parsing() {
        let args = dev_args(&["--utools-api-keys", "a, b,,c "]);
        assert_eq!(args.utools_keys(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_bad_visit_secret() {
        let args = dev_args(&["--visit-secret", "abcd"]);
        assert!(args.validate().is_err());
    }
}
