//! Identity link schema
//!
//! Maps an internal user to their account on an external platform.

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for identity links
pub const IDENTITY_LINK_COLLECTION: &str = "identity_links";

/// External platform an account lives on
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Twitter,
    Discord,
    Telegram,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Twitter => "twitter",
            Self::Discord => "discord",
            Self::Telegram => "telegram",
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "twitter" => Ok(Self::Twitter),
            "discord" => Ok(Self::Discord),
            "telegram" => Ok(Self::Telegram),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// (user, platform) -> external account id
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct IdentityLink {
    pub user: String,

    pub platform: Platform,

    /// Account id on the platform (Telegram ids are stored as decimal text)
    pub external_id: String,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub linked_at: DateTime<Utc>,
}

impl IdentityLink {
    pub fn new(user: &str, platform: Platform, external_id: &str) -> Self {
        Self {
            user: user.to_string(),
            platform,
            external_id: external_id.to_string(),
            linked_at: Utc::now(),
        }
    }
}

impl IntoIndexes for IdentityLink {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // One user per external account
            (
                doc! { "platform": 1, "external_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("platform_external_unique".to_string())
                        .build(),
                ),
            ),
            // One external account per user and platform
            (
                doc! { "platform": 1, "user": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("platform_user_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
