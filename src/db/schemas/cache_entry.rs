//! Bot cache schema
//!
//! The Discord/Telegram bots write membership sets and counters here; this
//! service only reads them.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for cache entries
pub const CACHE_COLLECTION: &str = "bot_cache";

/// Discord guild member set
pub const DISCORD_MEMBERS_KEY: &str = "gm::discord::members";

/// Invite counter key for a Discord user in the week starting at `week_start`
/// (formatted `%Y-%m-%d %H:%M:%S`)
pub fn invite_counter_key(discord_id: &str, week_start: &str) -> String {
    format!("gm::discord::invitecounter::{}::{}", discord_id, week_start)
}

/// A set or a counter
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct CacheEntry {
    pub key: String,

    #[serde(default)]
    pub members: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter: Option<i64>,
}

impl IntoIndexes for CacheEntry {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "key": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("key_unique".to_string())
                    .build(),
            ),
        )]
    }
}
