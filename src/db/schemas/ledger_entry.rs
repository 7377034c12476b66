//! Completion ledger schema
//!
//! Each entry is one immutable credit grant. The unique index over
//! (user, mission_id, sub_mission_id, period_key, scope) is what makes
//! crediting idempotent under concurrent checks.

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::Cadence;

/// Collection name for ledger entries
pub const LEDGER_COLLECTION: &str = "ledger_entries";

/// Collection name for invite side records
pub const INVITE_LOG_COLLECTION: &str = "invite_logs";

/// A credit grant
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LedgerEntry {
    pub user: String,

    pub mission_id: i64,

    /// 0 when the mission has no sub-missions
    #[serde(default)]
    pub sub_mission_id: i64,

    /// `once`, `day:YYYY-MM-DD` or `week:YYYY-MM-DD`
    pub period_key: String,

    /// Mission target for Like/Repost, empty otherwise
    #[serde(default)]
    pub scope: String,

    pub cadence: Cadence,

    pub credit: i64,

    /// Evidence that justified the grant
    #[serde(default)]
    pub content: String,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl IntoIndexes for LedgerEntry {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! {
                    "user": 1,
                    "mission_id": 1,
                    "sub_mission_id": 1,
                    "period_key": 1,
                    "scope": 1,
                },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("grant_slot_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "user": 1, "created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("user_created_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

/// Side record crediting the inviter of a user who was just granted credit
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct InviteLog {
    pub inviter: String,

    pub invitee: String,

    pub mission_id: i64,

    #[serde(default)]
    pub sub_mission_id: i64,

    /// Credit the invitee received
    pub credit: i64,

    /// Commission credited to the inviter
    pub commission: i64,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl IntoIndexes for InviteLog {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "inviter": 1 },
            Some(
                IndexOptions::builder()
                    .name("inviter_index".to_string())
                    .build(),
            ),
        )]
    }
}
