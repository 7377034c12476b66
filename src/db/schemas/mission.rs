//! Mission catalog schema
//!
//! A mission's `kind` selects the verification predicate. Kinds are a closed
//! set, so a catalog document naming an unknown kind fails to decode instead
//! of reaching dispatch.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for missions
pub const MISSION_COLLECTION: &str = "missions";

/// Where a mission is performed
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    #[default]
    Wallet,
    Titan,
    Twitter,
    Discord,
    Telegram,
}

/// How often a mission can be credited
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    #[default]
    OneTime,
    Daily,
    Weekly,
}

/// Predicate selector
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MissionKind {
    Follow,
    Like,
    Repost,
    Quote,
    OriginalPost,
    JoinGroup,
    JoinChannel,
    VisitWebsite,
    ReferralBind,
    InviteFriends,
    VisitReferrer,
    ConnectWallet,
    #[default]
    NotImplemented,
}

impl MissionKind {
    /// Like/Repost missions are scoped to the post they currently target
    pub fn is_target_scoped(&self) -> bool {
        matches!(self, Self::Like | Self::Repost)
    }
}

/// One step of a tiered mission (e.g. "invite 5 friends")
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SubMission {
    pub id: i64,

    /// Threshold text; the first integer in it is the threshold
    pub title: String,

    pub credit: i64,
}

/// Mission definition
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Mission {
    /// Numeric mission id
    pub mission_id: i64,

    pub channel: Channel,

    pub cadence: Cadence,

    pub kind: MissionKind,

    pub credit: i64,

    pub title: String,

    /// Target URL shown to the user (post to like, intent URL with `text`)
    #[serde(default)]
    pub open_url: String,

    /// Group, channel or account id the mission points at
    #[serde(default)]
    pub target_id: String,

    /// Ordered sub-missions
    #[serde(default)]
    pub sub_missions: Vec<SubMission>,
}

impl Mission {
    /// Scope filter for ledger lookups
    pub fn scope(&self) -> String {
        if self.kind.is_target_scoped() {
            self.open_url.clone()
        } else {
            String::new()
        }
    }
}

impl IntoIndexes for Mission {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "mission_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("mission_id_unique".to_string())
                    .build(),
            ),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_kind_is_rejected_at_decode() {
        let raw = serde_json::json!({
            "mission_id": 7,
            "channel": "twitter",
            "cadence": "daily",
            "kind": "dance_party",
            "credit": 10,
            "title": "dance",
        });
        assert!(serde_json::from_value::<Mission>(raw).is_err());
    }

    #[test]
    fn test_scope_only_for_like_and_repost() {
        let mut mission = Mission {
            kind: MissionKind::Like,
            open_url: "https://x.com/intent/like?tweet_id=1".into(),
            ..Default::default()
        };
        assert_eq!(mission.scope(), mission.open_url);

        mission.kind = MissionKind::Follow;
        assert_eq!(mission.scope(), "");
    }
}
