//! Submitted post link schema
//!
//! Quote and original-post missions are verified against the link the user
//! submitted most recently.

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for submitted links
pub const POST_LINK_COLLECTION: &str = "post_links";

/// A post URL submitted for a mission
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PostLink {
    pub user: String,

    pub mission_id: i64,

    pub link: String,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl IntoIndexes for PostLink {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "user": 1, "mission_id": 1, "created_at": -1 },
            Some(
                IndexOptions::builder()
                    .name("user_mission_latest".to_string())
                    .build(),
            ),
        )]
    }
}
