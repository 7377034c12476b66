//! User record schema
//!
//! Users are created by the login flow. This service reads the inviter and
//! owns the referral code fields.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// User record
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct UserRecord {
    /// User identity (wallet address or username)
    pub user: String,

    /// Referral code the user bound, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral_code: Option<String>,

    /// Owner of the bound referral code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral_owner: Option<String>,

    /// User who invited this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inviter: Option<String>,
}

impl UserRecord {
    pub fn new(user: &str) -> Self {
        Self {
            user: user.to_string(),
            ..Default::default()
        }
    }

    pub fn with_inviter(mut self, inviter: &str) -> Self {
        self.inviter = Some(inviter.to_string());
        self
    }

    /// Bound code, treating an empty string as unbound
    pub fn bound_code(&self) -> Option<&str> {
        self.referral_code.as_deref().filter(|c| !c.is_empty())
    }
}

impl IntoIndexes for UserRecord {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "user": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("user_unique".to_string())
                    .build(),
            ),
        )]
    }
}
