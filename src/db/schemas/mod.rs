//! Database schemas for quest-gateway
//!
//! Defines MongoDB document structures for missions, identity links, the
//! completion ledger, users, submitted links and the bot cache.

mod cache_entry;
mod identity_link;
mod ledger_entry;
mod mission;
mod post_link;
mod user;

pub use cache_entry::{invite_counter_key, CacheEntry, CACHE_COLLECTION, DISCORD_MEMBERS_KEY};
pub use identity_link::{IdentityLink, Platform, IDENTITY_LINK_COLLECTION};
pub use ledger_entry::{InviteLog, LedgerEntry, INVITE_LOG_COLLECTION, LEDGER_COLLECTION};
pub use mission::{Cadence, Channel, Mission, MissionKind, SubMission, MISSION_COLLECTION};
pub use post_link::{PostLink, POST_LINK_COLLECTION};
pub use user::{UserRecord, USER_COLLECTION};
