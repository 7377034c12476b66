//! Storage seams used by the verification engine
//!
//! Every trait has a MongoDB implementation (`db::MongoStore`) and an
//! in-memory one (`db::MemoryStore`) used in dev mode and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::schemas::{
    IdentityLink, InviteLog, LedgerEntry, Mission, Platform, PostLink, SubMission, UserRecord,
};
use crate::types::Result;

/// Result of inserting into a uniquely indexed collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The slot was already occupied; the existing record stands
    Duplicate,
}

/// Ledger lookup for one mission in one period
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerQuery {
    pub user: String,
    pub mission_id: i64,
    pub period_key: String,
    pub scope: String,
}

impl LedgerQuery {
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        entry.user == self.user
            && entry.mission_id == self.mission_id
            && entry.period_key == self.period_key
            && entry.scope == self.scope
    }
}

/// 1-based page of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u64,
    pub size: u64,
}

impl Page {
    pub const DEFAULT_SIZE: u64 = 10;
    pub const MAX_SIZE: u64 = 100;

    /// Missing or zero values fall back to the first page of default size
    pub fn new(number: Option<u64>, size: Option<u64>) -> Self {
        Self {
            number: number.filter(|n| *n > 0).unwrap_or(1),
            size: size
                .filter(|s| *s > 0)
                .unwrap_or(Self::DEFAULT_SIZE)
                .min(Self::MAX_SIZE),
        }
    }

    pub fn skip(&self) -> u64 {
        (self.number - 1) * self.size
    }

    /// Slice of `items` this page covers
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .skip(self.skip() as usize)
            .take(self.size as usize)
            .cloned()
            .collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of a listing plus the total count
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Paged<T> {
    pub total: u64,
    pub list: Vec<T>,
}

/// A user's place on the credit leaderboard
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreditRank {
    /// 1-based position across all pages
    pub rank: u64,
    pub user: String,
    pub credits: i64,
}

/// Internal user to external account links
#[async_trait]
pub trait IdentityLinks: Send + Sync {
    async fn get_link(&self, platform: Platform, user: &str) -> Result<Option<IdentityLink>>;

    /// Create a link. Fails with `AlreadyLinked` when the external account
    /// belongs to another user or the user is linked to another account.
    async fn link(&self, platform: Platform, user: &str, external_id: &str)
        -> Result<IdentityLink>;
}

/// Read access to mission definitions
#[async_trait]
pub trait MissionCatalog: Send + Sync {
    async fn get_mission(&self, id: i64) -> Result<Option<Mission>>;

    async fn sub_missions(&self, id: i64) -> Result<Vec<SubMission>>;

    async fn list_missions(&self) -> Result<Vec<Mission>>;
}

/// Append-only completion ledger
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn query_entries(&self, query: &LedgerQuery) -> Result<Vec<LedgerEntry>>;

    async fn insert_entry(&self, entry: LedgerEntry) -> Result<InsertOutcome>;

    async fn record_invite(&self, log: InviteLog) -> Result<()>;

    async fn sum_credits(&self, user: &str) -> Result<i64>;

    /// Commission credited to `user` as an inviter
    async fn sum_invite_credits(&self, user: &str) -> Result<i64>;

    async fn entries_for_user(&self, user: &str) -> Result<Vec<LedgerEntry>>;

    /// Grant history of `user`, newest first
    async fn mission_logs(&self, user: &str, page: Page) -> Result<Paged<LedgerEntry>>;

    /// Commission records where `inviter` is the inviter, newest first
    async fn invite_logs(&self, inviter: &str, page: Page) -> Result<Paged<InviteLog>>;

    /// Users by total credit, highest first; ties by user id
    async fn credit_leaderboard(&self, page: Page) -> Result<Paged<CreditRank>>;
}

/// User records
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, user: &str) -> Result<Option<UserRecord>>;

    /// Store a referral code and its owner. Fails with `ReferralCodeBound`
    /// when the user already has one.
    async fn bind_referral_code(&self, user: &str, code: &str, owner: &str) -> Result<()>;
}

/// Links submitted for quote/original-post missions
#[async_trait]
pub trait PostLinks: Send + Sync {
    /// Most recent link for (user, mission) created at or after `since`
    async fn latest_link(
        &self,
        user: &str,
        mission_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Option<PostLink>>;

    async fn submit_link(&self, link: PostLink) -> Result<()>;
}

/// Read-only view of the bot cache
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn is_member(&self, key: &str, member: &str) -> Result<bool>;

    async fn counter(&self, key: &str) -> Result<Option<i64>>;
}
