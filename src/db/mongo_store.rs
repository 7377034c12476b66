//! MongoDB-backed implementation of the storage traits

use async_trait::async_trait;
use bson::{doc, Document};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::db::mongo::{int_field, MongoClient, MongoCollection};
use crate::db::schemas::{
    CacheEntry, IdentityLink, InviteLog, LedgerEntry, Mission, Platform, PostLink, SubMission,
    UserRecord, CACHE_COLLECTION, IDENTITY_LINK_COLLECTION, INVITE_LOG_COLLECTION,
    LEDGER_COLLECTION, MISSION_COLLECTION, POST_LINK_COLLECTION, USER_COLLECTION,
};
use crate::db::store::{
    CacheStore, CreditRank, IdentityLinks, InsertOutcome, Ledger, LedgerQuery, MissionCatalog,
    Page, Paged, PostLinks, UserDirectory,
};
use crate::types::{QuestError, Result};

/// All collections the service touches
#[derive(Clone)]
pub struct MongoStore {
    missions: MongoCollection<Mission>,
    links: MongoCollection<IdentityLink>,
    ledger: MongoCollection<LedgerEntry>,
    invites: MongoCollection<InviteLog>,
    users: MongoCollection<UserRecord>,
    post_links: MongoCollection<PostLink>,
    cache: MongoCollection<CacheEntry>,
}

impl MongoStore {
    /// Open every collection, creating indexes
    pub async fn new(client: &MongoClient) -> Result<Self> {
        Ok(Self {
            missions: client.collection(MISSION_COLLECTION).await?,
            links: client.collection(IDENTITY_LINK_COLLECTION).await?,
            ledger: client.collection(LEDGER_COLLECTION).await?,
            invites: client.collection(INVITE_LOG_COLLECTION).await?,
            users: client.collection(USER_COLLECTION).await?,
            post_links: client.collection(POST_LINK_COLLECTION).await?,
            cache: client.collection(CACHE_COLLECTION).await?,
        })
    }
}

#[async_trait]
impl IdentityLinks for MongoStore {
    async fn get_link(&self, platform: Platform, user: &str) -> Result<Option<IdentityLink>> {
        self.links
            .find_one(doc! { "platform": platform.as_str(), "user": user })
            .await
    }

    async fn link(
        &self,
        platform: Platform,
        user: &str,
        external_id: &str,
    ) -> Result<IdentityLink> {
        let owner = self
            .links
            .find_one(doc! { "platform": platform.as_str(), "external_id": external_id })
            .await?;

        if let Some(existing) = owner {
            if existing.user == user {
                return Ok(existing);
            }
            warn!(
                platform = platform.as_str(),
                user, "External account already linked to another user"
            );
            return Err(QuestError::AlreadyLinked);
        }

        let link = IdentityLink::new(user, platform, external_id);
        match self.links.insert_unique(link.clone()).await? {
            InsertOutcome::Inserted => Ok(link),
            // Lost a race, or the user already has a different account linked
            InsertOutcome::Duplicate => Err(QuestError::AlreadyLinked),
        }
    }
}

#[async_trait]
impl MissionCatalog for MongoStore {
    async fn get_mission(&self, id: i64) -> Result<Option<Mission>> {
        self.missions.find_one(doc! { "mission_id": id }).await
    }

    async fn sub_missions(&self, id: i64) -> Result<Vec<SubMission>> {
        Ok(self
            .get_mission(id)
            .await?
            .map(|m| m.sub_missions)
            .unwrap_or_default())
    }

    async fn list_missions(&self) -> Result<Vec<Mission>> {
        let mut missions = self.missions.find_many(doc! {}).await?;
        missions.sort_by_key(|m| m.mission_id);
        Ok(missions)
    }
}

#[async_trait]
impl Ledger for MongoStore {
    async fn query_entries(&self, query: &LedgerQuery) -> Result<Vec<LedgerEntry>> {
        self.ledger
            .find_many(doc! {
                "user": query.user.as_str(),
                "mission_id": query.mission_id,
                "period_key": query.period_key.as_str(),
                "scope": query.scope.as_str(),
            })
            .await
    }

    async fn insert_entry(&self, entry: LedgerEntry) -> Result<InsertOutcome> {
        let outcome = self.ledger.insert_unique(entry).await?;
        if outcome == InsertOutcome::Duplicate {
            debug!("Ledger slot already occupied");
        }
        Ok(outcome)
    }

    async fn record_invite(&self, log: InviteLog) -> Result<()> {
        self.invites.insert_one(log).await
    }

    async fn sum_credits(&self, user: &str) -> Result<i64> {
        self.ledger.sum_field(doc! { "user": user }, "credit").await
    }

    async fn sum_invite_credits(&self, user: &str) -> Result<i64> {
        self.invites
            .sum_field(doc! { "inviter": user }, "commission")
            .await
    }

    async fn entries_for_user(&self, user: &str) -> Result<Vec<LedgerEntry>> {
        self.ledger.find_many(doc! { "user": user }).await
    }

    async fn mission_logs(&self, user: &str, page: Page) -> Result<Paged<LedgerEntry>> {
        let filter = doc! { "user": user };
        let (total, list) = futures::try_join!(
            self.ledger.count(filter.clone()),
            self.ledger
                .find_page(filter.clone(), doc! { "created_at": -1 }, page),
        )?;
        Ok(Paged { total, list })
    }

    async fn invite_logs(&self, inviter: &str, page: Page) -> Result<Paged<InviteLog>> {
        let filter = doc! { "inviter": inviter };
        let (total, list) = futures::try_join!(
            self.invites.count(filter.clone()),
            self.invites
                .find_page(filter.clone(), doc! { "created_at": -1 }, page),
        )?;
        Ok(Paged { total, list })
    }

    async fn credit_leaderboard(&self, page: Page) -> Result<Paged<CreditRank>> {
        let per_user = doc! { "$group": { "_id": "$user", "credits": { "$sum": "$credit" } } };

        let ranked = vec![
            per_user.clone(),
            doc! { "$sort": { "credits": -1, "_id": 1 } },
            doc! { "$skip": page.skip() as i64 },
            doc! { "$limit": page.size as i64 },
        ];
        let counted = vec![per_user, doc! { "$count": "users" }];

        let (rows, count) = futures::try_join!(
            self.ledger.aggregate(ranked),
            self.ledger.aggregate(counted),
        )?;

        let list = rows
            .iter()
            .enumerate()
            .map(|(i, row)| CreditRank {
                rank: page.skip() + i as u64 + 1,
                user: group_key(row),
                credits: int_field(row, "credits"),
            })
            .collect();
        let total = count.first().map(|d| int_field(d, "users")).unwrap_or(0) as u64;

        Ok(Paged { total, list })
    }
}

fn group_key(row: &Document) -> String {
    row.get_str("_id").map(str::to_string).unwrap_or_default()
}

#[async_trait]
impl UserDirectory for MongoStore {
    async fn get_user(&self, user: &str) -> Result<Option<UserRecord>> {
        self.users.find_one(doc! { "user": user }).await
    }

    async fn bind_referral_code(&self, user: &str, code: &str, owner: &str) -> Result<()> {
        let filter = doc! {
            "user": user,
            "$or": [
                { "referral_code": { "$exists": false } },
                { "referral_code": null },
                { "referral_code": "" },
            ],
        };
        let update = doc! {
            "$set": { "referral_code": code, "referral_owner": owner },
        };

        match self.users.guarded_upsert(filter, update).await? {
            InsertOutcome::Inserted => Ok(()),
            InsertOutcome::Duplicate => Err(QuestError::ReferralCodeBound),
        }
    }
}

#[async_trait]
impl PostLinks for MongoStore {
    async fn latest_link(
        &self,
        user: &str,
        mission_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Option<PostLink>> {
        self.post_links
            .find_first(
                doc! {
                    "user": user,
                    "mission_id": mission_id,
                    "created_at": { "$gte": since.timestamp_millis() },
                },
                doc! { "created_at": -1 },
            )
            .await
    }

    async fn submit_link(&self, link: PostLink) -> Result<()> {
        self.post_links.insert_one(link).await
    }
}

#[async_trait]
impl CacheStore for MongoStore {
    async fn is_member(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .cache
            .find_one(doc! { "key": key })
            .await?
            .map(|entry| entry.members.iter().any(|m| m == member))
            .unwrap_or(false))
    }

    async fn counter(&self, key: &str) -> Result<Option<i64>> {
        Ok(self
            .cache
            .find_one(doc! { "key": key })
            .await?
            .and_then(|entry| entry.counter))
    }
}
