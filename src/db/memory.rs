//! In-memory implementation of the storage traits
//!
//! Used in dev mode and by tests. Uniqueness rules match the MongoDB indexes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::db::schemas::{
    CacheEntry, IdentityLink, InviteLog, LedgerEntry, Mission, Platform, PostLink, SubMission,
    UserRecord,
};
use crate::db::store::{
    CacheStore, CreditRank, IdentityLinks, InsertOutcome, Ledger, LedgerQuery, MissionCatalog,
    Page, Paged, PostLinks, UserDirectory,
};
use crate::types::{QuestError, Result};

fn slot_key(entry: &LedgerEntry) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        entry.user, entry.mission_id, entry.sub_mission_id, entry.period_key, entry.scope
    )
}

fn poisoned<T>(_: T) -> QuestError {
    QuestError::InternalServer("memory store lock poisoned".to_string())
}

/// Process-local store
#[derive(Default)]
pub struct MemoryStore {
    missions: DashMap<i64, Mission>,
    links: Mutex<Vec<IdentityLink>>,
    ledger: DashMap<String, LedgerEntry>,
    invites: Mutex<Vec<InviteLog>>,
    users: DashMap<String, UserRecord>,
    post_links: Mutex<Vec<PostLink>>,
    cache: DashMap<String, CacheEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a mission definition
    pub fn put_mission(&self, mission: Mission) {
        self.missions.insert(mission.mission_id, mission);
    }

    /// Add or replace a user record
    pub fn put_user(&self, user: UserRecord) {
        self.users.insert(user.user.clone(), user);
    }

    /// Add `member` to the cache set at `key`
    pub fn add_member(&self, key: &str, member: &str) {
        let mut entry = self.cache.entry(key.to_string()).or_insert_with(|| CacheEntry {
            key: key.to_string(),
            ..Default::default()
        });
        if !entry.members.iter().any(|m| m == member) {
            entry.members.push(member.to_string());
        }
    }

    /// Set the cache counter at `key`
    pub fn set_counter(&self, key: &str, value: i64) {
        let mut entry = self.cache.entry(key.to_string()).or_insert_with(|| CacheEntry {
            key: key.to_string(),
            ..Default::default()
        });
        entry.counter = Some(value);
    }

    /// Snapshot of every invite log
    pub fn all_invite_logs(&self) -> Vec<InviteLog> {
        self.invites
            .lock()
            .map(|logs| logs.clone())
            .unwrap_or_default()
    }

    /// Number of ledger entries across all users
    pub fn ledger_len(&self) -> usize {
        self.ledger.len()
    }
}

#[async_trait]
impl IdentityLinks for MemoryStore {
    async fn get_link(&self, platform: Platform, user: &str) -> Result<Option<IdentityLink>> {
        let links = self.links.lock().map_err(poisoned)?;
        Ok(links
            .iter()
            .find(|l| l.platform == platform && l.user == user)
            .cloned())
    }

    async fn link(
        &self,
        platform: Platform,
        user: &str,
        external_id: &str,
    ) -> Result<IdentityLink> {
        let mut links = self.links.lock().map_err(poisoned)?;

        if let Some(existing) = links
            .iter()
            .find(|l| l.platform == platform && l.external_id == external_id)
        {
            return if existing.user == user {
                Ok(existing.clone())
            } else {
                Err(QuestError::AlreadyLinked)
            };
        }

        if links.iter().any(|l| l.platform == platform && l.user == user) {
            return Err(QuestError::AlreadyLinked);
        }

        let link = IdentityLink::new(user, platform, external_id);
        links.push(link.clone());
        Ok(link)
    }
}

#[async_trait]
impl MissionCatalog for MemoryStore {
    async fn get_mission(&self, id: i64) -> Result<Option<Mission>> {
        Ok(self.missions.get(&id).map(|m| m.clone()))
    }

    async fn sub_missions(&self, id: i64) -> Result<Vec<SubMission>> {
        Ok(self
            .missions
            .get(&id)
            .map(|m| m.sub_missions.clone())
            .unwrap_or_default())
    }

    async fn list_missions(&self) -> Result<Vec<Mission>> {
        let mut missions: Vec<Mission> = self.missions.iter().map(|m| m.clone()).collect();
        missions.sort_by_key(|m| m.mission_id);
        Ok(missions)
    }
}

#[async_trait]
impl Ledger for MemoryStore {
    async fn query_entries(&self, query: &LedgerQuery) -> Result<Vec<LedgerEntry>> {
        let mut entries: Vec<LedgerEntry> = self
            .ledger
            .iter()
            .filter(|e| query.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by_key(|e| e.sub_mission_id);
        Ok(entries)
    }

    async fn insert_entry(&self, entry: LedgerEntry) -> Result<InsertOutcome> {
        match self.ledger.entry(slot_key(&entry)) {
            Entry::Occupied(_) => Ok(InsertOutcome::Duplicate),
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn record_invite(&self, log: InviteLog) -> Result<()> {
        self.invites.lock().map_err(poisoned)?.push(log);
        Ok(())
    }

    async fn sum_credits(&self, user: &str) -> Result<i64> {
        Ok(self
            .ledger
            .iter()
            .filter(|e| e.user == user)
            .map(|e| e.credit)
            .sum())
    }

    async fn sum_invite_credits(&self, user: &str) -> Result<i64> {
        let invites = self.invites.lock().map_err(poisoned)?;
        Ok(invites
            .iter()
            .filter(|l| l.inviter == user)
            .map(|l| l.commission)
            .sum())
    }

    async fn entries_for_user(&self, user: &str) -> Result<Vec<LedgerEntry>> {
        let mut entries: Vec<LedgerEntry> = self
            .ledger
            .iter()
            .filter(|e| e.user == user)
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    async fn mission_logs(&self, user: &str, page: Page) -> Result<Paged<LedgerEntry>> {
        let mut entries = self.entries_for_user(user).await?;
        entries.reverse();
        Ok(Paged {
            total: entries.len() as u64,
            list: page.slice(&entries),
        })
    }

    async fn invite_logs(&self, inviter: &str, page: Page) -> Result<Paged<InviteLog>> {
        let mut logs: Vec<InviteLog> = self
            .invites
            .lock()
            .map_err(poisoned)?
            .iter()
            .filter(|l| l.inviter == inviter)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Paged {
            total: logs.len() as u64,
            list: page.slice(&logs),
        })
    }

    async fn credit_leaderboard(&self, page: Page) -> Result<Paged<CreditRank>> {
        let mut totals: HashMap<String, i64> = HashMap::new();
        for entry in self.ledger.iter() {
            *totals.entry(entry.user.clone()).or_default() += entry.credit;
        }

        let mut ranked: Vec<(String, i64)> = totals.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let total = ranked.len() as u64;

        let list = ranked
            .into_iter()
            .enumerate()
            .skip(page.skip() as usize)
            .take(page.size as usize)
            .map(|(i, (user, credits))| CreditRank {
                rank: i as u64 + 1,
                user,
                credits,
            })
            .collect();

        Ok(Paged { total, list })
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn get_user(&self, user: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.get(user).map(|u| u.clone()))
    }

    async fn bind_referral_code(&self, user: &str, code: &str, owner: &str) -> Result<()> {
        let mut record = self
            .users
            .entry(user.to_string())
            .or_insert_with(|| UserRecord::new(user));

        if record.bound_code().is_some() {
            return Err(QuestError::ReferralCodeBound);
        }

        record.referral_code = Some(code.to_string());
        record.referral_owner = Some(owner.to_string());
        Ok(())
    }
}

#[async_trait]
impl PostLinks for MemoryStore {
    async fn latest_link(
        &self,
        user: &str,
        mission_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Option<PostLink>> {
        let links = self.post_links.lock().map_err(poisoned)?;
        Ok(links
            .iter()
            .filter(|l| l.user == user && l.mission_id == mission_id && l.created_at >= since)
            .max_by_key(|l| l.created_at)
            .cloned())
    }

    async fn submit_link(&self, link: PostLink) -> Result<()> {
        self.post_links.lock().map_err(poisoned)?.push(link);
        Ok(())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn is_member(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .cache
            .get(key)
            .map(|entry| entry.members.iter().any(|m| m == member))
            .unwrap_or(false))
    }

    async fn counter(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.cache.get(key).and_then(|entry| entry.counter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::Cadence;
    use std::sync::Arc;

    fn entry(user: &str, period_key: &str) -> LedgerEntry {
        LedgerEntry {
            user: user.to_string(),
            mission_id: 1,
            sub_mission_id: 0,
            period_key: period_key.to_string(),
            scope: String::new(),
            cadence: Cadence::Daily,
            credit: 10,
            content: String::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_concurrent_inserts_keep_one_entry() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert_entry(entry("alice", "day:2024-05-06")).await
            }));
        }

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == InsertOutcome::Inserted {
                inserted += 1;
            }
        }

        assert_eq!(inserted, 1);
        assert_eq!(store.ledger_len(), 1);
    }

    #[tokio::test]
    async fn test_leaderboard_orders_by_credits_then_user() {
        let store = MemoryStore::new();
        for (user, day) in [("dave", "day:1"), ("dave", "day:2"), ("carol", "day:1"), ("bob", "day:1")] {
            store.insert_entry(entry(user, day)).await.unwrap();
        }

        let board = store.credit_leaderboard(Page::default()).await.unwrap();
        let rows: Vec<(u64, &str, i64)> = board
            .list
            .iter()
            .map(|r| (r.rank, r.user.as_str(), r.credits))
            .collect();
        assert_eq!(rows, vec![(1, "dave", 20), (2, "bob", 10), (3, "carol", 10)]);

        let page = store
            .credit_leaderboard(Page::new(Some(2), Some(2)))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.list.len(), 1);
        assert_eq!(page.list[0].rank, 3);
        assert_eq!(page.list[0].user, "carol");
    }

    #[tokio::test]
    async fn test_link_conflicts() {
        let store = MemoryStore::new();
        store.link(Platform::Twitter, "alice", "100").await.unwrap();

        // Idempotent for the owner
        assert!(store.link(Platform::Twitter, "alice", "100").await.is_ok());
        assert!(matches!(
            store.link(Platform::Twitter, "bob", "100").await,
            Err(QuestError::AlreadyLinked)
        ));
        assert!(matches!(
            store.link(Platform::Twitter, "alice", "200").await,
            Err(QuestError::AlreadyLinked)
        ));
        // Other platforms are independent
        assert!(store.link(Platform::Discord, "bob", "100").await.is_ok());
    }

    #[tokio::test]
    async fn test_referral_code_binds_once() {
        let store = MemoryStore::new();
        store.bind_referral_code("alice", "KOL1", "kol-1").await.unwrap();
        assert!(matches!(
            store.bind_referral_code("alice", "KOL2", "kol-2").await,
            Err(QuestError::ReferralCodeBound)
        ));
        let user = store.get_user("alice").await.unwrap().unwrap();
        assert_eq!(user.bound_code(), Some("KOL1"));
    }
}
