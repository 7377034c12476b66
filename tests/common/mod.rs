//! Shared fixtures for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use quest_gateway::db::schemas::{
    Cadence, Channel, IdentityLink, InviteLog, LedgerEntry, Mission, MissionKind, Platform,
    SubMission,
};
use quest_gateway::db::{
    CreditRank, IdentityLinks, InsertOutcome, Ledger, LedgerQuery, MemoryStore, Page, Paged,
};
use quest_gateway::QuestError;
use quest_gateway::services::{PeriodClock, QuestService, QuestSettings, Stores, Upstreams};
use quest_gateway::upstream::{
    DiscordApi, ReferralDirectory, SocialApi, TelegramApi, TweetDetail, UpstreamError,
};

pub const OFFICIAL_TWITTER_ID: &str = "9000";

/// Monday 2024-05-06 00:00:00 UTC
pub fn day_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap()
}

/// Monday 2024-05-06 12:00:00 UTC
pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap()
}

pub fn mission(id: i64, channel: Channel, cadence: Cadence, kind: MissionKind) -> Mission {
    Mission {
        mission_id: id,
        channel,
        cadence,
        kind,
        credit: 100,
        title: format!("mission {}", id),
        ..Default::default()
    }
}

pub fn sub_mission(id: i64, title: &str, credit: i64) -> SubMission {
    SubMission {
        id,
        title: title.to_string(),
        credit,
    }
}

/// Twitter fake with per-call counting
#[derive(Default)]
pub struct FakeSocial {
    pub followings: Mutex<HashMap<String, Vec<String>>>,
    pub favoriters: Mutex<HashMap<String, Vec<String>>>,
    pub retweeters: Mutex<HashMap<String, Vec<String>>>,
    pub tweets: Mutex<HashMap<String, TweetDetail>>,
    /// When set, every call fails with this vendor envelope
    pub envelope_failure: Mutex<Option<(i64, String)>>,
    pub calls: AtomicU32,
}

impl FakeSocial {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn follow(&self, user_id: &str, target: &str) {
        self.followings
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default()
            .push(target.to_string());
    }

    pub fn like(&self, tweet_id: &str, user_id: &str) {
        self.favoriters
            .lock()
            .unwrap()
            .entry(tweet_id.to_string())
            .or_default()
            .push(user_id.to_string());
    }

    pub fn put_tweet(&self, tweet_id: &str, detail: TweetDetail) {
        self.tweets
            .lock()
            .unwrap()
            .insert(tweet_id.to_string(), detail);
    }

    pub fn fail_with_envelope(&self, code: i64, msg: &str) {
        *self.envelope_failure.lock().unwrap() = Some((code, msg.to_string()));
    }

    fn enter(&self) -> Result<(), UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.envelope_failure.lock().unwrap().clone() {
            Some((code, msg)) => Err(UpstreamError::Envelope { code, msg }),
            None => Ok(()),
        }
    }

    fn ids(map: &Mutex<HashMap<String, Vec<String>>>, key: &str) -> Vec<String> {
        map.lock().unwrap().get(key).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SocialApi for FakeSocial {
    async fn followings(&self, user_id: &str) -> Result<Vec<String>, UpstreamError> {
        self.enter()?;
        Ok(Self::ids(&self.followings, user_id))
    }

    async fn favoriters(&self, tweet_id: &str) -> Result<Vec<String>, UpstreamError> {
        self.enter()?;
        Ok(Self::ids(&self.favoriters, tweet_id))
    }

    async fn retweeters(&self, tweet_id: &str) -> Result<Vec<String>, UpstreamError> {
        self.enter()?;
        Ok(Self::ids(&self.retweeters, tweet_id))
    }

    async fn tweet_detail(&self, tweet_id: &str) -> Result<TweetDetail, UpstreamError> {
        self.enter()?;
        self.tweets
            .lock()
            .unwrap()
            .get(tweet_id)
            .cloned()
            .ok_or(UpstreamError::Status(404))
    }
}

/// Telegram fake keyed by (chat, user)
#[derive(Default)]
pub struct FakeTelegram {
    pub statuses: Mutex<HashMap<(String, String), String>>,
    pub calls: AtomicU32,
}

impl FakeTelegram {
    pub fn set_status(&self, chat_id: &str, user_id: &str, status: &str) {
        self.statuses.lock().unwrap().insert(
            (chat_id.to_string(), user_id.to_string()),
            status.to_string(),
        );
    }
}

#[async_trait]
impl TelegramApi for FakeTelegram {
    async fn chat_member_status(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> Result<String, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .get(&(chat_id.to_string(), user_id.to_string()))
            .cloned()
            .ok_or_else(|| UpstreamError::Envelope {
                code: 400,
                msg: "Bad Request: user not found".into(),
            })
    }
}

/// Discord fake keyed by (user, channel)
#[derive(Default)]
pub struct FakeDiscord {
    pub permissions: Mutex<HashMap<(String, String), u64>>,
}

impl FakeDiscord {
    pub fn set_permissions(&self, user_id: &str, channel_id: &str, bits: u64) {
        self.permissions
            .lock()
            .unwrap()
            .insert((user_id.to_string(), channel_id.to_string()), bits);
    }
}

#[async_trait]
impl DiscordApi for FakeDiscord {
    async fn channel_permissions(
        &self,
        user_id: &str,
        channel_id: &str,
    ) -> Result<u64, UpstreamError> {
        self.permissions
            .lock()
            .unwrap()
            .get(&(user_id.to_string(), channel_id.to_string()))
            .copied()
            .ok_or(UpstreamError::Status(404))
    }
}

/// Referral directory fake: code -> owner
#[derive(Default)]
pub struct FakeReferrals {
    pub owners: Mutex<HashMap<String, String>>,
}

impl FakeReferrals {
    pub fn add(&self, code: &str, owner: &str) {
        self.owners
            .lock()
            .unwrap()
            .insert(code.to_string(), owner.to_string());
    }
}

#[async_trait]
impl ReferralDirectory for FakeReferrals {
    async fn code_owner(&self, code: &str) -> Result<Option<String>, UpstreamError> {
        Ok(self.owners.lock().unwrap().get(code).cloned())
    }
}

fn store_down() -> QuestError {
    QuestError::InternalServer("store unavailable".to_string())
}

/// Identity links whose every read fails
pub struct UnavailableLinks;

#[async_trait]
impl IdentityLinks for UnavailableLinks {
    async fn get_link(
        &self,
        _platform: Platform,
        _user: &str,
    ) -> quest_gateway::Result<Option<IdentityLink>> {
        Err(store_down())
    }

    async fn link(
        &self,
        _platform: Platform,
        _user: &str,
        _external_id: &str,
    ) -> quest_gateway::Result<IdentityLink> {
        Err(store_down())
    }
}

/// Memory ledger whose slot lookups fail
pub struct UnreadableLedger(pub Arc<MemoryStore>);

#[async_trait]
impl Ledger for UnreadableLedger {
    async fn query_entries(&self, _query: &LedgerQuery) -> quest_gateway::Result<Vec<LedgerEntry>> {
        Err(store_down())
    }

    async fn insert_entry(&self, entry: LedgerEntry) -> quest_gateway::Result<InsertOutcome> {
        self.0.insert_entry(entry).await
    }

    async fn record_invite(&self, log: InviteLog) -> quest_gateway::Result<()> {
        self.0.record_invite(log).await
    }

    async fn sum_credits(&self, user: &str) -> quest_gateway::Result<i64> {
        self.0.sum_credits(user).await
    }

    async fn sum_invite_credits(&self, user: &str) -> quest_gateway::Result<i64> {
        self.0.sum_invite_credits(user).await
    }

    async fn entries_for_user(&self, user: &str) -> quest_gateway::Result<Vec<LedgerEntry>> {
        self.0.entries_for_user(user).await
    }

    async fn mission_logs(
        &self,
        user: &str,
        page: Page,
    ) -> quest_gateway::Result<Paged<LedgerEntry>> {
        self.0.mission_logs(user, page).await
    }

    async fn invite_logs(
        &self,
        inviter: &str,
        page: Page,
    ) -> quest_gateway::Result<Paged<InviteLog>> {
        self.0.invite_logs(inviter, page).await
    }

    async fn credit_leaderboard(&self, page: Page) -> quest_gateway::Result<Paged<CreditRank>> {
        self.0.credit_leaderboard(page).await
    }
}

/// Quest service wired to a memory store and fakes
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub social: Arc<FakeSocial>,
    pub telegram: Arc<FakeTelegram>,
    pub discord: Arc<FakeDiscord>,
    pub referrals: Arc<FakeReferrals>,
    pub clock: PeriodClock,
    pub quests: Arc<QuestService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Arc::new(FakeSocial::default()), |_, _| {})
    }

    /// Memory store with some roles replaced by `replace`
    pub fn with_stores(replace: impl FnOnce(&Arc<MemoryStore>, &mut Stores)) -> Self {
        Self::build(Arc::new(FakeSocial::default()), replace)
    }

    pub fn with_social_api(social: Arc<dyn SocialApi>) -> (Arc<MemoryStore>, Arc<QuestService>) {
        let store = Arc::new(MemoryStore::new());
        let upstreams = Upstreams {
            social,
            telegram: Arc::new(FakeTelegram::default()),
            discord: Arc::new(FakeDiscord::default()),
            referrals: Arc::new(FakeReferrals::default()),
        };
        let quests = QuestService::new(Stores::shared(store.clone()), upstreams, settings());
        (store, Arc::new(quests))
    }

    fn build(
        social: Arc<FakeSocial>,
        replace: impl FnOnce(&Arc<MemoryStore>, &mut Stores),
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let mut stores = Stores::shared(store.clone());
        replace(&store, &mut stores);
        let telegram = Arc::new(FakeTelegram::default());
        let discord = Arc::new(FakeDiscord::default());
        let referrals = Arc::new(FakeReferrals::default());

        let upstreams = Upstreams {
            social: social.clone(),
            telegram: telegram.clone(),
            discord: discord.clone(),
            referrals: referrals.clone(),
        };
        let settings = settings();
        let clock = settings.clock.clone();
        let quests = QuestService::new(stores, upstreams, settings);

        Self {
            store,
            social,
            telegram,
            discord,
            referrals,
            clock,
            quests: Arc::new(quests),
        }
    }
}

fn settings() -> QuestSettings {
    QuestSettings {
        clock: PeriodClock::default(),
        commission_percent: 10,
        official_twitter_id: Some(OFFICIAL_TWITTER_ID.to_string()),
    }
}
