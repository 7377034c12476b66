//! Verification orchestrator
//!
//! `QuestService` is the only writer of the completion ledger. A check looks
//! for entries in the current period first and only calls the mission's
//! predicate when they are missing. Grants are inserted against a unique
//! index, so concurrent checks for the same slot credit it once.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::db::schemas::{
    Cadence, Channel, IdentityLink, InviteLog, LedgerEntry, Mission, MissionKind, Platform,
    PostLink,
};
use crate::db::{
    CacheStore, CreditRank, IdentityLinks, InsertOutcome, Ledger, LedgerQuery, MissionCatalog,
    Page, Paged, PostLinks, UserDirectory,
};
use crate::logging::{GrantEvent, GrantLogger};
use crate::services::period::{PeriodClock, PeriodContext};
use crate::services::predicates::community::parse_threshold;
use crate::services::predicates::{predicate_for, CheckContext, Grant, PredicateError, Sources};
use crate::types::{QuestError, Result};
use crate::upstream::{DiscordApi, ReferralDirectory, SocialApi, TelegramApi};

/// Storage handles
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn MissionCatalog>,
    pub ledger: Arc<dyn Ledger>,
    pub users: Arc<dyn UserDirectory>,
    pub links: Arc<dyn IdentityLinks>,
    pub post_links: Arc<dyn PostLinks>,
    pub cache: Arc<dyn CacheStore>,
}

impl Stores {
    /// Use one store for every role
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: MissionCatalog
            + Ledger
            + UserDirectory
            + IdentityLinks
            + PostLinks
            + CacheStore
            + 'static,
    {
        Self {
            catalog: store.clone(),
            ledger: store.clone(),
            users: store.clone(),
            links: store.clone(),
            post_links: store.clone(),
            cache: store,
        }
    }
}

/// Upstream handles
#[derive(Clone)]
pub struct Upstreams {
    pub social: Arc<dyn SocialApi>,
    pub telegram: Arc<dyn TelegramApi>,
    pub discord: Arc<dyn DiscordApi>,
    pub referrals: Arc<dyn ReferralDirectory>,
}

/// Tunables
#[derive(Debug, Clone)]
pub struct QuestSettings {
    pub clock: PeriodClock,
    /// Share of each grant credited to the inviter, in percent
    pub commission_percent: i64,
    pub official_twitter_id: Option<String>,
}

impl Default for QuestSettings {
    fn default() -> Self {
        Self {
            clock: PeriodClock::default(),
            commission_percent: 10,
            official_twitter_id: None,
        }
    }
}

/// Items grouped the way clients render them
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Buckets<T> {
    pub basic_missions: Vec<T>,
    pub twitter_missions: Vec<T>,
    pub discord_missions: Vec<T>,
    pub telegram_missions: Vec<T>,
}

impl<T> Default for Buckets<T> {
    fn default() -> Self {
        Self {
            basic_missions: Vec::new(),
            twitter_missions: Vec::new(),
            discord_missions: Vec::new(),
            telegram_missions: Vec::new(),
        }
    }
}

impl<T> Buckets<T> {
    pub fn push(&mut self, channel: Channel, item: T) {
        match channel {
            Channel::Wallet | Channel::Titan => self.basic_missions.push(item),
            Channel::Twitter => self.twitter_missions.push(item),
            Channel::Discord => self.discord_missions.push(item),
            Channel::Telegram => self.telegram_missions.push(item),
        }
    }

    pub fn len(&self) -> usize {
        self.basic_missions.len()
            + self.twitter_missions.len()
            + self.discord_missions.len()
            + self.telegram_missions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Credits and current completions of one user
#[derive(Debug, Clone, Serialize)]
pub struct CreditSummary {
    pub user: String,
    pub credits: i64,
    pub invite_credits: i64,
    pub twitter_user_id: Option<String>,
    pub discord_user_id: Option<String>,
    pub telegram_user_id: Option<String>,
    pub missions: Buckets<LedgerEntry>,
}

/// Mission verification and crediting
pub struct QuestService {
    catalog: Arc<dyn MissionCatalog>,
    ledger: Arc<dyn Ledger>,
    users: Arc<dyn UserDirectory>,
    links: Arc<dyn IdentityLinks>,
    post_links: Arc<dyn PostLinks>,
    referrals: Arc<dyn ReferralDirectory>,
    sources: Sources,
    clock: PeriodClock,
    commission_percent: i64,
    grant_log: GrantLogger,
}

impl QuestService {
    pub fn new(stores: Stores, upstreams: Upstreams, settings: QuestSettings) -> Self {
        let sources = Sources {
            links: stores.links.clone(),
            users: stores.users.clone(),
            post_links: stores.post_links.clone(),
            cache: stores.cache.clone(),
            social: upstreams.social,
            telegram: upstreams.telegram,
            discord: upstreams.discord,
            official_twitter_id: settings.official_twitter_id,
        };

        Self {
            catalog: stores.catalog,
            ledger: stores.ledger,
            users: stores.users,
            links: stores.links,
            post_links: stores.post_links,
            referrals: upstreams.referrals,
            sources,
            clock: settings.clock,
            commission_percent: settings.commission_percent,
            grant_log: GrantLogger::new(),
        }
    }

    /// Mirror every grant into `logger`
    pub fn with_grant_logger(mut self, logger: GrantLogger) -> Self {
        self.grant_log = logger;
        self
    }

    /// Verify a mission for `user` and credit it if it was completed.
    ///
    /// Returns the ledger entries for the current period.
    pub async fn check_mission(&self, user: &str, mission_id: i64) -> Result<Vec<LedgerEntry>> {
        self.check_mission_at(user, mission_id, Utc::now()).await
    }

    /// `check_mission` at a fixed instant
    pub async fn check_mission_at(
        &self,
        user: &str,
        mission_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>> {
        let mission = self.require_mission(mission_id).await?;
        let period = self.clock.context(now);
        let query = ledger_query(user, &mission, &period);

        let sub_missions = if mission.kind == MissionKind::InviteFriends {
            self.catalog.sub_missions(mission_id).await?
        } else {
            Vec::new()
        };
        // Tiers without a threshold can never be granted
        let expected = sub_missions
            .iter()
            .filter(|sm| parse_threshold(&sm.title).is_some())
            .count()
            .max(1);

        let existing = self.ledger.query_entries(&query).await?;
        if existing.len() >= expected {
            debug!(user, mission_id, "Mission already credited this period");
            return Ok(existing);
        }

        let predicate = predicate_for(&mission).ok_or_else(|| {
            QuestError::NotImplemented(format!("mission {} has no generic check", mission_id))
        })?;

        let ctx = CheckContext {
            user,
            mission: &mission,
            sub_missions: &sub_missions,
            period: &period,
            sources: &self.sources,
        };

        let grants = predicate
            .verify(&ctx)
            .await
            .map_err(|e| fold_predicate_error(e, user, mission_id))?;

        self.record_grants(user, &mission, &query, grants, now)
            .await?;

        let entries = self.ledger.query_entries(&query).await?;
        if entries.is_empty() {
            return Err(QuestError::Uncompleted);
        }
        Ok(entries)
    }

    /// Credit a mission whose completion was proven outside a predicate
    pub async fn grant_direct(
        &self,
        user: &str,
        mission_id: i64,
        evidence: &str,
    ) -> Result<Vec<LedgerEntry>> {
        self.grant_direct_at(user, mission_id, evidence, Utc::now())
            .await
    }

    /// `grant_direct` at a fixed instant
    pub async fn grant_direct_at(
        &self,
        user: &str,
        mission_id: i64,
        evidence: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>> {
        let mission = self.require_mission(mission_id).await?;
        let period = self.clock.context(now);
        let query = ledger_query(user, &mission, &period);

        let grant = Grant::whole(&mission, evidence);
        self.record_grants(user, &mission, &query, vec![grant], now)
            .await?;

        self.ledger.query_entries(&query).await
    }

    /// First catalog mission of `kind`
    pub async fn mission_of_kind(&self, kind: MissionKind) -> Result<Option<Mission>> {
        Ok(self
            .catalog
            .list_missions()
            .await?
            .into_iter()
            .find(|m| m.kind == kind))
    }

    /// Whether `mission` has an entry for `user` in the period containing `now`
    pub async fn is_credited(
        &self,
        user: &str,
        mission: &Mission,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let period = self.clock.context(now);
        let entries = self
            .ledger
            .query_entries(&ledger_query(user, mission, &period))
            .await?;
        Ok(!entries.is_empty())
    }

    /// Catalog grouped by channel
    pub async fn list_missions(&self) -> Result<Buckets<Mission>> {
        let mut buckets = Buckets::default();
        for mission in self.catalog.list_missions().await? {
            buckets.push(mission.channel, mission);
        }
        Ok(buckets)
    }

    /// Totals, linked accounts and completions that count right now
    pub async fn credit_summary(&self, user: &str) -> Result<CreditSummary> {
        self.credit_summary_at(user, Utc::now()).await
    }

    /// `credit_summary` at a fixed instant
    pub async fn credit_summary_at(&self, user: &str, now: DateTime<Utc>) -> Result<CreditSummary> {
        let period = self.clock.context(now);
        let current_keys: HashSet<String> = [
            period.key(Cadence::OneTime),
            period.key(Cadence::Daily),
            period.key(Cadence::Weekly),
        ]
        .into_iter()
        .collect();

        let mut missions: HashMap<i64, Option<Mission>> = HashMap::new();
        let mut buckets = Buckets::default();

        for entry in self.ledger.entries_for_user(user).await? {
            if !current_keys.contains(&entry.period_key) {
                continue;
            }

            if !missions.contains_key(&entry.mission_id) {
                let mission = self.catalog.get_mission(entry.mission_id).await?;
                missions.insert(entry.mission_id, mission);
            }
            let Some(Some(mission)) = missions.get(&entry.mission_id) else {
                continue;
            };

            // A re-targeted like/repost mission only shows the current target
            if mission.kind.is_target_scoped() && entry.scope != mission.open_url {
                continue;
            }

            buckets.push(mission.channel, entry);
        }

        let (credits, invite_credits, twitter_user_id, discord_user_id, telegram_user_id) =
            futures::try_join!(
                self.ledger.sum_credits(user),
                self.ledger.sum_invite_credits(user),
                self.linked(Platform::Twitter, user),
                self.linked(Platform::Discord, user),
                self.linked(Platform::Telegram, user),
            )?;

        Ok(CreditSummary {
            user: user.to_string(),
            credits,
            invite_credits,
            twitter_user_id,
            discord_user_id,
            telegram_user_id,
            missions: buckets,
        })
    }

    /// Grant history of `user`, newest first
    pub async fn mission_logs(&self, user: &str, page: Page) -> Result<Paged<LedgerEntry>> {
        self.ledger.mission_logs(user, page).await
    }

    /// Commission earned by `user` from invited users, newest first
    pub async fn invite_logs(&self, user: &str, page: Page) -> Result<Paged<InviteLog>> {
        self.ledger.invite_logs(user, page).await
    }

    /// Public leaderboard; user ids are masked
    pub async fn leaderboard(&self, page: Page) -> Result<Paged<CreditRank>> {
        let mut board = self.ledger.credit_leaderboard(page).await?;
        for row in &mut board.list {
            row.user = mask_user(&row.user);
        }
        Ok(board)
    }

    /// Store a post link for a quote/original-post mission
    pub async fn submit_post_link(&self, user: &str, mission_id: i64, link: &str) -> Result<()> {
        let link = link.trim();
        if link.is_empty() || mission_id == 0 {
            return Err(QuestError::BadRequest(
                "link and mission_id are required".to_string(),
            ));
        }
        self.require_mission(mission_id).await?;

        self.post_links
            .submit_link(PostLink {
                user: user.to_string(),
                mission_id,
                link: link.to_string(),
                created_at: Utc::now(),
            })
            .await
    }

    /// Link an external account; used by the OAuth collaborators
    pub async fn link_identity(
        &self,
        user: &str,
        platform: Platform,
        external_id: &str,
    ) -> Result<IdentityLink> {
        let external_id = external_id.trim();
        if external_id.is_empty() {
            return Err(QuestError::BadRequest("external id is required".to_string()));
        }
        let link = self.links.link(platform, user, external_id).await?;
        info!(user, platform = platform.as_str(), "Linked external account");
        Ok(link)
    }

    /// Bind a referral code to `user` after validating it upstream
    pub async fn bind_referral_code(&self, user: &str, code: &str) -> Result<()> {
        let code = code.trim();
        if code.is_empty() {
            return Err(QuestError::BadRequest("code is required".to_string()));
        }

        let record = self.users.get_user(user).await?;
        if record.as_ref().and_then(|u| u.bound_code()).is_some() {
            return Err(QuestError::ReferralCodeBound);
        }

        let owner = match self.referrals.code_owner(code).await {
            Ok(Some(owner)) => owner,
            Ok(None) => return Err(QuestError::InvalidReferralCode),
            Err(e) => {
                warn!(user, error = %e, "Referral code lookup failed");
                return Err(QuestError::InvalidReferralCode);
            }
        };

        self.users.bind_referral_code(user, code, &owner).await?;
        info!(user, "Referral code bound");
        Ok(())
    }

    async fn require_mission(&self, mission_id: i64) -> Result<Mission> {
        self.catalog
            .get_mission(mission_id)
            .await?
            .ok_or_else(|| QuestError::NotFound(format!("mission {}", mission_id)))
    }

    async fn linked(&self, platform: Platform, user: &str) -> Result<Option<String>> {
        Ok(self
            .links
            .get_link(platform, user)
            .await?
            .map(|l| l.external_id))
    }

    /// Insert one entry per grant not yet recorded. Returns how many were new.
    async fn record_grants(
        &self,
        user: &str,
        mission: &Mission,
        query: &LedgerQuery,
        grants: Vec<Grant>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let recorded: HashSet<i64> = self
            .ledger
            .query_entries(query)
            .await?
            .into_iter()
            .map(|e| e.sub_mission_id)
            .collect();

        let mut inserted = 0;
        for grant in grants {
            if recorded.contains(&grant.sub_mission_id) {
                continue;
            }

            let entry = LedgerEntry {
                user: user.to_string(),
                mission_id: mission.mission_id,
                sub_mission_id: grant.sub_mission_id,
                period_key: query.period_key.clone(),
                scope: query.scope.clone(),
                cadence: mission.cadence,
                credit: grant.credit,
                content: grant.content,
                created_at: now,
            };

            match self.ledger.insert_entry(entry.clone()).await? {
                InsertOutcome::Inserted => {
                    inserted += 1;
                    info!(
                        user,
                        mission_id = entry.mission_id,
                        sub_mission_id = entry.sub_mission_id,
                        period = %entry.period_key,
                        credit = entry.credit,
                        "Mission credited"
                    );
                    self.grant_log.log(GrantEvent::from_entry(&entry)).await;
                    self.record_invite(&entry).await?;
                }
                InsertOutcome::Duplicate => {
                    debug!(user, mission_id = entry.mission_id, "Concurrent grant already recorded");
                }
            }
        }

        Ok(inserted)
    }

    /// Commission side record for a freshly credited, invited user
    async fn record_invite(&self, entry: &LedgerEntry) -> Result<()> {
        let inviter = self
            .users
            .get_user(&entry.user)
            .await?
            .and_then(|u| u.inviter)
            .filter(|i| !i.is_empty());

        let Some(inviter) = inviter else {
            return Ok(());
        };

        let log = InviteLog {
            inviter,
            invitee: entry.user.clone(),
            mission_id: entry.mission_id,
            sub_mission_id: entry.sub_mission_id,
            credit: entry.credit,
            commission: entry.credit * self.commission_percent / 100,
            created_at: entry.created_at,
        };

        self.ledger.record_invite(log.clone()).await?;
        self.grant_log.log(GrantEvent::from_invite(&log)).await;
        Ok(())
    }
}

/// Hide the middle of a user id: `bobsmith.near` becomes `bob****th.near`,
/// `0x1234abcd` becomes `0x1****bcd`
pub fn mask_user(user: &str) -> String {
    const MASK: &str = "****";

    fn head(s: &str, n: usize) -> String {
        s.chars().take(n).collect()
    }
    fn tail(s: &str, n: usize) -> String {
        let count = s.chars().count();
        s.chars().skip(count.saturating_sub(n)).collect()
    }

    match user.split_once('.') {
        Some((prefix, suffix)) => {
            let suffix = suffix.split('.').next().unwrap_or_default();
            if prefix.chars().count() > 5 {
                format!("{}{}{}.{}", head(prefix, 3), MASK, tail(prefix, 2), suffix)
            } else {
                format!("{}{}.{}", head(prefix, 3), MASK, suffix)
            }
        }
        None if user.chars().count() > 6 => format!("{}{}{}", head(user, 3), MASK, tail(user, 3)),
        None => format!("{}{}", head(user, 1), MASK),
    }
}

fn ledger_query(user: &str, mission: &Mission, period: &PeriodContext) -> LedgerQuery {
    LedgerQuery {
        user: user.to_string(),
        mission_id: mission.mission_id,
        period_key: period.key(mission.cadence),
        scope: mission.scope(),
    }
}

/// Store failures are server errors; everything else means "not completed"
fn fold_predicate_error(err: PredicateError, user: &str, mission_id: i64) -> QuestError {
    match err {
        PredicateError::Store(e) => {
            error!(user, mission_id, error = %e, "Store failure during mission check");
            QuestError::InternalServer(e.to_string())
        }
        other => {
            warn!(user, mission_id, error = %other, "Mission check failed");
            QuestError::Uncompleted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_user() {
        assert_eq!(mask_user("bobsmith.near"), "bob****th.near");
        assert_eq!(mask_user("alice.near"), "ali****.near");
        assert_eq!(mask_user("0x1234abcd"), "0x1****bcd");
        assert_eq!(mask_user("bob"), "b****");
        assert_eq!(mask_user(""), "****");
    }
}
