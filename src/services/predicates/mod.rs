//! Verification predicates
//!
//! One handler per `MissionKind`, all behind the `Predicate` trait. Handlers
//! are read-only: they look at external systems and return the grants the
//! evidence justifies. Writing the ledger is the orchestrator's job.

use async_trait::async_trait;
use std::sync::Arc;

use crate::db::schemas::{Channel, Mission, MissionKind, Platform, SubMission};
use crate::db::{CacheStore, IdentityLinks, PostLinks, UserDirectory};
use crate::services::period::PeriodContext;
use crate::types::QuestError;
use crate::upstream::{DiscordApi, SocialApi, TelegramApi, UpstreamError};

pub mod community;
pub mod referral;
pub mod twitter;

/// Why a predicate did not produce evidence
#[derive(Debug, thiserror::Error)]
pub enum PredicateError {
    /// Upstream answered but refused (vendor error code, HTTP status)
    #[error("upstream rejected request: {0}")]
    Upstream(String),

    /// Upstream payload did not match the expected shape
    #[error("unexpected upstream payload: {0}")]
    Parse(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("no linked {0} account")]
    NotLinked(&'static str),

    /// Evidence was fetched and does not satisfy the mission
    #[error("condition not met: {0}")]
    Unmet(String),

    /// Local storage failed; never reported as "not completed"
    #[error("store failure: {0}")]
    Store(#[from] QuestError),
}

impl From<UpstreamError> for PredicateError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Transport(e) => Self::Transport(e.to_string()),
            UpstreamError::Parse(msg) => Self::Parse(msg),
            UpstreamError::Envelope { code, msg } => Self::Upstream(format!("{}: {}", code, msg)),
            UpstreamError::Status(status) => Self::Upstream(format!("HTTP {}", status)),
            UpstreamError::NotConfigured(what) => Self::Upstream(format!("{} not configured", what)),
        }
    }
}

/// One ledger entry the evidence justifies
#[derive(Debug, Clone, PartialEq)]
pub struct Grant {
    /// 0 when the mission has no sub-missions
    pub sub_mission_id: i64,
    pub credit: i64,
    /// Evidence recorded with the entry
    pub content: String,
}

impl Grant {
    /// Grant of the mission's own credit
    pub fn whole(mission: &Mission, content: impl Into<String>) -> Self {
        Self {
            sub_mission_id: 0,
            credit: mission.credit,
            content: content.into(),
        }
    }
}

/// Everything predicates may read
#[derive(Clone)]
pub struct Sources {
    pub links: Arc<dyn IdentityLinks>,
    pub users: Arc<dyn UserDirectory>,
    pub post_links: Arc<dyn PostLinks>,
    pub cache: Arc<dyn CacheStore>,
    pub social: Arc<dyn SocialApi>,
    pub telegram: Arc<dyn TelegramApi>,
    pub discord: Arc<dyn DiscordApi>,
    /// Follow target when a mission has no `target_id`
    pub official_twitter_id: Option<String>,
}

impl Sources {
    /// External id linked to `user` on `platform`
    pub async fn linked_id(&self, platform: Platform, user: &str) -> Result<String, PredicateError> {
        self.links
            .get_link(platform, user)
            .await?
            .map(|l| l.external_id)
            .ok_or(PredicateError::NotLinked(platform.as_str()))
    }
}

/// Inputs of one check
pub struct CheckContext<'a> {
    pub user: &'a str,
    pub mission: &'a Mission,
    pub sub_missions: &'a [SubMission],
    pub period: &'a PeriodContext,
    pub sources: &'a Sources,
}

#[async_trait]
pub trait Predicate: Send + Sync {
    /// Grants justified by current evidence; an error when there are none
    async fn verify(&self, ctx: &CheckContext<'_>) -> Result<Vec<Grant>, PredicateError>;
}

static FOLLOW: twitter::Follow = twitter::Follow;
static LIKE: twitter::Engagement = twitter::Engagement::Like;
static REPOST: twitter::Engagement = twitter::Engagement::Repost;
static QUOTE: twitter::Quote = twitter::Quote;
static ORIGINAL_POST: twitter::OriginalPost = twitter::OriginalPost;
static TELEGRAM_GROUP: community::TelegramGroup = community::TelegramGroup;
static DISCORD_GUILD: community::DiscordGuild = community::DiscordGuild;
static DISCORD_CHANNEL: community::DiscordChannel = community::DiscordChannel;
static INVITE_FRIENDS: community::InviteFriends = community::InviteFriends;
static REFERRAL_BIND: referral::ReferralBind = referral::ReferralBind;

/// Handler for a mission, `None` when its kind has no generic check
pub fn predicate_for(mission: &Mission) -> Option<&'static dyn Predicate> {
    match (mission.kind, mission.channel) {
        (MissionKind::Follow, _) => Some(&FOLLOW),
        (MissionKind::Like, _) => Some(&LIKE),
        (MissionKind::Repost, _) => Some(&REPOST),
        (MissionKind::Quote, _) => Some(&QUOTE),
        (MissionKind::OriginalPost, _) => Some(&ORIGINAL_POST),
        (MissionKind::JoinGroup, Channel::Telegram) => Some(&TELEGRAM_GROUP),
        (MissionKind::JoinGroup, Channel::Discord) => Some(&DISCORD_GUILD),
        (MissionKind::JoinGroup, _) => None,
        (MissionKind::JoinChannel, _) => Some(&DISCORD_CHANNEL),
        (MissionKind::InviteFriends, _) => Some(&INVITE_FRIENDS),
        (MissionKind::ReferralBind, _) => Some(&REFERRAL_BIND),
        (MissionKind::VisitWebsite, _)
        | (MissionKind::VisitReferrer, _)
        | (MissionKind::ConnectWallet, _)
        | (MissionKind::NotImplemented, _) => None,
    }
}
