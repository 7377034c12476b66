//! Community predicates: Telegram/Discord membership, Discord channel access
//! and weekly Discord invites

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{CheckContext, Grant, Predicate, PredicateError};
use crate::db::schemas::{invite_counter_key, Platform, SubMission, DISCORD_MEMBERS_KEY};
use crate::upstream::discord::PERMISSION_VIEW_CHANNEL;

/// Telegram statuses of users who are not in the chat
const NOT_A_MEMBER: [&str; 2] = ["left", "kicked"];

/// Join the Telegram group named by `target_id`
pub struct TelegramGroup;

#[async_trait]
impl Predicate for TelegramGroup {
    async fn verify(&self, ctx: &CheckContext<'_>) -> Result<Vec<Grant>, PredicateError> {
        let telegram_id = ctx.sources.linked_id(Platform::Telegram, ctx.user).await?;

        let status = ctx
            .sources
            .telegram
            .chat_member_status(&ctx.mission.target_id, &telegram_id)
            .await?;

        if NOT_A_MEMBER.contains(&status.as_str()) {
            return Err(PredicateError::Unmet(format!("chat member status is {}", status)));
        }

        Ok(vec![Grant::whole(ctx.mission, telegram_id)])
    }
}

/// Join the Discord server (membership set maintained by the bot)
pub struct DiscordGuild;

#[async_trait]
impl Predicate for DiscordGuild {
    async fn verify(&self, ctx: &CheckContext<'_>) -> Result<Vec<Grant>, PredicateError> {
        let discord_id = ctx.sources.linked_id(Platform::Discord, ctx.user).await?;

        if !ctx
            .sources
            .cache
            .is_member(DISCORD_MEMBERS_KEY, &discord_id)
            .await?
        {
            return Err(PredicateError::Unmet("not a member of the Discord server".into()));
        }

        Ok(vec![Grant::whole(ctx.mission, discord_id)])
    }
}

/// Gain access to the Discord channel named by `target_id`
pub struct DiscordChannel;

#[async_trait]
impl Predicate for DiscordChannel {
    async fn verify(&self, ctx: &CheckContext<'_>) -> Result<Vec<Grant>, PredicateError> {
        let discord_id = ctx.sources.linked_id(Platform::Discord, ctx.user).await?;

        let permissions = ctx
            .sources
            .discord
            .channel_permissions(&discord_id, &ctx.mission.target_id)
            .await?;

        if permissions & PERMISSION_VIEW_CHANNEL == 0 {
            return Err(PredicateError::Unmet("cannot view the channel".into()));
        }

        Ok(vec![Grant::whole(ctx.mission, discord_id)])
    }
}

/// First integer in a sub-mission title ("5", "invite 5 friends")
pub fn parse_threshold(title: &str) -> Option<i64> {
    let digits: String = title
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Invite friends to Discord this week; one grant per reached tier
pub struct InviteFriends;

#[async_trait]
impl Predicate for InviteFriends {
    async fn verify(&self, ctx: &CheckContext<'_>) -> Result<Vec<Grant>, PredicateError> {
        let discord_id = ctx.sources.linked_id(Platform::Discord, ctx.user).await?;

        let key = invite_counter_key(&discord_id, &ctx.period.week_start_label());
        let invited = ctx.sources.cache.counter(&key).await?.unwrap_or(0);
        debug!(invited, "Weekly invite counter");

        if invited <= 0 {
            return Err(PredicateError::Unmet("no friends invited this week".into()));
        }

        let mut tiers: Vec<(i64, &SubMission)> = ctx
            .sub_missions
            .iter()
            .filter_map(|sm| match parse_threshold(&sm.title) {
                Some(threshold) => Some((threshold, sm)),
                None => {
                    warn!(sub_mission_id = sm.id, title = %sm.title, "Sub-mission has no threshold");
                    None
                }
            })
            .collect();
        tiers.sort_by_key(|(threshold, _)| *threshold);

        let grants: Vec<Grant> = tiers
            .into_iter()
            .take_while(|(threshold, _)| invited >= *threshold)
            .map(|(_, sm)| Grant {
                sub_mission_id: sm.id,
                credit: sm.credit,
                content: discord_id.clone(),
            })
            .collect();

        if grants.is_empty() {
            return Err(PredicateError::Unmet(format!(
                "{} invited, no tier reached",
                invited
            )));
        }

        Ok(grants)
    }
}
