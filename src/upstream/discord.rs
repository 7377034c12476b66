//! Discord REST client and channel permission computation
//!
//! Permissions follow Discord's documented algorithm: guild owner and
//! ADMINISTRATOR get everything; otherwise start from @everyone plus member
//! roles, then apply channel overwrites for @everyone, roles, and finally
//! the member.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use super::{read_body, DiscordApi, UpstreamError};

pub const PERMISSION_ADMINISTRATOR: u64 = 1 << 3;
pub const PERMISSION_VIEW_CHANNEL: u64 = 1 << 10;
pub const PERMISSION_ALL: u64 = u64::MAX;

/// Overwrite target kinds
const OVERWRITE_ROLE: u8 = 0;
const OVERWRITE_MEMBER: u8 = 1;

/// Discord serializes permission bitsets as decimal strings
fn bitset<'de, D: Deserializer<'de>>(de: D) -> Result<u64, D::Error> {
    let raw = String::deserialize(de)?;
    raw.parse().map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub permission_overwrites: Vec<Overwrite>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Overwrite {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(deserialize_with = "bitset")]
    pub allow: u64,
    #[serde(deserialize_with = "bitset")]
    pub deny: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Guild {
    pub id: String,
    pub owner_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Role {
    pub id: String,
    #[serde(deserialize_with = "bitset")]
    pub permissions: u64,
}

/// Effective permissions of `user_id` in `channel`
pub fn compute_permissions(
    user_id: &str,
    guild: &Guild,
    member: &Member,
    roles: &[Role],
    channel: &Channel,
) -> u64 {
    if user_id == guild.owner_id {
        return PERMISSION_ALL;
    }

    let mut perms = roles
        .iter()
        .filter(|r| r.id == guild.id || member.roles.contains(&r.id))
        .fold(0u64, |acc, r| acc | r.permissions);

    if perms & PERMISSION_ADMINISTRATOR != 0 {
        return PERMISSION_ALL;
    }

    // @everyone overwrite has the guild id
    if let Some(ow) = channel
        .permission_overwrites
        .iter()
        .find(|o| o.kind == OVERWRITE_ROLE && o.id == guild.id)
    {
        perms &= !ow.deny;
        perms |= ow.allow;
    }

    let (allow, deny) = channel
        .permission_overwrites
        .iter()
        .filter(|o| o.kind == OVERWRITE_ROLE && member.roles.contains(&o.id))
        .fold((0u64, 0u64), |(a, d), o| (a | o.allow, d | o.deny));
    perms &= !deny;
    perms |= allow;

    if let Some(ow) = channel
        .permission_overwrites
        .iter()
        .find(|o| o.kind == OVERWRITE_MEMBER && o.id == user_id)
    {
        perms &= !ow.deny;
        perms |= ow.allow;
    }

    perms
}

/// Discord REST client authenticated as a bot
pub struct DiscordClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: Option<String>,
}

impl DiscordClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, bot_token: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bot_token,
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, UpstreamError> {
        let token = self
            .bot_token
            .as_deref()
            .ok_or_else(|| UpstreamError::NotConfigured("DISCORD_BOT_TOKEN".into()))?;

        debug!(path, "Discord request");
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", token))
            .send()
            .await?;

        let body = read_body(resp).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl DiscordApi for DiscordClient {
    async fn channel_permissions(
        &self,
        user_id: &str,
        channel_id: &str,
    ) -> Result<u64, UpstreamError> {
        let channel: Channel = self.get(&format!("/channels/{}", channel_id)).await?;
        let guild_id = channel
            .guild_id
            .clone()
            .ok_or_else(|| UpstreamError::Parse("channel is not in a guild".into()))?;

        let guild: Guild = self.get(&format!("/guilds/{}", guild_id)).await?;
        let member: Member = self
            .get(&format!("/guilds/{}/members/{}", guild_id, user_id))
            .await?;
        let roles: Vec<Role> = self.get(&format!("/guilds/{}/roles", guild_id)).await?;

        Ok(compute_permissions(user_id, &guild, &member, &roles, &channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: &str = "g1";

    fn guild() -> Guild {
        Guild {
            id: GUILD.into(),
            owner_id: "owner".into(),
        }
    }

    fn role(id: &str, permissions: u64) -> Role {
        Role {
            id: id.into(),
            permissions,
        }
    }

    fn overwrite(id: &str, kind: u8, allow: u64, deny: u64) -> Overwrite {
        Overwrite {
            id: id.into(),
            kind,
            allow,
            deny,
        }
    }

    fn channel(overwrites: Vec<Overwrite>) -> Channel {
        Channel {
            id: "c1".into(),
            guild_id: Some(GUILD.into()),
            permission_overwrites: overwrites,
        }
    }

    #[test]
    fn test_owner_gets_everything() {
        let member = Member { roles: vec![] };
        let ch = channel(vec![overwrite(GUILD, OVERWRITE_ROLE, 0, PERMISSION_VIEW_CHANNEL)]);
        let perms = compute_permissions("owner", &guild(), &member, &[role(GUILD, 0)], &ch);
        assert_eq!(perms, PERMISSION_ALL);
    }

    #[test]
    fn test_administrator_ignores_overwrites() {
        let member = Member {
            roles: vec!["admin".into()],
        };
        let roles = [role(GUILD, 0), role("admin", PERMISSION_ADMINISTRATOR)];
        let ch = channel(vec![overwrite("u1", OVERWRITE_MEMBER, 0, PERMISSION_VIEW_CHANNEL)]);
        let perms = compute_permissions("u1", &guild(), &member, &roles, &ch);
        assert_ne!(perms & PERMISSION_VIEW_CHANNEL, 0);
    }

    #[test]
    fn test_private_channel_opened_by_role_overwrite() {
        let member = Member {
            roles: vec!["volunteer".into()],
        };
        let roles = [role(GUILD, PERMISSION_VIEW_CHANNEL), role("volunteer", 0)];
        let ch = channel(vec![
            overwrite(GUILD, OVERWRITE_ROLE, 0, PERMISSION_VIEW_CHANNEL),
            overwrite("volunteer", OVERWRITE_ROLE, PERMISSION_VIEW_CHANNEL, 0),
        ]);

        let perms = compute_permissions("u1", &guild(), &member, &roles, &ch);
        assert_ne!(perms & PERMISSION_VIEW_CHANNEL, 0);

        let outsider = Member { roles: vec![] };
        let perms = compute_permissions("u2", &guild(), &outsider, &roles, &ch);
        assert_eq!(perms & PERMISSION_VIEW_CHANNEL, 0);
    }

    #[test]
    fn test_member_overwrite_wins_over_roles() {
        let member = Member {
            roles: vec!["volunteer".into()],
        };
        let roles = [role(GUILD, 0), role("volunteer", PERMISSION_VIEW_CHANNEL)];
        let ch = channel(vec![overwrite("u1", OVERWRITE_MEMBER, 0, PERMISSION_VIEW_CHANNEL)]);
        let perms = compute_permissions("u1", &guild(), &member, &roles, &ch);
        assert_eq!(perms & PERMISSION_VIEW_CHANNEL, 0);
    }

    #[test]
    fn test_bitsets_decode_from_strings() {
        let role: Role = serde_json::from_value(serde_json::json!({
            "id": "r", "permissions": "1024"
        }))
        .unwrap();
        assert_eq!(role.permissions, PERMISSION_VIEW_CHANNEL);
    }
}
