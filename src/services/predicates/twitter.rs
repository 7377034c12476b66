//! Twitter predicates: follow, like, repost, quote and original post

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::{CheckContext, Grant, Predicate, PredicateError};
use crate::db::schemas::Platform;

/// Mentions a quote post needs
pub const MIN_QUOTE_MENTIONS: usize = 3;

/// Value of query parameter `name` in `raw`
pub fn query_param(raw: &str, name: &str) -> Option<String> {
    Url::parse(raw).ok().and_then(|url| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    })
}

/// Post id of a submitted `https://x.com/{user}/status/{id}` link
pub fn status_id_from_link(link: &str) -> Result<String, PredicateError> {
    let url = Url::parse(link.trim())
        .map_err(|e| PredicateError::Unmet(format!("submitted link is not a URL: {}", e)))?;

    let segments: Vec<&str> = url.path().split('/').collect();
    if segments.len() != 4 {
        return Err(PredicateError::Unmet(format!(
            "submitted link has unexpected path {}",
            url.path()
        )));
    }

    let id = segments[3].trim();
    if id.is_empty() {
        return Err(PredicateError::Unmet("submitted link has no post id".into()));
    }
    Ok(id.to_string())
}

/// Follow the mission's account
pub struct Follow;

#[async_trait]
impl Predicate for Follow {
    async fn verify(&self, ctx: &CheckContext<'_>) -> Result<Vec<Grant>, PredicateError> {
        let twitter_id = ctx.sources.linked_id(Platform::Twitter, ctx.user).await?;

        let target = if ctx.mission.target_id.is_empty() {
            ctx.sources
                .official_twitter_id
                .clone()
                .ok_or_else(|| PredicateError::Unmet("no account to follow configured".into()))?
        } else {
            ctx.mission.target_id.clone()
        };

        let followings = ctx.sources.social.followings(&twitter_id).await?;
        debug!(count = followings.len(), "Fetched followings");

        if !followings.iter().any(|id| *id == target) {
            return Err(PredicateError::Unmet(format!("{} does not follow {}", twitter_id, target)));
        }

        Ok(vec![Grant::whole(ctx.mission, twitter_id)])
    }
}

/// Like or repost the post named by the `tweet_id` parameter of `open_url`
pub enum Engagement {
    Like,
    Repost,
}

#[async_trait]
impl Predicate for Engagement {
    async fn verify(&self, ctx: &CheckContext<'_>) -> Result<Vec<Grant>, PredicateError> {
        let twitter_id = ctx.sources.linked_id(Platform::Twitter, ctx.user).await?;

        let tweet_id = query_param(&ctx.mission.open_url, "tweet_id")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PredicateError::Unmet("mission has no target post".into()))?;

        let accounts = match self {
            Self::Like => ctx.sources.social.favoriters(&tweet_id).await?,
            Self::Repost => ctx.sources.social.retweeters(&tweet_id).await?,
        };

        if !accounts.iter().any(|id| *id == twitter_id) {
            return Err(PredicateError::Unmet(format!(
                "{} has not engaged with {}",
                twitter_id, tweet_id
            )));
        }

        Ok(vec![Grant::whole(ctx.mission, ctx.mission.open_url.clone())])
    }
}

/// Quote the mission's post today, tagging friends
pub struct Quote;

#[async_trait]
impl Predicate for Quote {
    async fn verify(&self, ctx: &CheckContext<'_>) -> Result<Vec<Grant>, PredicateError> {
        let twitter_id = ctx.sources.linked_id(Platform::Twitter, ctx.user).await?;
        let post_id = submitted_post_id(ctx).await?;
        let post = ctx.sources.social.tweet_detail(&post_id).await?;

        if post.quoted_id.is_empty() || !ctx.mission.open_url.contains(&post.quoted_id) {
            return Err(PredicateError::Unmet(format!(
                "post {} does not quote the mission post",
                post_id
            )));
        }
        if post.author_id != twitter_id {
            return Err(PredicateError::Unmet(format!(
                "post author {} is not {}",
                post.author_id, twitter_id
            )));
        }
        if !ctx.period.within_day(post.created_at) {
            return Err(PredicateError::Unmet("post was created before today".into()));
        }
        if post.mention_count < MIN_QUOTE_MENTIONS {
            return Err(PredicateError::Unmet(format!(
                "post mentions {} users, needs {}",
                post.mention_count, MIN_QUOTE_MENTIONS
            )));
        }

        Ok(vec![Grant::whole(ctx.mission, twitter_id)])
    }
}

/// Publish the mission's suggested text today
pub struct OriginalPost;

#[async_trait]
impl Predicate for OriginalPost {
    async fn verify(&self, ctx: &CheckContext<'_>) -> Result<Vec<Grant>, PredicateError> {
        let twitter_id = ctx.sources.linked_id(Platform::Twitter, ctx.user).await?;
        let suggested = query_param(&ctx.mission.open_url, "text").unwrap_or_default();
        let post_id = submitted_post_id(ctx).await?;
        let post = ctx.sources.social.tweet_detail(&post_id).await?;

        let first_line = post
            .full_text
            .split('\n')
            .next()
            .unwrap_or_default()
            .trim_end_matches('\r');
        if first_line.is_empty() || !suggested.contains(first_line) {
            return Err(PredicateError::Unmet(format!(
                "post {} does not use the suggested text",
                post_id
            )));
        }
        if !ctx.period.within_day(post.created_at) {
            return Err(PredicateError::Unmet("post was created before today".into()));
        }
        if post.author_id != twitter_id {
            return Err(PredicateError::Unmet(format!(
                "post author {} is not {}",
                post.author_id, twitter_id
            )));
        }

        Ok(vec![Grant::whole(ctx.mission, twitter_id)])
    }
}

/// Post id of the latest link submitted today
async fn submitted_post_id(ctx: &CheckContext<'_>) -> Result<String, PredicateError> {
    let link = ctx
        .sources
        .post_links
        .latest_link(ctx.user, ctx.mission.mission_id, ctx.period.day_start)
        .await?
        .ok_or_else(|| PredicateError::Unmet("no post link submitted today".into()))?;

    status_id_from_link(&link.link)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_decodes() {
        let url = "https://twitter.com/intent/tweet?text=Join%20the%20quest%0Anow&tweet_id=42";
        assert_eq!(query_param(url, "text").unwrap(), "Join the quest\nnow");
        assert_eq!(query_param(url, "tweet_id").unwrap(), "42");
        assert!(query_param(url, "missing").is_none());
        assert!(query_param("not a url", "text").is_none());
    }

    #[test]
    fn test_status_link_shape() {
        assert_eq!(
            status_id_from_link("https://x.com/alice/status/1789 ").unwrap(),
            "1789"
        );
        assert_eq!(
            status_id_from_link("https://x.com/alice/status/1789?s=20").unwrap(),
            "1789"
        );
        assert!(status_id_from_link("https://x.com/alice/status/1789/photo/1").is_err());
        assert!(status_id_from_link("https://x.com/alice").is_err());
        assert!(status_id_from_link("https://x.com/alice/status/").is_err());
    }
}
