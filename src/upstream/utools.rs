//! UTools Twitter API client
//!
//! Every endpoint answers with an envelope `{code, msg, data}`. `code == 1`
//! means success and `data` is itself a JSON document encoded as a string.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{read_body, CredentialPool, SocialApi, TweetDetail, UpstreamError};

const SUCCESS_CODE: i64 = 1;

/// Format of `legacy.created_at`, e.g. "Wed Oct 10 20:19:24 +0000 2018"
const TWITTER_TIME_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl Envelope {
    fn into_payload<T: DeserializeOwned>(self) -> Result<T, UpstreamError> {
        if self.code != SUCCESS_CODE {
            return Err(UpstreamError::Envelope {
                code: self.code,
                msg: self.msg,
            });
        }

        let raw = self
            .data
            .as_str()
            .ok_or_else(|| UpstreamError::Parse("envelope data is not a string".into()))?;

        Ok(serde_json::from_str(raw)?)
    }
}

// followingsIds

#[derive(Debug, Deserialize)]
struct FollowingIds {
    #[serde(default)]
    ids: Vec<i64>,
}

// favoritersV2 / retweetersV2

#[derive(Debug, Deserialize)]
struct UserTimelinePayload {
    data: UserTimelineData,
}

#[derive(Debug, Deserialize)]
struct UserTimelineData {
    #[serde(rename = "favoriters_timeline", alias = "retweeters_timeline")]
    timeline: TimelineWrapper,
}

#[derive(Debug, Deserialize)]
struct TimelineWrapper {
    timeline: Timeline,
}

#[derive(Debug, Deserialize)]
struct Timeline {
    #[serde(default)]
    instructions: Vec<Instruction>,
}

#[derive(Debug, Deserialize)]
struct Instruction {
    #[serde(default)]
    entries: Vec<TimelineEntry>,
}

#[derive(Debug, Deserialize)]
struct TimelineEntry {
    content: UserEntryContent,
}

#[derive(Debug, Deserialize)]
struct UserEntryContent {
    /// Absent on cursor entries
    #[serde(rename = "itemContent", default)]
    item_content: Option<UserItem>,
}

#[derive(Debug, Deserialize)]
struct UserItem {
    #[serde(default)]
    user_results: Option<ResultOf<RestId>>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ResultOf<T> {
    #[serde(default)]
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct RestId {
    rest_id: String,
}

impl UserTimelinePayload {
    fn user_ids(self) -> Vec<String> {
        self.data
            .timeline
            .timeline
            .instructions
            .into_iter()
            .next()
            .map(|first| {
                first
                    .entries
                    .into_iter()
                    .filter_map(|e| e.content.item_content)
                    .filter_map(|item| item.user_results)
                    .filter_map(|r| r.result)
                    .map(|r| r.rest_id)
                    .collect()
            })
            .unwrap_or_default()
    }
}

// tweetTimeline

#[derive(Debug, Deserialize)]
struct ConversationPayload {
    data: ConversationData,
}

#[derive(Debug, Deserialize)]
struct ConversationData {
    threaded_conversation_with_injections_v2: ConversationTimeline,
}

#[derive(Debug, Deserialize)]
struct ConversationTimeline {
    #[serde(default)]
    instructions: Vec<ConversationInstruction>,
}

#[derive(Debug, Deserialize)]
struct ConversationInstruction {
    #[serde(default)]
    entries: Vec<ConversationEntry>,
}

#[derive(Debug, Deserialize)]
struct ConversationEntry {
    content: TweetEntryContent,
}

#[derive(Debug, Deserialize)]
struct TweetEntryContent {
    #[serde(rename = "itemContent")]
    item_content: TweetItem,
}

#[derive(Debug, Deserialize)]
struct TweetItem {
    tweet_results: ResultOf<TweetResult>,
}

#[derive(Debug, Deserialize)]
struct TweetResult {
    core: TweetCore,
    #[serde(default)]
    quoted_status_result: Option<ResultOf<RestId>>,
    legacy: TweetLegacy,
}

#[derive(Debug, Deserialize)]
struct TweetCore {
    user_results: ResultOf<RestId>,
}

#[derive(Debug, Deserialize)]
struct TweetLegacy {
    created_at: String,
    #[serde(default)]
    full_text: String,
    #[serde(default)]
    entities: TweetEntities,
}

#[derive(Debug, Default, Deserialize)]
struct TweetEntities {
    #[serde(default)]
    user_mentions: Vec<serde_json::Value>,
}

impl ConversationPayload {
    fn into_detail(self) -> Result<TweetDetail, UpstreamError> {
        let tweet = self
            .data
            .threaded_conversation_with_injections_v2
            .instructions
            .into_iter()
            .next()
            .and_then(|i| i.entries.into_iter().next())
            .and_then(|e| e.content.item_content.tweet_results.result)
            .ok_or_else(|| UpstreamError::Parse("conversation has no tweet".into()))?;

        let author_id = tweet
            .core
            .user_results
            .result
            .map(|r| r.rest_id)
            .ok_or_else(|| UpstreamError::Parse("tweet has no author".into()))?;

        let quoted_id = tweet
            .quoted_status_result
            .and_then(|q| q.result)
            .map(|r| r.rest_id)
            .unwrap_or_default();

        let created_at = parse_twitter_time(&tweet.legacy.created_at)?;

        Ok(TweetDetail {
            author_id,
            quoted_id,
            created_at,
            full_text: tweet.legacy.full_text,
            mention_count: tweet.legacy.entities.user_mentions.len(),
        })
    }
}

/// Parse Twitter's `created_at` format
pub fn parse_twitter_time(raw: &str) -> Result<DateTime<Utc>, UpstreamError> {
    DateTime::parse_from_str(raw, TWITTER_TIME_FORMAT)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| UpstreamError::Parse(format!("bad created_at {:?}: {}", raw, e)))
}

/// UTools API client
pub struct UToolsClient {
    http: reqwest::Client,
    base_url: String,
    keys: CredentialPool,
}

impl UToolsClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, keys: CredentialPool) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            keys,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, UpstreamError> {
        let key = self.keys.next_key()?;
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(endpoint, "UTools request");

        let resp = self
            .http
            .get(&url)
            .query(&[("apiKey", key)])
            .query(params)
            .send()
            .await?;

        let body = read_body(resp).await?;
        let envelope: Envelope = serde_json::from_slice(&body)?;
        envelope.into_payload()
    }
}

#[async_trait]
impl SocialApi for UToolsClient {
    async fn followings(&self, user_id: &str) -> Result<Vec<String>, UpstreamError> {
        let page: FollowingIds = self.call("/followingsIds", &[("userId", user_id)]).await?;
        Ok(page.ids.into_iter().map(|id| id.to_string()).collect())
    }

    async fn favoriters(&self, tweet_id: &str) -> Result<Vec<String>, UpstreamError> {
        let payload: UserTimelinePayload =
            self.call("/favoritersV2", &[("tweetId", tweet_id)]).await?;
        Ok(payload.user_ids())
    }

    async fn retweeters(&self, tweet_id: &str) -> Result<Vec<String>, UpstreamError> {
        let payload: UserTimelinePayload =
            self.call("/retweetersV2", &[("tweetId", tweet_id)]).await?;
        Ok(payload.user_ids())
    }

    async fn tweet_detail(&self, tweet_id: &str) -> Result<TweetDetail, UpstreamError> {
        let payload: ConversationPayload =
            self.call("/tweetTimeline", &[("tweetId", tweet_id)]).await?;
        payload.into_detail()
    }
}
