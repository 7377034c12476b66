//! Quest API handlers
//!
//! Authentication happens in the router; handlers receive the user id.

use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::respond;
use crate::db::Page;
use crate::server::AppState;
use crate::types::{QuestError, Result};

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub mission_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct PostLinkRequest {
    #[serde(default)]
    pub mission_id: i64,
    #[serde(default)]
    pub link: String,
}

/// Body of referral bind and visit callback
#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    #[serde(default)]
    pub code: String,
}

/// `?page=&size=` of the listing endpoints
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub size: Option<u64>,
}

impl From<PageQuery> for Page {
    fn from(q: PageQuery) -> Self {
        Page::new(q.page, q.size)
    }
}

#[derive(Debug, Serialize)]
pub struct VisitStatusResponse {
    pub visited: bool,
}

fn parse_query<T: DeserializeOwned>(query: Option<&str>) -> Result<T> {
    serde_urlencoded::from_str(query.unwrap_or_default())
        .map_err(|e| QuestError::BadRequest(format!("invalid query: {}", e)))
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    if body.is_empty() {
        return Err(QuestError::BadRequest("request body is required".into()));
    }
    Ok(serde_json::from_slice(body)?)
}

/// GET /api/v1/missions
pub async fn handle_list_missions(state: Arc<AppState>) -> Response<Full<Bytes>> {
    respond(state.quests.list_missions().await)
}

/// GET /api/v1/missions/check?mission_id=
pub async fn handle_check_mission(
    state: Arc<AppState>,
    user: &str,
    query: Option<&str>,
) -> Response<Full<Bytes>> {
    let result = async {
        let params: CheckQuery = parse_query(query)?;
        state.quests.check_mission(user, params.mission_id).await
    }
    .await;
    respond(result)
}

/// POST /api/v1/missions/post-link
pub async fn handle_submit_post_link(
    state: Arc<AppState>,
    user: &str,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let result = async {
        let req: PostLinkRequest = parse_body(&body)?;
        state
            .quests
            .submit_post_link(user, req.mission_id, &req.link)
            .await
    }
    .await;
    respond(result)
}

/// GET /api/v1/credits
pub async fn handle_credits(state: Arc<AppState>, user: &str) -> Response<Full<Bytes>> {
    respond(state.quests.credit_summary(user).await)
}

/// POST /api/v1/referral/bind
pub async fn handle_bind_referral(
    state: Arc<AppState>,
    user: &str,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let result = async {
        let req: CodeRequest = parse_body(&body)?;
        state.quests.bind_referral_code(user, &req.code).await
    }
    .await;
    respond(result)
}

/// GET /api/v1/missions/logs?page=&size=
pub async fn handle_mission_logs(
    state: Arc<AppState>,
    user: &str,
    query: Option<&str>,
) -> Response<Full<Bytes>> {
    let result = async {
        let page: PageQuery = parse_query(query)?;
        state.quests.mission_logs(user, page.into()).await
    }
    .await;
    respond(result)
}

/// GET /api/v1/invites/logs?page=&size=
pub async fn handle_invite_logs(
    state: Arc<AppState>,
    user: &str,
    query: Option<&str>,
) -> Response<Full<Bytes>> {
    let result = async {
        let page: PageQuery = parse_query(query)?;
        state.quests.invite_logs(user, page.into()).await
    }
    .await;
    respond(result)
}

/// GET /api/v1/credits/leaderboard?page=&size=
pub async fn handle_leaderboard(state: Arc<AppState>, query: Option<&str>) -> Response<Full<Bytes>> {
    let result = async {
        let page: PageQuery = parse_query(query)?;
        state.quests.leaderboard(page.into()).await
    }
    .await;
    respond(result)
}

/// GET /api/v1/visit/start
pub fn handle_visit_start(state: Arc<AppState>, user: &str) -> Response<Full<Bytes>> {
    respond(state.visits.start(user))
}

/// POST /api/v1/visit/callback
pub async fn handle_visit_callback(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    let result = async {
        let req: CodeRequest = parse_body(&body)?;
        state.visits.complete(&req.code).await
    }
    .await;
    respond(result)
}

/// GET /api/v1/visit/status
pub async fn handle_visit_status(state: Arc<AppState>, user: &str) -> Response<Full<Bytes>> {
    respond(
        state
            .visits
            .status(user)
            .await
            .map(|visited| VisitStatusResponse { visited }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_query_requires_numeric_id() {
        let params: CheckQuery = parse_query(Some("mission_id=42")).unwrap();
        assert_eq!(params.mission_id, 42);

        assert!(matches!(
            parse_query::<CheckQuery>(Some("mission_id=abc")),
            Err(QuestError::BadRequest(_))
        ));
        assert!(matches!(
            parse_query::<CheckQuery>(None),
            Err(QuestError::BadRequest(_))
        ));
    }

    #[test]
    fn test_page_query_defaults() {
        let page: Page = parse_query::<PageQuery>(None).unwrap().into();
        assert_eq!(page, Page::default());

        let page: Page = parse_query::<PageQuery>(Some("page=3&size=500")).unwrap().into();
        assert_eq!(page.number, 3);
        assert_eq!(page.size, Page::MAX_SIZE);
        assert_eq!(page.skip(), 200);

        assert!(parse_query::<PageQuery>(Some("page=-1")).is_err());
    }

    #[test]
    fn test_empty_body_is_bad_request() {
        assert!(matches!(
            parse_body::<CodeRequest>(&Bytes::new()),
            Err(QuestError::BadRequest(_))
        ));
        let req: CodeRequest = parse_body(&Bytes::from_static(b"{\"code\":\"K1\"}")).unwrap();
        assert_eq!(req.code, "K1");
    }
}
