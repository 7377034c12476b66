//! HTTP routes for quest-gateway
//!
//! Success bodies are `{"data": ...}`, failures `{"error": msg, "code": CODE}`.

pub mod health;
pub mod quest;

pub use health::{health_check, version_info};
pub use quest::{
    handle_bind_referral, handle_check_mission, handle_credits, handle_invite_logs,
    handle_leaderboard, handle_list_missions, handle_mission_logs, handle_submit_post_link,
    handle_visit_callback, handle_visit_start, handle_visit_status,
};

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::types::QuestError;

/// Raw JSON response
pub fn json_body(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

/// `{"data": ...}` with status 200
pub fn json_response<T: Serialize>(data: T) -> Response<Full<Bytes>> {
    match serde_json::to_string(&serde_json::json!({ "data": data })) {
        Ok(body) => json_body(StatusCode::OK, body),
        Err(e) => error_response(QuestError::InternalServer(format!(
            "Failed to serialize response: {}",
            e
        ))),
    }
}

pub fn error_response(err: QuestError) -> Response<Full<Bytes>> {
    if err.status_code().is_server_error() {
        error!(error = %err, "Request failed");
    }
    let (status, body) = err.into_status_code_and_body();
    json_body(status, body)
}

/// Response for a handler result
pub fn respond<T: Serialize>(result: Result<T, QuestError>) -> Response<Full<Bytes>> {
    match result {
        Ok(data) => json_response(data),
        Err(err) => error_response(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_success_envelope() {
        let response = json_response(serde_json::json!({ "ok": true }));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body_json(response).await["data"]["ok"], true);
    }

    #[tokio::test]
    async fn test_error_envelope() {
        let response = error_response(QuestError::Uncompleted);
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["code"], "MISSION_UNCOMPLETED");
        assert_eq!(body["error"], "Mission uncompleted");
    }
}
