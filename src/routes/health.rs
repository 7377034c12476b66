//! Liveness and build info
//!
//! `/health` answers 200 whenever the process can serve a request; it does
//! not check MongoDB or the upstream APIs.

use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use serde::Serialize;
use std::sync::Arc;

use super::json_response;
use crate::server::AppState;

const SERVICE: &str = "quest-gateway";

/// Build stamp written by build.rs
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub commit: &'static str,
    pub build_time: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            service: SERVICE,
            version: env!("CARGO_PKG_VERSION"),
            commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
            build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Liveness {
    pub healthy: bool,
    #[serde(flatten)]
    pub build: BuildInfo,
    pub uptime_secs: u64,
    pub dev_mode: bool,
    /// "mongodb" or "memory"
    pub store: &'static str,
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

impl Liveness {
    pub fn of(state: &AppState) -> Self {
        Self {
            healthy: true,
            build: BuildInfo::current(),
            uptime_secs: state.started_at.elapsed().as_secs(),
            dev_mode: state.args.dev_mode,
            store: match state.mongo {
                Some(_) => "mongodb",
                None => "memory",
            },
            checked_at: chrono::Utc::now(),
        }
    }
}

pub fn health_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    json_response(Liveness::of(&state))
}

pub fn version_info() -> Response<Full<Bytes>> {
    json_response(BuildInfo::current())
}
