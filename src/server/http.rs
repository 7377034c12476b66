//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one task per connection.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::AUTHORIZATION;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::JwtValidator;
use crate::config::Args;
use crate::db::MongoClient;
use crate::routes;
use crate::services::{QuestService, VisitService};
use crate::types::{QuestError, Result};

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// None when running on the in-memory store
    pub mongo: Option<MongoClient>,
    pub quests: Arc<QuestService>,
    pub visits: Arc<VisitService>,
    pub jwt: JwtValidator,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        args: Args,
        mongo: Option<MongoClient>,
        quests: Arc<QuestService>,
        visits: Arc<VisitService>,
        jwt: JwtValidator,
    ) -> Self {
        Self {
            args,
            mongo,
            quests,
            visits,
            jwt,
            started_at: Instant::now(),
        }
    }
}

pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("quest-gateway listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled - in-memory store and dev JWT secret");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let (parts, body) = req.into_parts();
    info!("[{}] {} {}", addr, parts.method, parts.uri.path());

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Request body error from {}: {}", addr, e);
            return Ok(routes::error_response(QuestError::BadRequest(
                "Failed to read request body".into(),
            )));
        }
    };

    let auth = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    Ok(dispatch(
        state,
        &parts.method,
        parts.uri.path(),
        parts.uri.query(),
        auth,
        body,
    )
    .await)
}

/// Route one request
pub async fn dispatch(
    state: Arc<AppState>,
    method: &Method,
    path: &str,
    query: Option<&str>,
    auth: Option<&str>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let authenticate = || state.jwt.authenticate(auth);

    match (method, path) {
        (&Method::OPTIONS, _) => preflight_response(),

        (&Method::GET, "/health") | (&Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }

        (&Method::GET, "/version") => routes::version_info(),

        (&Method::GET, "/api/v1/missions") => routes::handle_list_missions(Arc::clone(&state)).await,

        (&Method::GET, "/api/v1/credits/leaderboard") => {
            routes::handle_leaderboard(Arc::clone(&state), query).await
        }

        (&Method::POST, "/api/v1/visit/callback") => {
            routes::handle_visit_callback(Arc::clone(&state), body).await
        }

        (&Method::GET, "/api/v1/missions/check")
        | (&Method::POST, "/api/v1/missions/post-link")
        | (&Method::GET, "/api/v1/credits")
        | (&Method::GET, "/api/v1/missions/logs")
        | (&Method::GET, "/api/v1/invites/logs")
        | (&Method::POST, "/api/v1/referral/bind")
        | (&Method::GET, "/api/v1/visit/start")
        | (&Method::GET, "/api/v1/visit/status") => {
            let user = match authenticate() {
                Ok(user) => user,
                Err(e) => {
                    debug!(path, error = %e, "Rejected unauthenticated request");
                    return routes::error_response(e);
                }
            };
            let state = Arc::clone(&state);

            match path {
                "/api/v1/missions/check" => routes::handle_check_mission(state, &user, query).await,
                "/api/v1/missions/post-link" => {
                    routes::handle_submit_post_link(state, &user, body).await
                }
                "/api/v1/credits" => routes::handle_credits(state, &user).await,
                "/api/v1/missions/logs" => routes::handle_mission_logs(state, &user, query).await,
                "/api/v1/invites/logs" => routes::handle_invite_logs(state, &user, query).await,
                "/api/v1/referral/bind" => routes::handle_bind_referral(state, &user, body).await,
                "/api/v1/visit/start" => routes::handle_visit_start(state, &user),
                _ => routes::handle_visit_status(state, &user).await,
            }
        }

        _ => not_found_response(path),
    }
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = routes::json_body(StatusCode::OK, String::new());
    let headers = response.headers_mut();
    headers.insert(
        "Access-Control-Allow-Headers",
        hyper::header::HeaderValue::from_static("*"),
    );
    headers.insert(
        "Access-Control-Allow-Methods",
        hyper::header::HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    response
}

fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    routes::error_response(QuestError::NotFound(format!("route {}", path)))
}
