//! quest-gateway - social quest verification and crediting
//!
//! Users complete missions on Twitter, Discord, Telegram and the project
//! website. The gateway verifies each claim against the platform and credits
//! reward points into an append-only ledger, at most once per mission period.
//!
//! ## Layout
//!
//! - **db**: MongoDB collections plus an in-memory store for dev mode and tests
//! - **upstream**: UTools (Twitter), Telegram, Discord and Titan clients
//! - **services**: period math, per-kind predicates, the quest orchestrator
//! - **routes** / **server**: the HTTP/JSON API

pub mod auth;
pub mod config;
pub mod db;
pub mod logging;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;
pub mod upstream;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{QuestError, Result};
