//! HTTP server for quest-gateway

pub mod http;

pub use http::{dispatch, run, AppState};
