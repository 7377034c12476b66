//! Shared types for quest-gateway

pub mod error;

pub use error::{QuestError, Result};
