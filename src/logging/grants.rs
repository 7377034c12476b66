//! Credit grant audit log
//!
//! Writes one JSONL line per newly inserted ledger entry and per invite
//! commission, for reconciliation outside the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::db::schemas::{InviteLog, LedgerEntry};

/// Grant event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
    /// Credit granted to the user who completed a mission
    Mission,
    /// Commission granted to the inviter of that user
    Commission,
}

/// One audit line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: GrantKind,
    /// User receiving the credit
    pub user: String,
    pub mission_id: i64,
    pub sub_mission_id: i64,
    pub credit: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_key: Option<String>,
    /// Invitee, for commission events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_user: Option<String>,
}

impl GrantEvent {
    pub fn from_entry(entry: &LedgerEntry) -> Self {
        Self {
            timestamp: entry.created_at,
            kind: GrantKind::Mission,
            user: entry.user.clone(),
            mission_id: entry.mission_id,
            sub_mission_id: entry.sub_mission_id,
            credit: entry.credit,
            period_key: Some(entry.period_key.clone()),
            source_user: None,
        }
    }

    pub fn from_invite(log: &InviteLog) -> Self {
        Self {
            timestamp: log.created_at,
            kind: GrantKind::Commission,
            user: log.inviter.clone(),
            mission_id: log.mission_id,
            sub_mission_id: log.sub_mission_id,
            credit: log.commission,
            period_key: None,
            source_user: Some(log.invitee.clone()),
        }
    }

    /// Convert to JSONL line
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Grant logger that appends events to a JSONL file
#[derive(Clone, Default)]
pub struct GrantLogger {
    inner: Arc<Mutex<Option<BufWriter<File>>>>,
}

impl GrantLogger {
    /// Logger that drops every event until `init_file` is called
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize file logging to the specified path
    pub async fn init_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        *self.inner.lock().await = Some(BufWriter::new(file));

        info!("Grant logging initialized to {}", path.display());
        Ok(())
    }

    /// Log a grant event
    pub async fn log(&self, event: GrantEvent) {
        let jsonl = match event.to_jsonl() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize grant event: {}", e);
                return;
            }
        };

        let mut inner = self.inner.lock().await;

        if let Some(ref mut writer) = *inner {
            if let Err(e) = writeln!(writer, "{}", jsonl) {
                error!("Failed to write grant event: {}", e);
            }
            if let Err(e) = writer.flush() {
                error!("Failed to flush grant log: {}", e);
            }
        }
    }
}
