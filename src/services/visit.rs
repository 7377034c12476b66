//! Website visit flow
//!
//! `start` hands the client a sealed `"{user}:{unix_secs}"` code and the
//! website URI. The website posts the code back once the visitor has stayed;
//! the mission is granted when enough time has passed since the code was
//! issued.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit, Nonce};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::schemas::{LedgerEntry, MissionKind};
use crate::services::quests::QuestService;
use crate::types::{QuestError, Result};

const NONCE_SIZE: usize = 12;

/// Seals and opens visit codes
#[derive(Clone)]
pub struct VisitTokens {
    key: [u8; 32],
}

impl VisitTokens {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Code for `user` issued at `at`
    pub fn seal(&self, user: &str, at: DateTime<Utc>) -> Result<String> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));

        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let plaintext = format!("{}:{}", user, at.timestamp());
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| QuestError::InternalServer(format!("Visit code sealing failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// User and issue time of a code
    pub fn open(&self, code: &str) -> Result<(String, DateTime<Utc>)> {
        let malformed = || QuestError::BadRequest("malformed visit code".to_string());

        let sealed = URL_SAFE_NO_PAD
            .decode(code.trim())
            .map_err(|_| malformed())?;
        if sealed.len() <= NONCE_SIZE {
            return Err(malformed());
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| malformed())?;
        let plaintext = String::from_utf8(plaintext).map_err(|_| malformed())?;

        let (user, secs) = plaintext.rsplit_once(':').ok_or_else(malformed)?;
        let secs: i64 = secs.parse().map_err(|_| malformed())?;
        if user.is_empty() || secs <= 0 {
            return Err(malformed());
        }
        let issued = Utc.timestamp_opt(secs, 0).single().ok_or_else(malformed)?;

        Ok((user.to_string(), issued))
    }
}

/// Response of `start`
#[derive(Debug, Clone, Serialize)]
pub struct VisitStart {
    pub code: String,
    pub uri: String,
}

/// Result of a callback
#[derive(Debug, Clone, Serialize)]
pub struct VisitOutcome {
    pub credited: bool,
    pub entries: Vec<LedgerEntry>,
}

pub struct VisitService {
    tokens: VisitTokens,
    quests: Arc<QuestService>,
    dwell: Duration,
    website_uri: String,
}

impl VisitService {
    pub fn new(
        tokens: VisitTokens,
        quests: Arc<QuestService>,
        dwell_seconds: i64,
        website_uri: impl Into<String>,
    ) -> Self {
        Self {
            tokens,
            quests,
            dwell: Duration::seconds(dwell_seconds),
            website_uri: website_uri.into(),
        }
    }

    pub fn start(&self, user: &str) -> Result<VisitStart> {
        self.start_at(user, Utc::now())
    }

    pub fn start_at(&self, user: &str, now: DateTime<Utc>) -> Result<VisitStart> {
        Ok(VisitStart {
            code: self.tokens.seal(user, now)?,
            uri: self.website_uri.clone(),
        })
    }

    pub async fn complete(&self, code: &str) -> Result<VisitOutcome> {
        self.complete_at(code, Utc::now()).await
    }

    /// Grant the visit mission once the code is old enough. A code that
    /// comes back too early is accepted without a grant.
    pub async fn complete_at(&self, code: &str, now: DateTime<Utc>) -> Result<VisitOutcome> {
        if code.trim().is_empty() {
            return Err(QuestError::BadRequest("code is required".to_string()));
        }
        let (user, issued) = self.tokens.open(code)?;

        if now - issued < self.dwell {
            debug!(user = %user, "Visit callback before dwell time");
            return Ok(VisitOutcome {
                credited: false,
                entries: Vec::new(),
            });
        }

        let mission = self
            .quests
            .mission_of_kind(MissionKind::VisitWebsite)
            .await?
            .ok_or_else(|| QuestError::NotFound("visit website mission".to_string()))?;

        let entries = self
            .quests
            .grant_direct_at(&user, mission.mission_id, &self.website_uri, now)
            .await?;
        info!(user = %user, mission_id = mission.mission_id, "Website visit credited");

        Ok(VisitOutcome {
            credited: !entries.is_empty(),
            entries,
        })
    }

    /// Whether the visit mission is credited for the current period
    pub async fn status(&self, user: &str) -> Result<bool> {
        self.status_at(user, Utc::now()).await
    }

    pub async fn status_at(&self, user: &str, now: DateTime<Utc>) -> Result<bool> {
        match self.quests.mission_of_kind(MissionKind::VisitWebsite).await? {
            Some(mission) => self.quests.is_credited(user, &mission, now).await,
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> VisitTokens {
        VisitTokens::new([7u8; 32])
    }

    #[test]
    fn test_seal_then_open() {
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap();
        let code = tokens().seal("user:with:colons", at).unwrap();

        let (user, issued) = tokens().open(&code).unwrap();
        assert_eq!(user, "user:with:colons");
        assert_eq!(issued, at);
    }

    #[test]
    fn test_codes_are_unique_per_seal() {
        let at = Utc::now();
        assert_ne!(tokens().seal("alice", at).unwrap(), tokens().seal("alice", at).unwrap());
    }

    #[test]
    fn test_tampered_or_foreign_code_is_bad_request() {
        let code = tokens().seal("alice", Utc::now()).unwrap();

        let foreign = VisitTokens::new([8u8; 32]);
        assert!(matches!(foreign.open(&code), Err(QuestError::BadRequest(_))));

        let mut bytes = URL_SAFE_NO_PAD.decode(&code).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let tampered = URL_SAFE_NO_PAD.encode(bytes);
        assert!(matches!(tokens().open(&tampered), Err(QuestError::BadRequest(_))));

        assert!(matches!(tokens().open("!!!"), Err(QuestError::BadRequest(_))));
        assert!(matches!(tokens().open("AAAA"), Err(QuestError::BadRequest(_))));
    }
}
