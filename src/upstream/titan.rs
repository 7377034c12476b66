//! Titan API client (referral code directory)

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{read_body, ReferralDirectory, UpstreamError};

#[derive(Debug, Deserialize)]
struct KolCodeResponse {
    #[serde(default)]
    data: Option<KolCode>,
}

#[derive(Debug, Deserialize)]
struct KolCode {
    #[serde(default)]
    kol_user_id: String,
}

pub struct TitanClient {
    http: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
}

impl TitanClient {
    pub fn new(http: reqwest::Client, base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            api_key,
        }
    }
}

#[async_trait]
impl ReferralDirectory for TitanClient {
    async fn code_owner(&self, code: &str) -> Result<Option<String>, UpstreamError> {
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| UpstreamError::NotConfigured("TITAN_API_URL".into()))?;

        debug!("Titan referral code lookup");
        let mut req = self
            .http
            .get(format!("{}/v1/kol/code", base))
            .query(&[("code", code)]);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let body = read_body(req.send().await?).await?;
        let parsed: KolCodeResponse = serde_json::from_slice(&body)?;

        Ok(parsed
            .data
            .map(|d| d.kol_user_id)
            .filter(|id| !id.is_empty()))
    }
}
