//! Error types for quest-gateway
//!
//! Every failure surfaced to an HTTP caller goes through `QuestError`, which
//! carries both an HTTP status and a stable machine-readable code.

use hyper::StatusCode;

/// Main error type for quest operations
#[derive(Debug, thiserror::Error)]
pub enum QuestError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// The mission condition is not (yet) met. Upstream failures are folded
    /// into this variant on purpose; the detail only goes to the logs.
    #[error("Mission uncompleted")]
    Uncompleted,

    #[error("Internal server error: {0}")]
    InternalServer(String),

    #[error("Social media account is already in use")]
    AlreadyLinked,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Referral code already bound")]
    ReferralCodeBound,

    #[error("Invalid referral code")]
    InvalidReferralCode,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl QuestError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Uncompleted => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InternalServer(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::AlreadyLinked => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::ReferralCodeBound => StatusCode::CONFLICT,
            Self::InvalidReferralCode => StatusCode::BAD_REQUEST,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code for clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::NotImplemented(_) => "NOT_IMPLEMENTED",
            Self::Uncompleted => "MISSION_UNCOMPLETED",
            Self::InternalServer(_) => "INTERNAL_SERVER",
            Self::AlreadyLinked => "ACCOUNT_ALREADY_LINKED",
            Self::BadRequest(_) => "INVALID_PARAMS",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::ReferralCodeBound => "REFERRAL_CODE_BOUND",
            Self::InvalidReferralCode => "INVALID_REFERRAL_CODE",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Message safe to show to clients. Internal detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::InternalServer(_) | Self::Config(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = serde_json::json!({
            "error": self.public_message(),
            "code": self.code(),
        });
        (status, body.to_string())
    }
}

impl From<std::io::Error> for QuestError {
    fn from(err: std::io::Error) -> Self {
        Self::InternalServer(err.to_string())
    }
}

impl From<serde_json::Error> for QuestError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for QuestError {
    fn from(err: hyper::Error) -> Self {
        Self::InternalServer(format!("HTTP error: {}", err))
    }
}

impl From<mongodb::error::Error> for QuestError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::InternalServer(format!("Database error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for QuestError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthorized(format!("JWT error: {}", err))
    }
}

/// Result type alias for quest operations
pub type Result<T> = std::result::Result<T, QuestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncompleted_is_not_a_server_error() {
        let err = QuestError::Uncompleted;
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "MISSION_UNCOMPLETED");
    }

    #[test]
    fn test_internal_detail_is_hidden() {
        let err = QuestError::InternalServer("mongo at 10.0.0.3 refused".into());
        let (status, body) = err.into_status_code_and_body();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.contains("10.0.0.3"));
        assert!(body.contains("INTERNAL_SERVER"));
    }
}
