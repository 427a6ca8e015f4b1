//! Error taxonomy for the token subsystem.
//!
//! `AuthRequired` means the user must re-consent; `Provider` is an upstream
//! API failure; `Crypto` covers unreadable stored payloads; `Storage` is
//! file I/O or schema trouble. Transient provider errors surface to the
//! caller with enough detail to render an authorization URL.

use serde_json::json;
use thiserror::Error;

use crate::utils::constants::{TOKEN_EXPIRED_CODES, TOKEN_EXPIRED_KEYWORDS};

#[derive(Debug, Error)]
pub enum TokenKeeperError {
    #[error("{message}")]
    AuthRequired {
        message: String,
        authorization_url: Option<String>,
        missing_scopes: Vec<String>,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failure reported by the Graph-style provider, either as an API error
/// envelope or as a transport problem reaching it.
#[derive(Debug, Clone, Error)]
#[error("provider error (code {code:?}, status {http_status:?}): {message}")]
pub struct ProviderError {
    pub code: Option<i64>,
    pub http_status: Option<u16>,
    pub message: String,
    pub is_network: bool,
}

impl ProviderError {
    pub fn api(code: Option<i64>, http_status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            code,
            http_status,
            message: message.into(),
            is_network: false,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            code: None,
            http_status: None,
            message: message.into(),
            is_network: true,
        }
    }

    /// Classify whether this failure is recoverable by refreshing the token.
    /// Matches the provider's known expiry codes first, then falls back to
    /// message keywords.
    pub fn is_token_expired(&self) -> bool {
        if self.is_network {
            return false;
        }
        if let Some(code) = self.code {
            if TOKEN_EXPIRED_CODES.contains(&code) {
                return true;
            }
        }
        let message = self.message.to_lowercase();
        TOKEN_EXPIRED_KEYWORDS.iter().any(|kw| message.contains(kw))
    }
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("unrecognized token encoding marker")]
    UnknownFormat,

    #[error("invalid encryption key: {0}")]
    InvalidKey(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("token store io: {0}")]
    Io(#[from] std::io::Error),

    #[error("token store serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

/// JSON body every error response carries: `{success, message, error_code}`.
pub fn error_body(message: &str, error_code: &str) -> serde_json::Value {
    json!({
        "success": false,
        "message": message,
        "error_code": error_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_classification_by_code() {
        for code in TOKEN_EXPIRED_CODES {
            let err = ProviderError::api(Some(code), Some(401), "boom");
            assert!(err.is_token_expired(), "code {code} should classify as expired");
        }
        let err = ProviderError::api(Some(17), Some(400), "rate limited");
        assert!(!err.is_token_expired());
    }

    #[test]
    fn expiry_classification_by_message() {
        let err = ProviderError::api(None, Some(400), "Error validating access token: session expired");
        assert!(err.is_token_expired());

        let network = ProviderError::network("connection reset: token expired mid-flight");
        assert!(!network.is_token_expired(), "network failures are never refresh-recoverable");
    }
}
