use serde::Deserialize;

/// `/debug_token` wraps everything in a `data` object.
#[derive(Debug, Clone, Deserialize)]
pub struct DebugTokenEnvelope {
    pub data: DebugTokenData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebugTokenData {
    #[serde(default)]
    pub is_valid: bool,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub application: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Unix seconds; `0` or absent means the grant does not expire.
    #[serde(default)]
    pub data_access_expires_at: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl DebugTokenData {
    /// The provider reports two expiry fields; data access expiry wins when
    /// both are present.
    pub fn expiry_unix(&self) -> Option<i64> {
        self.data_access_expires_at
            .filter(|ts| *ts > 0)
            .or(self.expires_at.filter(|ts| *ts > 0))
    }
}

/// `/oauth/access_token` response, shared by code exchange and the
/// long-lived exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Seconds from now; absent for tokens without a fixed lifetime.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Provider error envelope: `{"error": {"message", "code", "type"}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default, rename = "type")]
    pub error_type: Option<String>,
}

/// Consent URL plus the CSRF state baked into it.
#[derive(Debug, Clone)]
pub struct AuthorizationUrl {
    pub url: String,
    pub state: String,
}
