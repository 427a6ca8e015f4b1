//! Token validation against the provider's introspection endpoint, and
//! scope/permission checks that synthesize a consent URL when the user has
//! to re-grant.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

use crate::helpers::time::expiry_from_unix;
use crate::observability::metrics::get_metrics;
use crate::provider::client::GraphClient;
use crate::provider::types::AuthorizationUrl;
use crate::store::record::normalize_scopes;

/// Result of one introspection call.
#[derive(Debug, Clone, Serialize)]
pub struct TokenValidation {
    pub is_valid: bool,
    pub app_id: String,
    pub application: String,
    pub user_id: Option<String>,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl TokenValidation {
    fn invalid(app_id: &str, message: String) -> Self {
        Self {
            is_valid: false,
            app_id: app_id.to_string(),
            application: String::new(),
            user_id: None,
            scopes: Vec::new(),
            expires_at: None,
            error_message: Some(message),
        }
    }

    pub fn status(&self) -> TokenStatus {
        if !self.is_valid {
            return TokenStatus::Invalid;
        }
        match self.expires_at {
            Some(at) if at <= Utc::now() => TokenStatus::Expired,
            _ => TokenStatus::Valid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Valid,
    Expired,
    Invalid,
}

/// Permission check result. Transient; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct PermissionCheck {
    pub has_permission: bool,
    pub missing_permissions: Vec<String>,
    pub token_status: TokenStatus,
    pub authorization_url: Option<String>,
    pub message: String,
}

impl PermissionCheck {
    pub fn success() -> Self {
        Self {
            has_permission: true,
            missing_permissions: Vec::new(),
            token_status: TokenStatus::Valid,
            authorization_url: None,
            message: "Token has all required permissions".to_string(),
        }
    }

    pub fn missing(missing: Vec<String>, authorization_url: Option<String>) -> Self {
        let message = format!("Token is missing required permissions: {}", missing.join(", "));
        Self {
            has_permission: false,
            missing_permissions: missing,
            token_status: TokenStatus::Valid,
            authorization_url,
            message,
        }
    }

    pub fn invalid(reason: String) -> Self {
        Self {
            has_permission: false,
            missing_permissions: Vec::new(),
            token_status: TokenStatus::Invalid,
            authorization_url: None,
            message: reason,
        }
    }

    pub fn expired(authorization_url: Option<String>) -> Self {
        Self {
            has_permission: false,
            missing_permissions: Vec::new(),
            token_status: TokenStatus::Expired,
            authorization_url,
            message: "Token has expired".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct TokenValidator {
    client: Arc<GraphClient>,
}

impl TokenValidator {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }

    /// One introspection call. Network errors are folded into an invalid
    /// result with `error_message`; retrying is left to the caller.
    pub async fn validate(&self, token: &str) -> TokenValidation {
        let metrics = get_metrics().await;
        metrics.validation_requests.inc();

        let app_id = self.client.config().app_id.clone();
        match self.client.debug_token(token).await {
            Ok(data) => {
                let expires_at = data.expiry_unix().and_then(expiry_from_unix);
                TokenValidation {
                    is_valid: data.is_valid,
                    app_id: data.app_id.unwrap_or(app_id),
                    application: data.application.unwrap_or_default(),
                    user_id: data.user_id,
                    scopes: normalize_scopes(data.scopes),
                    expires_at,
                    error_message: None,
                }
            }
            Err(err) => {
                let reason = if err.is_network { "network" } else { "provider" };
                metrics.validation_failures.with_label_values(&[reason]).inc();
                error!("token validation failed: {err}");
                TokenValidation::invalid(&app_id, err.to_string())
            }
        }
    }

    /// Compare required scopes against the validated ones; on any missing
    /// scope, synthesize a consent URL that re-requests the union so the
    /// user keeps existing grants.
    pub async fn check_permissions(&self, token: &str, required: &[String]) -> PermissionCheck {
        let required = normalize_scopes(required.to_vec());
        let validation = self.validate(token).await;

        match validation.status() {
            TokenStatus::Invalid => {
                warn!("permission check against invalid token");
                PermissionCheck::invalid(
                    validation
                        .error_message
                        .unwrap_or_else(|| "Token is invalid".to_string()),
                )
            }
            TokenStatus::Expired => {
                let url = self.consent_url_for(&validation.scopes, &required).url;
                PermissionCheck::expired(Some(url))
            }
            TokenStatus::Valid => {
                let missing: Vec<String> = required
                    .iter()
                    .filter(|scope| !validation.scopes.contains(scope))
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    PermissionCheck::success()
                } else {
                    let url = self.consent_url_for(&validation.scopes, &required).url;
                    PermissionCheck::missing(missing, Some(url))
                }
            }
        }
    }

    /// Consent URL for the given scopes; falls back to the configured
    /// default scope set.
    pub fn authorization_url(&self, scopes: Option<&[String]>, state: Option<String>) -> AuthorizationUrl {
        let scopes = match scopes {
            Some(scopes) if !scopes.is_empty() => scopes.to_vec(),
            _ => self.client.config().default_scopes.clone(),
        };
        self.client.authorization_url(&normalize_scopes(scopes), state)
    }

    /// Consent URL that adds scopes to an existing grant: the token's
    /// current scopes plus the requested extras.
    pub async fn extend_permissions(&self, token: &str, extra: &[String]) -> AuthorizationUrl {
        let validation = self.validate(token).await;
        self.consent_url_for(&validation.scopes, extra)
    }

    fn consent_url_for(&self, current: &[String], wanted: &[String]) -> AuthorizationUrl {
        let mut union = current.to_vec();
        union.extend(wanted.iter().cloned());
        self.client.authorization_url(&normalize_scopes(union), None)
    }
}
