//! Facade the API layer calls: cached token lookup with transparent
//! refresh, permission checks, on-demand and scheduled refresh, store
//! migration, and OAuth code exchange.

use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::refresher::{RefreshOutcome, TokenRefresher};
use crate::auth::validator::{PermissionCheck, TokenValidator};
use crate::errors::{ProviderError, StorageError, TokenKeeperError};
use crate::helpers::time::expiry_from_unix;
use crate::provider::client::GraphClient;
use crate::resilience::retry::RetryPolicy;
use crate::store::record::{TokenKind, TokenRecord};
use crate::store::token_store::{ReEncryptReport, TokenStore};

/// What the caller gets back from a token lookup.
#[derive(Debug, Clone)]
pub enum TokenAccess {
    Granted(TokenRecord),
    AuthRequired {
        message: String,
        authorization_url: String,
    },
}

#[derive(Clone)]
pub struct TokenService {
    client: Arc<GraphClient>,
    store: TokenStore,
    validator: TokenValidator,
    refresher: TokenRefresher,
    retry: RetryPolicy,
}

impl TokenService {
    pub fn new(
        client: Arc<GraphClient>,
        store: TokenStore,
        validator: TokenValidator,
        refresher: TokenRefresher,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            store,
            validator,
            refresher,
            retry,
        }
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Cached token lookup. A missing, unreadable or expired record triggers
    /// one refresh attempt; if that fails the caller gets a consent URL.
    pub async fn get_token(&self, kind: TokenKind, identity: &str) -> TokenAccess {
        let record = match self.store.get(kind, identity).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return self.auth_required(format!(
                    "No stored {} token for '{}'",
                    kind.as_str(),
                    identity
                ));
            }
            Err(err) => {
                warn!("stored token unreadable, requiring re-authorization: {err}");
                return self.auth_required(format!(
                    "Stored {} token for '{}' is unreadable, re-authorization required",
                    kind.as_str(),
                    identity
                ));
            }
        };

        if !record.is_expired() && record.is_valid {
            return TokenAccess::Granted(record);
        }

        info!(
            "stored {} token for '{}' is expired or flagged invalid, attempting refresh",
            kind.as_str(),
            identity
        );
        if self.refresher.refresh(&record.access_token).await.is_some() {
            if let Ok(Some(updated)) = self.store.get(kind, identity).await {
                if !updated.is_expired() {
                    return TokenAccess::Granted(updated);
                }
            }
        }

        self.auth_required(format!(
            "Token for '{}' has expired and could not be refreshed",
            identity
        ))
    }

    /// Scope check against the provider's view of the token.
    pub async fn ensure_permissions(&self, token: &str, required: &[String]) -> PermissionCheck {
        self.validator.check_permissions(token, required).await
    }

    /// On-demand refresh; `None` means re-authorization is required.
    pub async fn refresh_now(&self, token: &str) -> Option<String> {
        self.refresher.refresh(token).await
    }

    /// Run a provider call with transparent expired-token recovery: one
    /// refresh-and-retry per the configured policy.
    pub async fn call_with_refresh<F, Fut, T>(&self, token: &str, operation: F) -> Result<T, ProviderError>
    where
        F: FnMut(String) -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        self.retry
            .call_with_refresh(&self.refresher, token, operation)
            .await
    }

    /// Sweep every stored record expiring inside the horizon.
    pub async fn scheduled_refresh(&self, within_hours: u64) -> Vec<RefreshOutcome> {
        self.refresher.refresh_expiring(within_hours).await
    }

    /// Migrate fallback-encoded records to the strong scheme.
    pub async fn re_encrypt(&self, force: bool) -> Result<ReEncryptReport, StorageError> {
        self.store.re_encrypt_all(force).await
    }

    /// Complete the OAuth flow: exchange the authorization code, validate
    /// the token it yields and persist the record.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenRecord, TokenKeeperError> {
        let exchanged = self.client.exchange_code(code).await?;
        let validation = self.validator.validate(&exchanged.access_token).await;
        if !validation.is_valid {
            return Err(TokenKeeperError::AuthRequired {
                message: format!(
                    "Invalid token received: {}",
                    validation.error_message.as_deref().unwrap_or("unknown")
                ),
                authorization_url: Some(self.validator.authorization_url(None, None).url),
                missing_scopes: Vec::new(),
            });
        }

        let identity = validation.user_id.clone().ok_or_else(|| TokenKeeperError::AuthRequired {
            message: "Could not determine user for exchanged token".to_string(),
            authorization_url: Some(self.validator.authorization_url(None, None).url),
            missing_scopes: Vec::new(),
        })?;

        let expires_at = validation
            .expires_at
            .or_else(|| exchanged.expires_in.and_then(|secs| expiry_from_unix(chrono::Utc::now().timestamp() + secs)));
        let record = TokenRecord::new(TokenKind::User, &identity, &exchanged.access_token)
            .with_expiry(expires_at)
            .with_scopes(validation.scopes);
        self.store.put(TokenKind::User, &identity, &record).await?;
        Ok(record)
    }

    fn auth_required(&self, message: String) -> TokenAccess {
        TokenAccess::AuthRequired {
            authorization_url: self.validator.authorization_url(None, None).url,
            message,
        }
    }
}
