//! Token refresh: no-op while plenty of life remains, exchange through the
//! provider's long-lived endpoint otherwise. Exchange failures degrade to
//! re-authorization (`None`), they are never raised to the caller.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::observability::metrics::get_metrics;
use crate::provider::client::GraphClient;
use crate::provider::types::AccessTokenResponse;
use crate::auth::validator::TokenValidator;
use crate::store::record::{TokenKind, TokenRecord};
use crate::store::token_store::TokenStore;

static ERROR_MSG: &'static str = "error";

/// One entry per candidate record in a scheduled sweep.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub token_type: TokenKind,
    pub identity: String,
    pub success: bool,
    pub message: String,
    pub new_expiry: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct TokenRefresher {
    client: Arc<GraphClient>,
    validator: TokenValidator,
    store: TokenStore,
    safety_margin: Duration,
}

impl TokenRefresher {
    pub fn new(
        client: Arc<GraphClient>,
        validator: TokenValidator,
        store: TokenStore,
        safety_margin_days: i64,
    ) -> Self {
        Self {
            client,
            validator,
            store,
            safety_margin: Duration::days(safety_margin_days),
        }
    }

    /// Refresh a raw token. Returns the token unchanged when it still has
    /// more than the safety margin of life (or no expiry at all), the new
    /// token after a successful exchange, and `None` when the caller must
    /// send the user back through authorization.
    pub async fn refresh(&self, token: &str) -> Option<String> {
        let validation = self.validator.validate(token).await;
        if !validation.is_valid {
            warn!(
                "cannot refresh invalid token: {}",
                validation.error_message.as_deref().unwrap_or("unknown")
            );
            return None;
        }

        if !needs_refresh(validation.expires_at, self.safety_margin) {
            info!("token does not need refresh yet");
            return Some(token.to_owned());
        }

        let metrics = get_metrics().await;
        metrics.refresh_attempts.with_label_values(&["user"]).inc();
        let start = std::time::Instant::now();

        let exchanged = match self.client.exchange_long_lived(token).await {
            Ok(exchanged) => exchanged,
            Err(err) => {
                error!("token exchange failed: {err}");
                metrics
                    .refresh_failures
                    .with_label_values(&["user", ERROR_MSG])
                    .inc();
                return None;
            }
        };

        let new_token = exchanged.access_token.clone();
        let new_validation = self.validator.validate(&new_token).await;
        if let Some(identity) = new_validation.user_id.clone().or(validation.user_id) {
            let record = TokenRecord::new(TokenKind::User, &identity, &new_token)
                .with_expiry(expiry_of(new_validation.expires_at, &exchanged))
                .with_scopes(new_validation.scopes.clone());
            if let Err(err) = self.store.put(TokenKind::User, &identity, &record).await {
                error!("failed to persist refreshed token for '{identity}': {err}");
            }
        }

        metrics
            .refresh_duration
            .with_label_values(&["user"])
            .observe(start.elapsed().as_secs_f64());
        Some(new_token)
    }

    /// Sequential sweep over every stored record expiring inside the
    /// horizon. Per-record errors are captured into the result list and
    /// logged, never raised out of the batch.
    pub async fn refresh_expiring(&self, within_hours: u64) -> Vec<RefreshOutcome> {
        let candidates = self.store.all_expiring(within_hours).await;
        info!(
            "scheduled refresh: {} token(s) expiring within {}h",
            candidates.len(),
            within_hours
        );

        let mut outcomes = Vec::with_capacity(candidates.len());
        for record in candidates {
            let outcome = self.refresh_record(&record).await;
            if outcome.success {
                info!(
                    "{} token '{}': {}",
                    record.token_type.as_str(),
                    record.identity,
                    outcome.message
                );
            } else {
                warn!(
                    "{} token '{}': {}",
                    record.token_type.as_str(),
                    record.identity,
                    outcome.message
                );
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn refresh_record(&self, record: &TokenRecord) -> RefreshOutcome {
        let kind = record.token_type;
        let validation = self.validator.validate(&record.access_token).await;
        if !validation.is_valid {
            return RefreshOutcome {
                token_type: kind,
                identity: record.identity.clone(),
                success: false,
                message: format!(
                    "Token is invalid, re-authorization required: {}",
                    validation.error_message.as_deref().unwrap_or("unknown")
                ),
                new_expiry: None,
            };
        }

        let expires_at = validation.expires_at.or(record.expires_at);
        if !needs_refresh(expires_at, self.safety_margin) {
            return RefreshOutcome {
                token_type: kind,
                identity: record.identity.clone(),
                success: true,
                message: "Token does not need refresh yet".to_string(),
                new_expiry: expires_at,
            };
        }

        let metrics = get_metrics().await;
        metrics.refresh_attempts.with_label_values(&[kind.as_str()]).inc();
        let start = std::time::Instant::now();

        match self.client.exchange_long_lived(&record.access_token).await {
            Ok(exchanged) => {
                let new_validation = self.validator.validate(&exchanged.access_token).await;
                let new_expiry = expiry_of(new_validation.expires_at, &exchanged);
                let scopes = if new_validation.scopes.is_empty() {
                    record.scopes.clone()
                } else {
                    new_validation.scopes
                };
                let updated = TokenRecord::new(kind, &record.identity, &exchanged.access_token)
                    .with_expiry(new_expiry)
                    .with_scopes(scopes);

                metrics
                    .refresh_duration
                    .with_label_values(&[kind.as_str()])
                    .observe(start.elapsed().as_secs_f64());

                match self.store.put(kind, &record.identity, &updated).await {
                    Ok(()) => RefreshOutcome {
                        token_type: kind,
                        identity: record.identity.clone(),
                        success: true,
                        message: "Token refreshed successfully".to_string(),
                        new_expiry,
                    },
                    Err(err) => RefreshOutcome {
                        token_type: kind,
                        identity: record.identity.clone(),
                        success: false,
                        message: format!("Error refreshing token: failed to persist: {err}"),
                        new_expiry: None,
                    },
                }
            }
            Err(err) => {
                metrics
                    .refresh_failures
                    .with_label_values(&[kind.as_str(), ERROR_MSG])
                    .inc();
                RefreshOutcome {
                    token_type: kind,
                    identity: record.identity.clone(),
                    success: false,
                    message: format!("Error refreshing token: {err}"),
                    new_expiry: None,
                }
            }
        }
    }
}

fn needs_refresh(expires_at: Option<DateTime<Utc>>, safety_margin: Duration) -> bool {
    match expires_at {
        Some(at) => at <= Utc::now() + safety_margin,
        // no expiry: long-lived grant, nothing to exchange
        None => false,
    }
}

fn expiry_of(validated: Option<DateTime<Utc>>, exchanged: &AccessTokenResponse) -> Option<DateTime<Utc>> {
    validated.or_else(|| exchanged.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)))
}

/// Periodic sweep the service runs in the background.
pub fn spawn_refresh_worker(
    refresher: TokenRefresher,
    check_interval_hours: u64,
    within_hours: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = StdDuration::from_secs(check_interval_hours * 3600);
        loop {
            info!("token refresh cycle start");
            let outcomes = refresher.refresh_expiring(within_hours).await;
            let refreshed = outcomes.iter().filter(|o| o.success).count();
            let failed = outcomes.len() - refreshed;
            info!(
                "token refresh cycle done: {} ok, {} failed, next check in {}h",
                refreshed, failed, check_interval_hours
            );
            tokio::time::sleep(interval).await;
        }
    })
}
