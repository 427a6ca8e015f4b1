//! Transparent recovery from expired tokens around provider calls.
//!
//! Per call: CallProvider; on success done. On a provider error classified
//! as token-expired: refresh once, retry once. Any other error fails
//! immediately. There is no loop, so a second consecutive expiry (clock
//! skew, revoked grant) surfaces to the caller.

use tracing::{error, warn};

use crate::auth::refresher::TokenRefresher;
use crate::errors::ProviderError;
use crate::observability::metrics::get_metrics;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Refresh-and-retry attempts after an expired-token error.
    pub refresh_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { refresh_attempts: 1 }
    }
}

impl RetryPolicy {
    /// Run `operation` with the given token, refreshing and retrying on
    /// expiry up to the configured bound. The closure receives the token to
    /// use for each attempt.
    pub async fn call_with_refresh<F, Fut, T>(
        &self,
        refresher: &TokenRefresher,
        token: &str,
        mut operation: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut(String) -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let mut current = token.to_owned();
        let mut refreshes = 0u32;

        loop {
            match operation(current.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_token_expired() && refreshes < self.refresh_attempts => {
                    warn!("provider reported expired token: {e}");
                    match refresher.refresh(&current).await {
                        Some(new_token) if new_token != current => {
                            refreshes += 1;
                            get_metrics().await.expired_retries.inc();
                            current = new_token;
                        }
                        _ => {
                            error!("failed to refresh token or token unchanged");
                            return Err(e);
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
