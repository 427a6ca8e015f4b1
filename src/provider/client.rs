//! Thin client for the Graph-style provider API: token introspection, the
//! two token exchanges, and the consent URL builder. The base URL is
//! configurable so tests can point it at a local mock server.

use base64::engine::{general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use reqwest::Client;
use tracing::debug;

use crate::config::settings::ProviderConfig;
use crate::errors::ProviderError;
use crate::provider::types::{
    AccessTokenResponse, AuthorizationUrl, DebugTokenData, DebugTokenEnvelope, ErrorEnvelope,
};

#[derive(Debug, Clone)]
pub struct GraphClient {
    cfg: ProviderConfig,
    client: Client,
}

impl GraphClient {
    pub fn new(cfg: ProviderConfig) -> Self {
        let client = Client::builder().build().expect("Failed to build HTTP client");
        Self { cfg, client }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.cfg
    }

    /// App access token used to authenticate introspection calls.
    fn app_token(&self) -> String {
        format!("{}|{}", self.cfg.app_id, self.cfg.app_secret)
    }

    /// Single introspection call; network errors are not retried here.
    pub async fn debug_token(&self, input_token: &str) -> Result<DebugTokenData, ProviderError> {
        let url = format!("{}/{}/debug_token", self.cfg.base_url, self.cfg.api_version);
        let app_token = self.app_token();
        let response = self
            .client
            .get(&url)
            .query(&[("input_token", input_token), ("access_token", app_token.as_str())])
            .send()
            .await
            .map_err(|e| ProviderError::network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(read_api_error(response).await);
        }

        let envelope: DebugTokenEnvelope = response
            .json()
            .await
            .map_err(|e| ProviderError::api(None, None, format!("unexpected introspection payload: {e}")))?;
        Ok(envelope.data)
    }

    /// Exchange a short-lived token for a long-lived one.
    pub async fn exchange_long_lived(&self, token: &str) -> Result<AccessTokenResponse, ProviderError> {
        debug!("exchanging token via long-lived endpoint");
        self.access_token_request(&[
            ("grant_type", "fb_exchange_token"),
            ("client_id", &self.cfg.app_id),
            ("client_secret", &self.cfg.app_secret),
            ("fb_exchange_token", token),
        ])
        .await
    }

    /// Complete the OAuth callback: exchange the authorization code.
    pub async fn exchange_code(&self, code: &str) -> Result<AccessTokenResponse, ProviderError> {
        debug!("exchanging authorization code for token");
        self.access_token_request(&[
            ("client_id", &self.cfg.app_id),
            ("client_secret", &self.cfg.app_secret),
            ("redirect_uri", &self.cfg.redirect_uri),
            ("code", code),
        ])
        .await
    }

    async fn access_token_request(&self, params: &[(&str, &str)]) -> Result<AccessTokenResponse, ProviderError> {
        let url = format!("{}/{}/oauth/access_token", self.cfg.base_url, self.cfg.api_version);
        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| ProviderError::network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(read_api_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::api(None, None, format!("unexpected exchange payload: {e}")))
    }

    /// Build the consent URL the user follows to grant (or re-grant) scopes.
    pub fn authorization_url(&self, scopes: &[String], state: Option<String>) -> AuthorizationUrl {
        let state = state.unwrap_or_else(random_state);
        let scope = scopes.join(",");
        let params = [
            ("client_id", self.cfg.app_id.as_str()),
            ("redirect_uri", self.cfg.redirect_uri.as_str()),
            ("state", state.as_str()),
            ("scope", scope.as_str()),
            ("response_type", "code"),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let url = format!(
            "{}/{}/dialog/oauth?{}",
            self.cfg.consent_url, self.cfg.api_version, query
        );
        AuthorizationUrl { url, state }
    }
}

/// 32 random bytes, base64url; CSRF protection for the consent flow.
fn random_state() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

async fn read_api_error(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    match response.json::<ErrorEnvelope>().await {
        Ok(envelope) => ProviderError::api(envelope.error.code, Some(status), envelope.error.message),
        Err(_) => ProviderError::api(None, Some(status), format!("provider returned HTTP {status}")),
    }
}
