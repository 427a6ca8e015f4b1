// tests/common/mod.rs
pub use axum::Router;
pub use tokio::task::JoinHandle;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use reqwest::Client;

use crate::auth::refresher::TokenRefresher;
use crate::auth::service::TokenService;
use crate::auth::validator::TokenValidator;
use crate::config::settings::ProviderConfig;
use crate::crypto::encryption::TokenCipher;
use crate::provider::client::GraphClient;
use crate::resilience::retry::RetryPolicy;
use crate::store::token_store::TokenStore;

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

/// Provider config aimed at a mock server.
pub fn provider_config(base_url: &str) -> ProviderConfig {
    ProviderConfig {
        app_id: "test-app".to_string(),
        app_secret: "test-app-secret".to_string(),
        api_version: "v22.0".to_string(),
        redirect_uri: "http://localhost:8080/auth/callback".to_string(),
        base_url: base_url.trim_end_matches('/').to_string(),
        consent_url: "https://consent.example".to_string(),
        default_scopes: vec![
            "public_profile".to_string(),
            "pages_read_engagement".to_string(),
        ],
    }
}

pub fn test_cipher() -> Arc<TokenCipher> {
    Arc::new(TokenCipher::new("integration-test-secret").expect("test cipher"))
}

/// Everything a flow test needs, wired against a mock provider and a
/// throwaway store file.
pub struct TestStack {
    pub client: Arc<GraphClient>,
    pub validator: TokenValidator,
    pub refresher: TokenRefresher,
    pub store: TokenStore,
    pub service: TokenService,
}

pub async fn build_stack(base_url: &str, store_path: &Path) -> TestStack {
    let store = TokenStore::open(store_path, test_cipher()).await;
    let client = Arc::new(GraphClient::new(provider_config(base_url)));
    let validator = TokenValidator::new(client.clone());
    let refresher = TokenRefresher::new(client.clone(), validator.clone(), store.clone(), 3);
    let service = TokenService::new(
        client.clone(),
        store.clone(),
        validator.clone(),
        refresher.clone(),
        RetryPolicy::default(),
    );
    TestStack {
        client,
        validator,
        refresher,
        store,
        service,
    }
}
