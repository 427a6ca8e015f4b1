use anyhow::Result;
use axum::Router;

use crate::config::settings::{MetricsConfig, ServerConfig};
use crate::observability::metrics::get_metrics;
use crate::observability::routes::MetricsState;
use crate::server::routes::TokenApiState;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub metrics_state: MetricsState,
    pub token_api: TokenApiState,
}

impl AppState {
    pub async fn new(token_api: TokenApiState) -> Self {
        let metrics = get_metrics().await;
        Self {
            metrics_state: MetricsState::new(metrics.registry.clone()),
            token_api,
        }
    }
}

/// Start one Axum server serving the token API plus the metrics route.
pub async fn start(
    server_config: &ServerConfig,
    metrics_config: &MetricsConfig,
    token_api: TokenApiState,
) -> Result<()> {
    let metrics = get_metrics().await;
    let state = AppState::new(token_api).await;

    let app = Router::new()
        .merge(state.metrics_state.router(metrics_config))
        .merge(state.token_api.router())
        .with_state(state);

    let bind_addr = format!("{}:{}", server_config.host, server_config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("listening on {bind_addr}");
    metrics.up.set(1);
    axum::serve(listener, app).await?;

    Ok(())
}
