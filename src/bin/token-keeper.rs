use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use token_keeper::auth::refresher::{spawn_refresh_worker, TokenRefresher};
use token_keeper::auth::service::TokenService;
use token_keeper::auth::validator::TokenValidator;
use token_keeper::config::loader;
use token_keeper::crypto::encryption::TokenCipher;
use token_keeper::provider::client::GraphClient;
use token_keeper::resilience::retry::RetryPolicy;
use token_keeper::server::routes::TokenApiState;
use token_keeper::server::server;
use token_keeper::store::token_store::TokenStore;
use token_keeper::utils::logging::{self, LogLevel};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "token-keeper.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Read args, load YAML config, init logging
    // -------------------------------

    let args = Args::parse();
    let service_config = loader::run(&args.config).await?;
    logging::run(&service_config, args.log_level);

    // -------------------------------
    // 2. Build cipher and open the token store
    // -------------------------------

    let secret = service_config
        .encryption
        .secret_key
        .as_deref()
        .expect("validated by config loader");
    let cipher = Arc::new(TokenCipher::new(secret)?);
    let store = TokenStore::open(&service_config.store.path, cipher).await;

    // -------------------------------
    // 3. Wire provider client, validator, refresher, service facade
    // -------------------------------

    let client = Arc::new(GraphClient::new(service_config.provider.clone()));
    let validator = TokenValidator::new(client.clone());
    let refresher = TokenRefresher::new(
        client.clone(),
        validator.clone(),
        store.clone(),
        service_config.refresh.safety_margin_days(),
    );
    let retry = RetryPolicy {
        refresh_attempts: service_config
            .refresh
            .retry
            .as_ref()
            .and_then(|r| r.refresh_attempts)
            .unwrap_or(1),
    };
    let service = TokenService::new(client, store, validator, refresher.clone(), retry);

    // -------------------------------
    // 4. Start the background refresh worker
    // -------------------------------

    let worker = spawn_refresh_worker(
        refresher,
        service_config.refresh.check_interval_hours(),
        service_config.refresh.within_hours(),
    );

    // -------------------------------
    // 5. Start http server with token API and metrics routes
    // -------------------------------

    let token_api = TokenApiState::new(
        service,
        service_config.internal_api_key.clone(),
        service_config.refresh.within_hours(),
    );

    info!("Service starting...");
    server::start(&service_config.server, &service_config.metrics, token_api).await?;

    worker.abort();
    Ok(())
}
