//! ERC-20 gateway HTTP entrypoint.
//!
//! Endpoints:
//! - `GET /` – greeting
//! - `GET /health` – liveness, chain and signer
//! - `GET /api/token/info` – name, symbol, decimals, total supply
//! - `GET /api/token/balance/{address}` – balance of an account
//! - `POST /api/token/transfer-from` – move tokens using the signer's allowance
//! - `POST /api/token/approve` – grant an allowance from the signer
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `RPC_URL`, `PRIVATE_KEY`, `CONTRACT_ADDRESS` are required
//! - `HOST`, `PORT` control the binding address
//! - `CONFIG_FILE` points at optional TOML settings

use axum::http::Method;
use axum::{Extension, Router};
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;

use erc20_gateway::config::{CorsConfig, Environment, GatewayConfig};
use erc20_gateway::handlers;
use erc20_gateway::ledger::EvmLedger;
use erc20_gateway::ledger::evm::EvmSettings;
use erc20_gateway::pipeline::TokenService;
use erc20_gateway::sig_down::SigDown;
use erc20_gateway::telemetry::Telemetry;

/// Initializes the gateway.
///
/// - Loads `.env` variables and installs logging.
/// - Validates configuration; anything missing or malformed exits with status 1.
/// - Connects to the ledger and checks the chain.
/// - Serves HTTP until SIGINT/SIGTERM.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env variables
    dotenv().ok();

    let telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let environment = Environment::from_env().unwrap_or_else(|e| {
        tracing::error!("Invalid environment: {}", e);
        std::process::exit(1);
    });
    let app_config = GatewayConfig::from_env().unwrap_or_else(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        std::process::exit(1);
    });
    tracing::info!("Configuration loaded successfully");

    let wallet = environment.credential.make_evm_wallet().unwrap_or_else(|e| {
        tracing::error!("Invalid signing credential: {}", e);
        std::process::exit(1);
    });
    let transaction = &app_config.transaction;
    let settings = EvmSettings {
        rpc_url: environment.rpc_url.clone(),
        contract: environment.contract,
        expected_chain: environment.expected_chain,
        connection_timeout: transaction.connection_timeout(),
        rpc_timeout: transaction.rpc_timeout(),
        receipt_timeout: transaction.receipt_timeout(),
    };
    // Abort if we can't reach the ledger early
    let ledger = match EvmLedger::connect(settings, wallet).await {
        Ok(ledger) => ledger,
        Err(e) => {
            tracing::error!("Failed to connect to ledger: {}", e);
            std::process::exit(1);
        }
    };
    let chain = ledger.chain();
    let service = TokenService::new(Arc::new(ledger), transaction.pipeline_settings());
    let axum_state = Arc::new(service);

    let http_endpoints = Router::new()
        .merge(handlers::routes().with_state(axum_state))
        .layer(Extension(chain))
        .layer(tower_http::limit::RequestBodyLimitLayer::new(
            app_config.request.max_body_size_bytes,
        ))
        .layer(telemetry.http_tracing())
        .layer(cors_layer(&app_config.cors));

    let addr = SocketAddr::new(environment.host, environment.port);
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        });

    let sig_down = SigDown::try_new()?;
    let axum_cancellation_token = sig_down.cancellation_token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(axum_graceful_shutdown)
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn cors_layer(config: &CorsConfig) -> cors::CorsLayer {
    let layer = cors::CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(cors::Any);
    if config.allowed_origins.is_empty() {
        tracing::info!("CORS: Allowing all origins (*)");
        return layer.allow_origin(cors::Any);
    }
    tracing::info!("CORS: Restricting to {:?}", config.allowed_origins);
    let origins: Vec<_> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    layer.allow_origin(origins)
}
