//! pledge-gateway server entry point.
//!
//! Starts the Axum HTTP server with the REST and webhook endpoints.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use pledge_gateway::api;
use pledge_gateway::app_state::AppState;
use pledge_gateway::config::{GatewayConfig, StoreBackend};
use pledge_gateway::ingress::SignatureVerifier;
use pledge_gateway::persistence::{MemoryStore, PledgeStore, PostgresStore};
use pledge_gateway::provider::{CheckoutProvider, HttpCheckoutProvider};
use pledge_gateway::service::{ChallengeService, CheckoutService, ReconciliationService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = GatewayConfig::from_env()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("loading configuration")?;
    let config = Arc::new(config);
    tracing::info!(addr = %config.listen_addr, "starting pledge-gateway");

    // Build the storage backend
    let store: Arc<dyn PledgeStore> = match config.store_backend {
        StoreBackend::Postgres => Arc::new(
            PostgresStore::connect(&config)
                .await
                .context("connecting to postgres")?,
        ),
        StoreBackend::Memory => {
            tracing::warn!("running on the in-memory store; state is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Outbound provider client
    let provider: Arc<dyn CheckoutProvider> = Arc::new(HttpCheckoutProvider::new(
        config.provider_api_base.clone(),
        config.provider_secret_key.clone(),
    ));

    // Build application state
    let app_state = AppState {
        challenges: Arc::new(ChallengeService::new(
            Arc::clone(&store),
            Arc::clone(&config),
        )),
        checkout: Arc::new(CheckoutService::new(
            Arc::clone(&store),
            provider,
            Arc::clone(&config),
        )),
        reconciliation: Arc::new(ReconciliationService::new(Arc::clone(&store))),
        verifier: Arc::new(SignatureVerifier::new(
            config.webhook_signing_secret.clone(),
            config.signature_tolerance_secs,
        )),
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .context("binding listen address")?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await.context("serving")?;

    Ok(())
}
