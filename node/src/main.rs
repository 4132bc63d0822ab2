// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::sync::Arc;

use lineage_node::config::NodeConfig;
use lineage_node::server::{build_app, AppState};
use lineage_node::telemetry::init_telemetry;
use lineage_node::webhook::WebhookForwarder;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_telemetry();

    let cfg = NodeConfig::from_env()?;
    tracing::info!("Initializing lineage node on {} with store config: {:?}", cfg.bind_addr, cfg.store);

    let coordinator = Arc::new(cfg.store.build()?);
    tracing::info!(
        backend = coordinator.sink().backend(),
        coordination = coordinator.counter().kind(),
        "Event store ready"
    );

    let mut state = AppState::new(coordinator);
    if let Some(url) = cfg.webhook_url.clone() {
        state = state.with_webhook(WebhookForwarder::new(url, cfg.webhook_token.clone(), cfg.webhook_timeout)?);
    }
    let app = build_app(state, cfg.auth_token.clone(), cfg.body_limit_bytes);

    let listener = TcpListener::bind(cfg.bind_addr).await?;
    tracing::info!("Listening on {}", cfg.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;
    Ok(())
}
