// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use std::sync::OnceLock;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub const DEFAULT_LOG_FILTER: &str = "lineage_node=debug,lineage_kernel=info,tower_http=debug";

/// Initialize telemetry (logs + metrics)
pub fn init_telemetry() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROM_HANDLE.set(handle).is_err() {
                tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
            }
        }
        Err(e) => tracing::error!("Failed to install Prometheus recorder: {}", e),
    }

    metrics::describe_counter!("lineage_events_committed_total", "Events durably stored");
    metrics::describe_counter!("lineage_commit_failures_total", "Events rejected or not stored, by reason");
    metrics::describe_counter!(
        "lineage_fallback_allocations_total",
        "Identifiers allocated without the shared counter"
    );
    metrics::describe_counter!(
        "lineage_webhook_deliveries_total",
        "Stored events forwarded to the webhook, by outcome"
    );
    metrics::describe_histogram!(
        "lineage_commit_duration_seconds",
        "Time from request to durable commit"
    );

    metrics::gauge!("lineage_node_up", 1.0);
}

/// Get the Prometheus handle to render metrics
pub fn get_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}
