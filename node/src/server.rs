// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, FromRef, Request as AxumRequest, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use lineage_kernel::lineage::LineageSummary;
use lineage_kernel::{Coordinator, ProcessError};
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::api::*;
use crate::errors::NodeError;
use crate::webhook::WebhookForwarder;

pub type SharedCoordinator = Arc<Coordinator>;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: SharedCoordinator,
    pub webhook: Option<Arc<WebhookForwarder>>,
}

impl AppState {
    pub fn new(coordinator: SharedCoordinator) -> Self {
        Self {
            coordinator,
            webhook: None,
        }
    }

    pub fn with_webhook(mut self, webhook: WebhookForwarder) -> Self {
        self.webhook = Some(Arc::new(webhook));
        self
    }
}

impl FromRef<AppState> for SharedCoordinator {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.coordinator)
    }
}

async fn auth_guard(
    State(token): State<Arc<String>>,
    req: AxumRequest,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.strip_prefix("Bearer "));

    if provided == Some(token.as_str()) {
        Ok(next.run(req).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

pub fn build_router(state: SharedCoordinator, auth_token: Option<String>, body_limit: usize) -> Router {
    build_app(AppState::new(state), auth_token, body_limit)
}

pub fn build_app(state: AppState, auth_token: Option<String>, body_limit: usize) -> Router {
    if let Some(webhook) = &state.webhook {
        tracing::info!("Forwarding stored events to {}", webhook.url());
    }

    let mut app = Router::new()
        .route(INGEST_PATH, post(ingest_event))
        .route(HEALTH_PATH, get(health))
        .route(STATUS_PATH, get(status))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    if let Some(token) = auth_token {
        tracing::info!("Auth Enabled: Bearer token required");
        app = app.layer(from_fn_with_state(Arc::new(token), auth_guard));
    } else {
        tracing::warn!("Auth Disabled: No token configured");
    }

    app.layer(TraceLayer::new_for_http())
}

async fn ingest_event(
    State(app): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<IngestResponse>, NodeError> {
    let started = Instant::now();
    let payload = match payload {
        Ok(Json(value)) => value,
        Err(rejection) => {
            metrics::increment_counter!("lineage_commit_failures_total", "reason" => "rejected");
            return Err(NodeError::Rejected {
                status: rejection.status(),
                details: rejection.body_text(),
            });
        }
    };
    if !payload.is_object() {
        metrics::increment_counter!("lineage_commit_failures_total", "reason" => "invalid_payload");
        return Err(NodeError::InvalidPayload(
            "body must be a JSON object".to_string(),
        ));
    }

    let summary = LineageSummary::from_payload(&payload);
    tracing::info!(
        event_type = %summary.event_type,
        event_time = ?summary.event_time,
        job_namespace = %summary.job_namespace,
        job_name = %summary.job_name,
        run_id = ?summary.run_id,
        producer = ?summary.producer,
        inputs = summary.input_count,
        outputs = summary.output_count,
        "Received OpenLineage event"
    );

    let forwarded = app.webhook.as_ref().map(|_| payload.clone());
    let event = app.coordinator.process_value(payload).await.map_err(|e| {
        let reason = match &e {
            ProcessError::InvalidPayload(_) => "invalid_payload",
            ProcessError::Counter(_) => "counter",
            ProcessError::Sink { .. } => "sink",
        };
        metrics::increment_counter!("lineage_commit_failures_total", "reason" => reason);
        NodeError::from(e)
    })?;

    metrics::increment_counter!("lineage_events_committed_total");
    if !event.coordinated() {
        metrics::increment_counter!("lineage_fallback_allocations_total");
    }
    metrics::histogram!("lineage_commit_duration_seconds", started.elapsed().as_secs_f64());

    let filename = event.file_name();
    if let (Some(webhook), Some(forwarded)) = (&app.webhook, forwarded) {
        webhook.spawn_forward(filename.clone(), forwarded);
    }
    Ok(Json(IngestResponse {
        success: true,
        message: format!("Payload saved successfully to {}", filename),
        filename,
        event_id: event.id.to_string(),
        counter: event.sequence(),
        timestamp: event.allocation.timestamp(),
        coordinated: event.coordinated(),
        location: event.receipt.location,
        processed_at: event.processed_at,
    }))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        service: SERVICE_NAME.to_string(),
    })
}

async fn status(State(coordinator): State<SharedCoordinator>) -> Response {
    let stats = async {
        let total = coordinator.counter().current().await.map_err(|e| e.to_string())?;
        let stored = coordinator.sink().list().await.map_err(|e| e.to_string())?;
        Ok::<_, String>((total, stored.len()))
    }
    .await;

    match stats {
        Ok((total_events_received, events_stored)) => Json(StatusResponse {
            status: "healthy".to_string(),
            message: "OpenLineage Proxy API is running".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            endpoints: Endpoints {
                lineage: INGEST_PATH.to_string(),
                status: STATUS_PATH.to_string(),
                health: HEALTH_PATH.to_string(),
            },
            statistics: Statistics {
                total_events_received,
                events_stored,
                storage_backend: coordinator.sink().backend().to_string(),
                coordination: coordinator.counter().kind().to_string(),
            },
            configuration: Configuration {
                supported_methods: vec!["POST".to_string()],
                expected_content_type: "application/json".to_string(),
            },
        })
        .into_response(),
        Err(error) => {
            tracing::error!("Status check failed: {}", error);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusErrorResponse {
                    status: "error".to_string(),
                    message: "Failed to retrieve API status".to_string(),
                    timestamp: Utc::now(),
                    error,
                }),
            )
                .into_response()
        }
    }
}

async fn metrics_handler() -> String {
    crate::telemetry::get_metrics()
}
