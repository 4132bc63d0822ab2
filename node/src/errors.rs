// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lineage_kernel::error::{CounterError, ProcessError};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    /// Body rejected before it reached the coordinator (too large, wrong content type, bad JSON).
    #[error("Request rejected: {details}")]
    Rejected { status: StatusCode, details: String },
    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            NodeError::InvalidPayload(details) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid payload", "details": details }),
            ),
            NodeError::Rejected { status, details } => (
                status,
                json!({ "error": "Invalid payload", "details": details }),
            ),
            NodeError::Process(ProcessError::InvalidPayload(details)) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid payload", "details": details }),
            ),
            NodeError::Process(ProcessError::Counter(e)) => {
                let status = match e {
                    CounterError::Corruption { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (
                    status,
                    json!({ "error": "Counter unavailable", "details": e.to_string() }),
                )
            }
            NodeError::Process(ProcessError::Sink { id, source }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "Error writing event",
                    "details": source.to_string(),
                    "eventId": id,
                }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Delivery failure of a forwarded event. Never surfaces to the ingest caller.
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Webhook responded {0}")]
    Status(u16),
}
