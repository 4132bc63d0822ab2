// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SERVICE_NAME: &str = "openlineage-proxy";
pub const INGEST_PATH: &str = "/api/v1/lineage";
pub const HEALTH_PATH: &str = "/api/health";
pub const STATUS_PATH: &str = "/api/status";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub success: bool,
    pub message: String,
    pub filename: String,
    pub event_id: String,
    /// Present for coordinated allocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter: Option<u64>,
    /// Present for fallback allocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub coordinated: bool,
    pub location: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub endpoints: Endpoints,
    pub statistics: Statistics,
    pub configuration: Configuration,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Endpoints {
    pub lineage: String,
    pub status: String,
    pub health: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    /// Last persisted counter value.
    pub total_events_received: u64,
    pub events_stored: usize,
    pub storage_backend: String,
    pub coordination: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub supported_methods: Vec<String>,
    pub expected_content_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusErrorResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub error: String,
}
