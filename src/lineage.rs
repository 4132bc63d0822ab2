// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! OpenLineage envelope fields used for indexing and structured logs.
//!
//! Nothing here validates the event: missing fields fall back to the same
//! defaults the database table has always used.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageSummary {
    pub event_type: String,
    pub event_time: Option<String>,
    pub job_namespace: String,
    pub job_name: String,
    pub run_id: Option<String>,
    pub producer: Option<String>,
    pub input_count: usize,
    pub output_count: usize,
}

impl LineageSummary {
    pub fn from_payload(payload: &Value) -> Self {
        let text = |pointer: &str| {
            payload
                .pointer(pointer)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let len = |key: &str| payload.get(key).and_then(Value::as_array).map_or(0, Vec::len);

        Self {
            event_type: text("/eventType").unwrap_or_else(|| "UNKNOWN".to_string()),
            event_time: text("/eventTime"),
            job_namespace: text("/job/namespace").unwrap_or_else(|| "default".to_string()),
            job_name: text("/job/name").unwrap_or_else(|| "unknown".to_string()),
            run_id: text("/run/runId"),
            producer: text("/producer"),
            input_count: len("inputs"),
            output_count: len("outputs"),
        }
    }
}
