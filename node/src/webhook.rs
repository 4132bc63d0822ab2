// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Forwards every stored event to an external HTTP endpoint.
//!
//! Delivery happens after the commit and off the request path. A failed
//! delivery is logged and counted; the event stays stored and the ingest
//! response is unaffected.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::Value;

use crate::errors::WebhookError;

pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Body posted to the webhook.
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub filename: &'a str,
    pub timestamp: DateTime<Utc>,
    pub event: &'a Value,
}

#[derive(Debug, Clone)]
pub struct WebhookForwarder {
    url: Url,
    token: Option<String>,
    client: Client,
}

impl WebhookForwarder {
    pub fn new(url: Url, token: Option<String>, timeout: Duration) -> Result<Self, WebhookError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WebhookError::Network(e.to_string()))?;
        Ok(Self { url, token, client })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn forward(&self, filename: &str, event: &Value) -> Result<(), WebhookError> {
        let body = WebhookPayload {
            filename,
            timestamp: Utc::now(),
            event,
        };
        let mut req = self.client.post(self.url.clone()).json(&body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| WebhookError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(WebhookError::Status(resp.status().as_u16()));
        }
        Ok(())
    }

    /// Fire and log: the returned handle is only awaited by tests.
    pub fn spawn_forward(self: &Arc<Self>, filename: String, event: Value) -> tokio::task::JoinHandle<()> {
        let forwarder = Arc::clone(self);
        tokio::spawn(async move {
            match forwarder.forward(&filename, &event).await {
                Ok(()) => {
                    metrics::increment_counter!("lineage_webhook_deliveries_total", "outcome" => "ok");
                    tracing::debug!(filename = %filename, "Forwarded event to webhook");
                }
                Err(e) => {
                    metrics::increment_counter!("lineage_webhook_deliveries_total", "outcome" => "failed");
                    tracing::error!(filename = %filename, url = %forwarder.url, "Webhook delivery failed: {}", e);
                }
            }
        })
    }
}
