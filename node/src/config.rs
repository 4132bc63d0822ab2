// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use lineage_kernel::config::StoreConfig;
use lineage_kernel::error::ConfigError;
use lineage_kernel::sink::ObjectStoreConfig;
use reqwest::Url;
use thiserror::Error;

use crate::webhook::DEFAULT_WEBHOOK_TIMEOUT;

/// Request bodies above this size are rejected with 413.
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum NodeConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] ConfigError),
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_addr: SocketAddr,
    pub store: StoreConfig,
    pub body_limit_bytes: usize,
    /// Bearer token required on every route when set.
    pub auth_token: Option<String>,
    /// Stored events are also posted here when set.
    pub webhook_url: Option<Url>,
    pub webhook_token: Option<String>,
    pub webhook_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            store: StoreConfig::default(),
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
            auth_token: None,
            webhook_url: None,
            webhook_token: None,
            webhook_timeout: DEFAULT_WEBHOOK_TIMEOUT,
        }
    }
}

impl NodeConfig {
    pub fn from_env() -> Result<Self, NodeConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the `LINEAGE_*` variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, NodeConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut cfg = NodeConfig::default();

        if let Some(v) = get("LINEAGE_BIND_ADDR") {
            cfg.bind_addr = parse("LINEAGE_BIND_ADDR", &v)?;
        }
        if let Some(v) = get("LINEAGE_BACKEND") {
            cfg.store.backend = v.parse()?;
        }
        if let Some(v) = get("LINEAGE_COORDINATION") {
            cfg.store.coordination = v.parse()?;
        }
        if let Some(v) = get("LINEAGE_DATA_DIR") {
            cfg.store.data_dir = PathBuf::from(v);
        }
        cfg.store.counter_path = get("LINEAGE_COUNTER_PATH").map(PathBuf::from);
        cfg.store.database_path = get("LINEAGE_DATABASE_PATH").map(PathBuf::from);
        if let Some(v) = get("LINEAGE_LOCK_TIMEOUT_MS") {
            cfg.store.lock_timeout_ms = parse("LINEAGE_LOCK_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("LINEAGE_LOCK_STALE_MS") {
            cfg.store.lock_stale_ms = parse("LINEAGE_LOCK_STALE_MS", &v)?;
        }
        if let Some(v) = get("LINEAGE_BODY_LIMIT_BYTES") {
            cfg.body_limit_bytes = parse("LINEAGE_BODY_LIMIT_BYTES", &v)?;
        }
        cfg.auth_token = get("LINEAGE_AUTH_TOKEN");
        if let Some(v) = get("LINEAGE_WEBHOOK_URL") {
            cfg.webhook_url = Some(parse("LINEAGE_WEBHOOK_URL", &v)?);
        }
        cfg.webhook_token = get("LINEAGE_WEBHOOK_TOKEN");
        if let Some(v) = get("LINEAGE_WEBHOOK_TIMEOUT_MS") {
            cfg.webhook_timeout = Duration::from_millis(parse("LINEAGE_WEBHOOK_TIMEOUT_MS", &v)?);
        }

        if let Some(bucket) = get("LINEAGE_S3_BUCKET") {
            cfg.store.object_store = Some(ObjectStoreConfig {
                bucket,
                region: get("LINEAGE_S3_REGION"),
                endpoint: get("LINEAGE_S3_ENDPOINT"),
                root: get("LINEAGE_S3_ROOT"),
                prefix: get("LINEAGE_OBJECT_PREFIX").unwrap_or_default(),
            });
        }

        Ok(cfg)
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, NodeConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| NodeConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
