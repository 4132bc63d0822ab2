// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Store configuration: which sink and which coordination primitive.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coordinator::Coordinator;
use crate::counter::kv::DEFAULT_COUNTER_NAME;
use crate::counter::lock_file::DEFAULT_LOCK_STALE;
use crate::counter::{
    CounterStore, KvCounter, LockFileCounter, UncoordinatedCounter, DEFAULT_ACQUIRE_TIMEOUT,
};
use crate::error::ConfigError;
use crate::sink::{EventSink, FsSink, ObjectStoreConfig, ObjectStoreSink, SqlSink};

pub const COUNTER_FILE: &str = "counter.txt";
pub const DATABASE_FILE: &str = "lineage.db";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    Filesystem,
    ObjectStore,
    Database,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoordinationKind {
    #[default]
    LockFile,
    ExternalKv,
    None,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Filesystem => "filesystem",
            BackendKind::ObjectStore => "object-store",
            BackendKind::Database => "database",
        }
    }
}

impl CoordinationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinationKind::LockFile => "lock-file",
            CoordinationKind::ExternalKv => "external-kv",
            CoordinationKind::None => "none",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for CoordinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "filesystem" => Ok(BackendKind::Filesystem),
            "object-store" => Ok(BackendKind::ObjectStore),
            "database" => Ok(BackendKind::Database),
            other => Err(ConfigError::UnknownValue {
                field: "backend",
                value: other.to_string(),
                expected: "filesystem, object-store, database",
            }),
        }
    }
}

impl FromStr for CoordinationKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "lock-file" => Ok(CoordinationKind::LockFile),
            "external-kv" => Ok(CoordinationKind::ExternalKv),
            "none" => Ok(CoordinationKind::None),
            other => Err(ConfigError::UnknownValue {
                field: "coordination",
                value: other.to_string(),
                expected: "lock-file, external-kv, none",
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendKind,
    pub coordination: CoordinationKind,
    /// Event files for the filesystem backend; default home of the counter and database.
    pub data_dir: PathBuf,
    pub counter_path: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub object_store: Option<ObjectStoreConfig>,
    pub lock_timeout_ms: u64,
    pub lock_stale_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            coordination: CoordinationKind::default(),
            data_dir: PathBuf::from("lineage-data"),
            counter_path: None,
            database_path: None,
            object_store: None,
            lock_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT.as_millis() as u64,
            lock_stale_ms: DEFAULT_LOCK_STALE.as_millis() as u64,
        }
    }
}

impl StoreConfig {
    pub fn counter_path(&self) -> PathBuf {
        self.counter_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(COUNTER_FILE))
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DATABASE_FILE))
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn lock_stale(&self) -> Duration {
        Duration::from_millis(self.lock_stale_ms)
    }

    pub fn build(&self) -> Result<Coordinator, ConfigError> {
        Ok(Coordinator::new(self.build_counter(), self.build_sink()?)
            .with_lock_timeout(self.lock_timeout()))
    }

    /// Never fails: a coordination medium that cannot be opened degrades to
    /// uncoordinated identifiers instead of refusing every request.
    pub fn build_counter(&self) -> Arc<dyn CounterStore> {
        match self.coordination {
            CoordinationKind::LockFile => Arc::new(LockFileCounter::with_stale_after(
                self.counter_path(),
                self.lock_stale(),
            )),
            CoordinationKind::ExternalKv => {
                match KvCounter::open(self.database_path(), DEFAULT_COUNTER_NAME) {
                    Ok(counter) => Arc::new(counter),
                    Err(e) => {
                        tracing::warn!(
                            "Counter database {:?} unavailable ({}); identifiers will be uncoordinated",
                            self.database_path(),
                            e
                        );
                        Arc::new(UncoordinatedCounter)
                    }
                }
            }
            CoordinationKind::None => Arc::new(UncoordinatedCounter),
        }
    }

    pub fn build_sink(&self) -> Result<Arc<dyn EventSink>, ConfigError> {
        let sink: Arc<dyn EventSink> = match self.backend {
            BackendKind::Filesystem => Arc::new(FsSink::new(self.data_dir.clone())),
            BackendKind::ObjectStore => {
                let cfg = self
                    .object_store
                    .as_ref()
                    .ok_or(ConfigError::MissingObjectStore)?;
                Arc::new(ObjectStoreSink::s3(cfg)?)
            }
            BackendKind::Database => Arc::new(SqlSink::open(self.database_path())?),
        };
        Ok(sink)
    }
}
