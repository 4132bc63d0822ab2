// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Event identifiers.
//!
//! Format: `<sequence-or-timestamp>_lineage_data_<uuid>`.
//!
//! - Coordinated: the counter value, zero-padded to at least 3 digits (`001`,
//!   `042`, `1234`).
//! - Fallback: wall-clock microseconds since the Unix epoch (16 digits for any
//!   date after 2001).
//!
//! The random token is a hyphenated UUID v4. Every character of an identifier
//! is in `[0-9a-z_-]`, so it is usable as a file name and as an object key.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

pub const SEPARATOR: &str = "_lineage_data_";
pub const FILE_EXTENSION: &str = "json";

/// Minimum width of the sequence component.
const SEQUENCE_WIDTH: usize = 3;

/// Parsed components at or above this value are read back as timestamps.
/// 10^15 microseconds is September 2001; a counter never gets there.
const TIMESTAMP_FLOOR: u64 = 1_000_000_000_000_000;

/// The ordering component of an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Allocation {
    /// Counter value from a coordinated allocation.
    Sequence(u64),
    /// Microseconds since the Unix epoch, used when no counter is available.
    Timestamp(u64),
}

impl Allocation {
    /// Fallback allocation for the current instant.
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(time: DateTime<Utc>) -> Self {
        Allocation::Timestamp(u64::try_from(time.timestamp_micros()).unwrap_or(0))
    }

    pub fn sequence(&self) -> Option<u64> {
        match self {
            Allocation::Sequence(n) => Some(*n),
            Allocation::Timestamp(_) => None,
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Allocation::Timestamp(us) => DateTime::from_timestamp_micros(i64::try_from(*us).ok()?),
            Allocation::Sequence(_) => None,
        }
    }

    pub fn is_coordinated(&self) -> bool {
        matches!(self, Allocation::Sequence(_))
    }

    fn from_component(n: u64) -> Self {
        if n >= TIMESTAMP_FLOOR {
            Allocation::Timestamp(n)
        } else {
            Allocation::Sequence(n)
        }
    }
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Allocation::Sequence(n) => write!(f, "{:0width$}", n, width = SEQUENCE_WIDTH),
            Allocation::Timestamp(us) => write!(f, "{}", us),
        }
    }
}

/// A unique, sortable identifier for one stored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId {
    allocation: Allocation,
    token: Uuid,
}

impl EventId {
    /// Build a new identifier with a fresh random token.
    pub fn generate(allocation: Allocation) -> Self {
        Self {
            allocation,
            token: Uuid::new_v4(),
        }
    }

    pub fn allocation(&self) -> Allocation {
        self.allocation
    }

    pub fn token(&self) -> Uuid {
        self.token
    }

    /// `<id>.json`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self, FILE_EXTENSION)
    }

    /// Recover an identifier from a stored file or object name.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(FILE_EXTENSION)?.strip_suffix('.')?;
        stem.parse().ok()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.allocation, SEPARATOR, self.token.hyphenated())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed event identifier: {0:?}")]
pub struct ParseEventIdError(pub String);

impl FromStr for EventId {
    type Err = ParseEventIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseEventIdError(s.to_string());

        let (prefix, token) = s.split_once(SEPARATOR).ok_or_else(err)?;
        if prefix.len() < SEQUENCE_WIDTH || !prefix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let n: u64 = prefix.parse().map_err(|_| err())?;

        // Only the canonical hyphenated lowercase form round-trips through Display.
        let token = Uuid::parse_str(token).map_err(|_| err())?;
        let id = EventId {
            allocation: Allocation::from_component(n),
            token,
        };
        if id.to_string() != s {
            return Err(err());
        }
        Ok(id)
    }
}

/// Numeric order of the allocation component, then the token.
/// Sequences sort before fallback timestamps.
impl Ord for EventId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.allocation
            .cmp(&other.allocation)
            .then_with(|| self.token.cmp(&other.token))
    }
}

impl PartialOrd for EventId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
