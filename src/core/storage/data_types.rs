// src/core/storage/data_types.rs

//! The value kinds a keyspace entry can hold, and the `StoredValue` wrapper
//! that pairs a value with its string-TTL metadata.

use super::stream::Stream;
use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};

/// The two entry kinds this keyspace supports. A key holds at most one.
#[derive(Debug, Clone)]
pub enum DataValue {
    String(Bytes),
    Stream(Stream),
}

impl DataValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            DataValue::String(_) => "string",
            DataValue::Stream(_) => "stream",
        }
    }
}

/// A keyspace entry: its value plus, for strings only, an absolute-millisecond
/// expiry. Streams never expire.
#[derive(Debug, Clone)]
pub struct StoredValue {
    pub data: DataValue,
    /// Absolute ms-since-epoch expiry; `None` means no TTL.
    pub expires_at: Option<u64>,
}

impl StoredValue {
    pub fn new_string(value: Bytes, expires_at: Option<u64>) -> Self {
        Self {
            data: DataValue::String(value),
            expires_at,
        }
    }

    pub fn new_stream(stream: Stream) -> Self {
        Self {
            data: DataValue::Stream(stream),
            expires_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => now_ms() >= at,
            None => false,
        }
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
