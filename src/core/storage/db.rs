// src/core/storage/db.rs

//! The keyspace store: a single exclusive lock over a key→entry map.
//!
//! Spec-driven design choice (see DESIGN.md): the source's throughput targets
//! are modest enough that one `tokio::sync::Mutex` over the whole map is
//! adequate, and it removes an entire class of cross-shard ordering bugs that
//! a sharded map would otherwise need careful auditing to avoid. Stream
//! mutations hold the lock across the "look at last id, then append" window,
//! which is exactly the atomicity §4.2 requires.

use super::data_types::{now_ms, DataValue, StoredValue};
use super::stream::{IdSpec, Stream, StreamEntry, StreamId};
use crate::core::errors::DbError;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct Db {
    entries: Mutex<HashMap<Bytes, StoredValue>>,
}

impl Db {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches a string value. An expired string is treated as absent and is
    /// opportunistically deleted.
    pub async fn get(&self, key: &Bytes) -> Result<Option<Bytes>, DbError> {
        let mut guard = self.entries.lock().await;
        match guard.get(key) {
            Some(entry) if entry.is_expired() => {
                guard.remove(key);
                Ok(None)
            }
            Some(entry) => match &entry.data {
                DataValue::String(v) => Ok(Some(v.clone())),
                DataValue::Stream(_) => Err(DbError::WrongType),
            },
            None => Ok(None),
        }
    }

    /// Sets a string value. `ttl_ms == 0` means no expiry. Overwrites any
    /// existing entry regardless of its kind (a SET on a stream key replaces
    /// it with a string, per the keyspace invariant).
    pub async fn set(&self, key: Bytes, value: Bytes, ttl_ms: u64) {
        let expires_at = if ttl_ms == 0 {
            None
        } else {
            Some(now_ms() + ttl_ms)
        };
        let mut guard = self.entries.lock().await;
        guard.insert(key, StoredValue::new_string(value, expires_at));
    }

    pub async fn del(&self, key: &Bytes) -> bool {
        self.entries.lock().await.remove(key).is_some()
    }

    pub async fn keys(&self) -> Vec<Bytes> {
        let mut guard = self.entries.lock().await;
        guard.retain(|_, v| !v.is_expired());
        guard.keys().cloned().collect()
    }

    /// `TYPE` semantics: an expired string reads back as `"none"`.
    pub async fn type_of(&self, key: &Bytes) -> &'static str {
        let mut guard = self.entries.lock().await;
        match guard.get(key) {
            Some(entry) if entry.is_expired() => {
                guard.remove(key);
                "none"
            }
            Some(entry) => entry.data.type_name(),
            None => "none",
        }
    }

    /// Appends a record to the stream at `key`, creating an empty stream
    /// first if the key is absent. Returns the id actually assigned.
    pub async fn xadd(
        &self,
        key: &Bytes,
        spec: IdSpec,
        fields: Vec<Bytes>,
    ) -> Result<StreamId, DbError> {
        let mut guard = self.entries.lock().await;
        let entry = guard
            .entry(key.clone())
            .or_insert_with(|| StoredValue::new_stream(Stream::new()));
        match &mut entry.data {
            DataValue::Stream(stream) => stream.add(spec, fields),
            DataValue::String(_) => Err(DbError::WrongType),
        }
    }

    /// Inclusive range scan over a stream; empty if the key is absent or
    /// holds no records in range.
    pub async fn xrange(
        &self,
        key: &Bytes,
        start: StreamId,
        end: StreamId,
    ) -> Result<Vec<StreamEntry>, DbError> {
        let guard = self.entries.lock().await;
        match guard.get(key) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.data {
                DataValue::Stream(stream) => Ok(stream.range(start, end)),
                DataValue::String(_) => Err(DbError::WrongType),
            },
        }
    }

    /// Records with id strictly greater than `since`; empty if the key is
    /// absent or has nothing newer.
    pub async fn xread_since(
        &self,
        key: &Bytes,
        since: StreamId,
    ) -> Result<Vec<StreamEntry>, DbError> {
        let guard = self.entries.lock().await;
        match guard.get(key) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.data {
                DataValue::Stream(stream) => Ok(stream.read_after(since)),
                DataValue::String(_) => Err(DbError::WrongType),
            },
        }
    }

    /// The last id of a stream, used to resolve `XREAD ... $` to "now".
    pub async fn xlast_id(&self, key: &Bytes) -> StreamId {
        let guard = self.entries.lock().await;
        match guard.get(key) {
            Some(StoredValue {
                data: DataValue::Stream(stream),
                ..
            }) => stream.last_id().unwrap_or(StreamId::MIN),
            _ => StreamId::MIN,
        }
    }

    /// Inserts a value during RDB load, bypassing the normal SET path since
    /// the residual TTL has already been computed by the loader.
    pub async fn insert_from_load(&self, key: Bytes, value: StoredValue) {
        self.entries.lock().await.insert(key, value);
    }

    /// Removes every expired string entry. Used by the background sweeper.
    pub async fn sweep_expired(&self) -> usize {
        let mut guard = self.entries.lock().await;
        let before = guard.len();
        guard.retain(|_, v| !v.is_expired());
        before - guard.len()
    }
}
