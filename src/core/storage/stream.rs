// src/core/storage/stream.rs

//! The append-only stream data type: strictly-ordered `StreamId`s, records of
//! alternating field/value bytes, and the add/range/read operations over them.
//!
//! Entries are kept in a plain `Vec` and the "is this id greater than the
//! last one" check re-reads the last element, mirroring the shape of the
//! original source this was distilled from. A sorted secondary index would
//! speed up range scans on long streams; see DESIGN.md for why that upgrade
//! is deferred.

use crate::core::errors::DbError;
use bytes::Bytes;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A `(ms, seq)` pair, compared numerically — never by string lexicography.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MAX: StreamId = StreamId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// How an `XADD`/`XRANGE` id argument resolves to a concrete `StreamId`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdSpec {
    /// `*` — fully auto-generated.
    Auto,
    /// `<ms>-*` — sequence auto-generated within a fixed millisecond.
    AutoSeq(u64),
    /// A fully explicit `<ms>-<seq>`.
    Explicit(StreamId),
}

/// Parses an `XADD` id argument (`*`, `<ms>-*`, or `<ms>-<seq>`).
pub fn parse_add_id_spec(s: &str) -> Result<IdSpec, DbError> {
    if s == "*" {
        return Ok(IdSpec::Auto);
    }
    let (ms_part, seq_part) = s.split_once('-').ok_or(DbError::SyntaxError)?;
    let ms: u64 = ms_part.parse().map_err(|_| DbError::SyntaxError)?;
    if seq_part == "*" {
        return Ok(IdSpec::AutoSeq(ms));
    }
    let seq: u64 = seq_part.parse().map_err(|_| DbError::SyntaxError)?;
    Ok(IdSpec::Explicit(StreamId::new(ms, seq)))
}

/// Parses a range bound (`XRANGE`/`XREAD`): `-`, `+`, a bare `ms`, or `ms-seq`.
pub fn parse_range_bound(s: &str, is_start: bool) -> Result<StreamId, DbError> {
    match s {
        "-" => Ok(StreamId::MIN),
        "+" => Ok(StreamId::MAX),
        other => {
            if let Some((ms_part, seq_part)) = other.split_once('-') {
                let ms: u64 = ms_part.parse().map_err(|_| DbError::SyntaxError)?;
                let seq: u64 = seq_part.parse().map_err(|_| DbError::SyntaxError)?;
                Ok(StreamId::new(ms, seq))
            } else {
                let ms: u64 = other.parse().map_err(|_| DbError::SyntaxError)?;
                // A partial bound fixes the sequence to the bound's natural edge:
                // 0 for a lower bound, u64::MAX for an upper bound.
                Ok(StreamId::new(ms, if is_start { 0 } else { u64::MAX }))
            }
        }
    }
}

/// A single appended record: its id and an ordered name/value field sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<Bytes>,
}

/// An append-only stream: a strictly increasing sequence of `StreamEntry`.
#[derive(Debug, Clone, Default)]
pub struct Stream {
    entries: Vec<StreamEntry>,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_id(&self) -> Option<StreamId> {
        self.entries.last().map(|e| e.id)
    }

    /// Resolves an `IdSpec` against the stream's current tail, then appends
    /// the record if and only if the resolved id is strictly greater than
    /// the stream's last id. Returns the id actually assigned.
    pub fn add(&mut self, spec: IdSpec, fields: Vec<Bytes>) -> Result<StreamId, DbError> {
        let id = match spec {
            IdSpec::Explicit(id) => id,
            IdSpec::Auto => {
                let now = now_ms();
                match self.last_id() {
                    Some(last) if last.ms < now => StreamId::new(now, 0),
                    Some(last) => StreamId::new(now, last.seq + 1),
                    None => StreamId::new(now, 0),
                }
            }
            IdSpec::AutoSeq(ms) => match self.last_id() {
                Some(last) if last.ms == ms => StreamId::new(ms, last.seq + 1),
                _ => StreamId::new(ms, if ms == 0 { 1 } else { 0 }),
            },
        };

        if id == StreamId::MIN {
            return Err(DbError::XaddIdTooSmall);
        }
        if let Some(last) = self.last_id() {
            if id <= last {
                return Err(DbError::XaddIdNotIncreasing);
            }
        }

        self.entries.push(StreamEntry { id, fields });
        Ok(id)
    }

    /// Inclusive range scan, numerically ordered.
    pub fn range(&self, start: StreamId, end: StreamId) -> Vec<StreamEntry> {
        self.entries
            .iter()
            .filter(|e| e.id >= start && e.id <= end)
            .cloned()
            .collect()
    }

    /// All records strictly greater than `since`.
    pub fn read_after(&self, since: StreamId) -> Vec<StreamEntry> {
        self.entries
            .iter()
            .filter(|e| e.id > since)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_zero() {
        let mut s = Stream::new();
        let err = s.add(IdSpec::Explicit(StreamId::new(0, 0)), vec![]).unwrap_err();
        assert!(matches!(err, DbError::XaddIdTooSmall));
    }

    #[test]
    fn rejects_non_increasing_id() {
        let mut s = Stream::new();
        s.add(IdSpec::Explicit(StreamId::new(5, 0)), vec![]).unwrap();
        let err = s.add(IdSpec::Explicit(StreamId::new(5, 0)), vec![]).unwrap_err();
        assert!(matches!(err, DbError::XaddIdNotIncreasing));
        let err = s.add(IdSpec::Explicit(StreamId::new(4, 9)), vec![]).unwrap_err();
        assert!(matches!(err, DbError::XaddIdNotIncreasing));
    }

    #[test]
    fn seq_wildcard_at_ms_zero() {
        let mut s = Stream::new();
        let id1 = s.add(IdSpec::AutoSeq(0), vec![]).unwrap();
        assert_eq!(id1, StreamId::new(0, 1));
        let id2 = s.add(IdSpec::AutoSeq(0), vec![]).unwrap();
        assert_eq!(id2, StreamId::new(0, 2));
        let id3 = s.add(IdSpec::AutoSeq(5), vec![]).unwrap();
        assert_eq!(id3, StreamId::new(5, 0));
    }

    #[test]
    fn range_is_inclusive_and_numeric() {
        let mut s = Stream::new();
        s.add(IdSpec::Explicit(StreamId::new(1, 0)), vec![Bytes::from_static(b"a")])
            .unwrap();
        s.add(IdSpec::Explicit(StreamId::new(2, 0)), vec![Bytes::from_static(b"b")])
            .unwrap();
        s.add(IdSpec::Explicit(StreamId::new(10, 0)), vec![Bytes::from_static(b"c")])
            .unwrap();
        let r = s.range(StreamId::new(2, 0), StreamId::new(9, 0));
        assert_eq!(r.len(), 1);
        assert_eq!(r[0].id, StreamId::new(2, 0));
    }
}
