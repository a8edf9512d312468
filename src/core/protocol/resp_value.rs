// src/core/protocol/resp_value.rs

//! A simplified value type produced by command execution, converted into a
//! wire-level `RespFrame` only at the point the reply is written out. This
//! keeps command handlers free of RESP framing details.

use super::RespFrame;
use crate::core::storage::stream::StreamEntry;
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(String),
    BulkString(Bytes),
    Integer(i64),
    Array(Vec<RespValue>),
    Null,
    NullArray,
    Error(String),
}

impl From<RespValue> for RespFrame {
    fn from(val: RespValue) -> Self {
        match val {
            RespValue::SimpleString(s) => RespFrame::SimpleString(s),
            RespValue::BulkString(b) => RespFrame::BulkString(b),
            RespValue::Integer(i) => RespFrame::Integer(i),
            RespValue::Array(items) => RespFrame::Array(items.into_iter().map(Into::into).collect()),
            RespValue::Null => RespFrame::Null,
            RespValue::NullArray => RespFrame::NullArray,
            RespValue::Error(s) => RespFrame::Error(s),
        }
    }
}

/// Encodes a single stream entry as `[bulkstring(id), array_of_bulks(fields)]`,
/// the element shape used by both `XRANGE` and `XREAD` replies.
pub fn encode_stream_entry(entry: &StreamEntry) -> RespValue {
    let fields = entry
        .fields
        .iter()
        .map(|f| RespValue::BulkString(f.clone()))
        .collect();
    RespValue::Array(vec![
        RespValue::BulkString(Bytes::from(entry.id.to_string())),
        RespValue::Array(fields),
    ])
}

/// Encodes a full stream-range reply: an array of entries as above.
pub fn encode_stream_range(entries: &[StreamEntry]) -> RespValue {
    RespValue::Array(entries.iter().map(encode_stream_entry).collect())
}

/// Encodes the named-stream reply `XREAD` returns: one `[key, range-reply]`
/// pair per requested key that produced at least one record.
pub fn encode_named_streams(results: &[(Bytes, Vec<StreamEntry>)]) -> RespValue {
    RespValue::Array(
        results
            .iter()
            .map(|(key, entries)| {
                RespValue::Array(vec![
                    RespValue::BulkString(key.clone()),
                    encode_stream_range(entries),
                ])
            })
            .collect(),
    )
}
