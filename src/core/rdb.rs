// src/core/rdb.rs

//! A minimal RDB (Redis persistence file) loader.
//!
//! This server never *writes* an RDB file — the snapshot it hands a syncing
//! replica is the fixed [`super::replication::empty_rdb_snapshot`] blob — but
//! it still loads one at startup if `--dir`/`--dbfilename` point at an
//! existing file, so a primary can be restarted without losing its keyspace.
//!
//! Only the opcodes a string+stream keyspace can actually produce are
//! handled: AUX metadata, SELECTDB, RESIZEDB, the two expiry-time opcodes,
//! and EOF. Length encoding follows the canonical big-endian 32-bit form for
//! the 0b10 prefix (see REDESIGN FLAGS in DESIGN.md) rather than the
//! inconsistent byte order some source implementations use.

use crate::core::errors::DbError;
use crate::core::storage::data_types::StoredValue;
use crate::core::storage::db::Db;
use bytes::Bytes;
use std::path::Path;
use tracing::{debug, info, warn};

const OP_AUX: u8 = 0xFA;
const OP_RESIZEDB: u8 = 0xFB;
const OP_EXPIRETIME_MS: u8 = 0xFC;
const OP_EXPIRETIME: u8 = 0xFD;
const OP_SELECTDB: u8 = 0xFE;
const OP_EOF: u8 = 0xFF;

const TYPE_STRING: u8 = 0x00;

/// Loads `<dir>/<dbfilename>` into `db`, if that file exists. A missing file
/// is not an error — an empty keyspace is a perfectly valid starting state.
pub async fn load_rdb_file(db: &Db, dir: &Path, dbfilename: &str) -> Result<(), DbError> {
    let path = dir.join(dbfilename);
    let bytes = match std::fs::read(&path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("no RDB file at {:?}, starting with an empty keyspace", path);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let loaded = load_rdb_bytes(db, &bytes).await?;
    info!("loaded {} keys from {:?}", loaded, path);
    Ok(())
}

async fn load_rdb_bytes(db: &Db, bytes: &[u8]) -> Result<usize, DbError> {
    let mut cursor = Cursor::new(bytes);
    parse_header(&mut cursor)?;

    let mut loaded = 0usize;
    let mut pending_expiry_ms: Option<u64> = None;

    loop {
        let opcode = match cursor.read_u8() {
            Ok(b) => b,
            Err(_) => break,
        };
        match opcode {
            OP_EOF => break,
            OP_SELECTDB => {
                read_length(&mut cursor)?;
            }
            OP_RESIZEDB => {
                read_length(&mut cursor)?;
                read_length(&mut cursor)?;
            }
            OP_AUX => {
                read_string(&mut cursor)?;
                read_string(&mut cursor)?;
            }
            OP_EXPIRETIME_MS => {
                let ms = cursor.read_u64_le()?;
                pending_expiry_ms = Some(ms);
            }
            OP_EXPIRETIME => {
                let secs = cursor.read_u32_le()?;
                pending_expiry_ms = Some(secs as u64 * 1000);
            }
            value_type => {
                let key = read_string(&mut cursor)?;
                let value = read_value(&mut cursor, value_type)?;
                let expires_at = pending_expiry_ms.take();

                if let Some(exp) = expires_at {
                    if exp <= crate::core::storage::data_types::now_ms() {
                        continue;
                    }
                }
                db.insert_from_load(key, StoredValue::new_string(value, expires_at))
                    .await;
                loaded += 1;
            }
        }
    }

    Ok(loaded)
}

fn read_value(cursor: &mut Cursor, value_type: u8) -> Result<Bytes, DbError> {
    match value_type {
        TYPE_STRING => read_string(cursor),
        other => {
            warn!("skipping unsupported RDB value type 0x{:02x}", other);
            Err(DbError::Internal(format!(
                "unsupported RDB value type 0x{other:02x}"
            )))
        }
    }
}

fn parse_header(cursor: &mut Cursor) -> Result<(), DbError> {
    let header = cursor.read_exact_bytes(9)?;
    if &header[0..5] != b"REDIS" {
        return Err(DbError::Internal("not an RDB file: bad magic".into()));
    }
    let version_str = std::str::from_utf8(&header[5..9])
        .map_err(|_| DbError::Internal("bad RDB version digits".into()))?;
    let version: u32 = version_str
        .parse()
        .map_err(|_| DbError::Internal("bad RDB version digits".into()))?;
    if !(2..=7).contains(&version) {
        return Err(DbError::Internal(format!(
            "unsupported RDB version {version}"
        )));
    }
    Ok(())
}

enum LengthResult {
    Len(usize),
    /// A special string encoding: 0 = int8, 1 = int16 LE, 2 = int32 LE, 3 = LZF.
    Encoded(u8),
}

fn read_length(cursor: &mut Cursor) -> Result<LengthResult, DbError> {
    let first = cursor.read_u8()?;
    match first >> 6 {
        0b00 => Ok(LengthResult::Len((first & 0x3F) as usize)),
        0b01 => {
            let second = cursor.read_u8()?;
            Ok(LengthResult::Len((((first & 0x3F) as usize) << 8) | second as usize))
        }
        0b10 => {
            let bytes = cursor.read_exact_bytes(4)?;
            let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            Ok(LengthResult::Len(len as usize))
        }
        _ => Ok(LengthResult::Encoded(first & 0x3F)),
    }
}

fn read_string(cursor: &mut Cursor) -> Result<Bytes, DbError> {
    match read_length(cursor)? {
        LengthResult::Len(len) => Ok(Bytes::from(cursor.read_exact_bytes(len)?)),
        LengthResult::Encoded(0) => {
            let v = cursor.read_u8()? as i8;
            Ok(Bytes::from(v.to_string().into_bytes()))
        }
        LengthResult::Encoded(1) => {
            let bytes = cursor.read_exact_bytes(2)?;
            let v = i16::from_le_bytes([bytes[0], bytes[1]]);
            Ok(Bytes::from(v.to_string().into_bytes()))
        }
        LengthResult::Encoded(2) => {
            let bytes = cursor.read_exact_bytes(4)?;
            let v = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            Ok(Bytes::from(v.to_string().into_bytes()))
        }
        LengthResult::Encoded(_) => Err(DbError::Internal(
            "LZF-compressed RDB strings are not supported".into(),
        )),
    }
}

/// A thin cursor over an in-memory byte slice; the whole file is read up
/// front since an empty-keyspace RDB snapshot is at most a few hundred bytes.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8, DbError> {
        Ok(self.read_exact_bytes(1)?[0])
    }

    fn read_u32_le(&mut self) -> Result<u32, DbError> {
        let b = self.read_exact_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64_le(&mut self) -> Result<u64, DbError> {
        let b = self.read_exact_bytes(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn read_exact_bytes(&mut self, n: usize) -> Result<Vec<u8>, DbError> {
        if self.pos + n > self.data.len() {
            return Err(DbError::IncompleteData);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_minimal_rdb(key: &[u8], value: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"REDIS0011");
        out.push(OP_SELECTDB);
        out.push(0x00);
        out.push(TYPE_STRING);
        out.push(key.len() as u8);
        out.extend_from_slice(key);
        out.push(value.len() as u8);
        out.extend_from_slice(value);
        out.push(OP_EOF);
        out.extend_from_slice(&[0u8; 8]);
        out
    }

    #[tokio::test]
    async fn loads_a_plain_string_key() {
        let db = Db::new();
        let bytes = build_minimal_rdb(b"foo", b"bar");
        let loaded = load_rdb_bytes(&db, &bytes).await.unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(
            db.get(&Bytes::from_static(b"foo")).await.unwrap(),
            Some(Bytes::from_static(b"bar"))
        );
    }

    #[tokio::test]
    async fn rejects_bad_magic() {
        let db = Db::new();
        let bytes = b"GARBAGE00".to_vec();
        assert!(load_rdb_bytes(&db, &bytes).await.is_err());
    }

    #[tokio::test]
    async fn discards_already_expired_key() {
        let db = Db::new();
        let mut out = Vec::new();
        out.extend_from_slice(b"REDIS0011");
        out.push(OP_EXPIRETIME_MS);
        out.extend_from_slice(&1u64.to_le_bytes());
        out.push(TYPE_STRING);
        out.push(3);
        out.extend_from_slice(b"foo");
        out.push(3);
        out.extend_from_slice(b"bar");
        out.push(OP_EOF);
        out.extend_from_slice(&[0u8; 8]);

        let loaded = load_rdb_bytes(&db, &out).await.unwrap();
        assert_eq!(loaded, 0);
        assert_eq!(db.get(&Bytes::from_static(b"foo")).await.unwrap(), None);
    }
}
