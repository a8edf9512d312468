// tests/rdb_load.rs

//! Exercises the RDB loader against a real file on disk (rather than an
//! in-memory byte slice, which the unit tests in `core::rdb` already cover).

use bytes::Bytes;
use emberdb::core::rdb::load_rdb_file;
use emberdb::core::storage::Db;
use std::path::Path;
use tempfile::tempdir;

fn minimal_rdb_with_one_key(key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"REDIS0011");
    out.push(0xFE); // SELECTDB
    out.push(0x00);
    out.push(0x00); // TYPE_STRING
    out.push(key.len() as u8);
    out.extend_from_slice(key);
    out.push(value.len() as u8);
    out.extend_from_slice(value);
    out.push(0xFF); // EOF
    out.extend_from_slice(&[0u8; 8]);
    out
}

#[tokio::test]
async fn loads_a_dump_file_from_the_configured_dir() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dump.rdb");
    std::fs::write(&path, minimal_rdb_with_one_key(b"greeting", b"hello")).unwrap();

    let db = Db::new();
    load_rdb_file(&db, dir.path(), "dump.rdb").await.unwrap();

    assert_eq!(
        db.get(&Bytes::from_static(b"greeting")).await.unwrap(),
        Some(Bytes::from_static(b"hello"))
    );
}

#[tokio::test]
async fn missing_dump_file_is_not_an_error() {
    let dir = tempdir().unwrap();
    let db = Db::new();
    assert!(load_rdb_file(&db, Path::new(dir.path()), "does-not-exist.rdb")
        .await
        .is_ok());
}
