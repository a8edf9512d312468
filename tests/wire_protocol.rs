// tests/wire_protocol.rs

//! End-to-end RESP wire tests: spin up the real accept loop over a loopback
//! socket and drive it with raw bytes, the way a client actually would.

use emberdb::connection::handle_client_connection;
use emberdb::core::dispatch::ServerContext;
use emberdb::core::pubsub::PubSubBus;
use emberdb::core::replication::ReplicationState;
use emberdb::core::storage::Db;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn spawn_test_server() -> std::net::SocketAddr {
    let ctx = Arc::new(ServerContext {
        db: Arc::new(Db::new()),
        repl: ReplicationState::new_primary(),
        pubsub: Arc::new(PubSubBus::new()),
        dir: ".".to_string(),
        dbfilename: "dump.rdb".to_string(),
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let ctx = ctx.clone();
            tokio::spawn(handle_client_connection(stream, ctx));
        }
    });
    addr
}

async fn read_reply(stream: &mut TcpStream) -> String {
    let mut buf = vec![0u8; 4096];
    let n = tokio::time::timeout(Duration::from_secs(1), stream.read(&mut buf))
        .await
        .expect("timed out waiting for a reply")
        .unwrap();
    String::from_utf8_lossy(&buf[..n]).to_string()
}

#[tokio::test]
async fn set_get_del_roundtrip() {
    let addr = spawn_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n")
        .await
        .unwrap();
    assert_eq!(read_reply(&mut stream).await, "+OK\r\n");

    stream
        .write_all(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n")
        .await
        .unwrap();
    assert_eq!(read_reply(&mut stream).await, "$1\r\nv\r\n");

    stream
        .write_all(b"*2\r\n$3\r\nDEL\r\n$1\r\nk\r\n")
        .await
        .unwrap();
    assert_eq!(read_reply(&mut stream).await, "+OK\r\n");

    stream
        .write_all(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n")
        .await
        .unwrap();
    assert_eq!(read_reply(&mut stream).await, "$-1\r\n");
}

#[tokio::test]
async fn unknown_command_replies_with_an_error_frame() {
    let addr = spawn_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(b"*1\r\n$10\r\nFROBNICATE\r\n")
        .await
        .unwrap();
    let reply = read_reply(&mut stream).await;
    assert!(reply.starts_with('-'), "expected an error frame, got {reply:?}");

    // the connection stays open after a rejected command
    stream
        .write_all(b"*1\r\n$4\r\nPING\r\n")
        .await
        .unwrap();
    assert_eq!(read_reply(&mut stream).await, "+PONG\r\n");
}

#[tokio::test]
async fn xadd_then_xrange_sees_the_appended_entry() {
    let addr = spawn_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(b"*5\r\n$4\r\nXADD\r\n$1\r\ns\r\n$3\r\n1-*\r\n$5\r\nfield\r\n$3\r\nval\r\n")
        .await
        .unwrap();
    let reply = read_reply(&mut stream).await;
    assert_eq!(reply, "$3\r\n1-0\r\n");

    stream
        .write_all(b"*4\r\n$6\r\nXRANGE\r\n$1\r\ns\r\n$1\r\n-\r\n$1\r\n+\r\n")
        .await
        .unwrap();
    let reply = read_reply(&mut stream).await;
    assert!(reply.contains("1-0"));
    assert!(reply.contains("field"));
    assert!(reply.contains("val"));
}

#[tokio::test]
async fn blocking_xread_wakes_on_a_concurrent_xadd() {
    let addr = spawn_test_server().await;
    let mut reader = TcpStream::connect(addr).await.unwrap();
    let mut writer = TcpStream::connect(addr).await.unwrap();

    reader
        .write_all(b"*6\r\n$5\r\nXREAD\r\n$5\r\nBLOCK\r\n$4\r\n5000\r\n$7\r\nSTREAMS\r\n$1\r\ns\r\n$1\r\n$\r\n")
        .await
        .unwrap();

    // give the blocking reader a moment to subscribe before the XADD fires
    tokio::time::sleep(Duration::from_millis(50)).await;
    writer
        .write_all(b"*5\r\n$4\r\nXADD\r\n$1\r\ns\r\n$1\r\n*\r\n$5\r\nfield\r\n$3\r\nval\r\n")
        .await
        .unwrap();
    let _ = read_reply(&mut writer).await;

    let reply = tokio::time::timeout(Duration::from_secs(2), async {
        read_reply(&mut reader).await
    })
    .await
    .expect("blocking XREAD never woke up");
    assert!(reply.contains("field"));
    assert!(reply.contains("val"));
}

#[tokio::test]
async fn blocking_xread_on_two_streams_waits_for_both_before_replying() {
    let addr = spawn_test_server().await;
    let mut reader = TcpStream::connect(addr).await.unwrap();
    let mut writer = TcpStream::connect(addr).await.unwrap();

    reader
        .write_all(
            b"*8\r\n$5\r\nXREAD\r\n$5\r\nBLOCK\r\n$4\r\n5000\r\n\
$7\r\nSTREAMS\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\n$\r\n$1\r\n$\r\n",
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    writer
        .write_all(b"*5\r\n$4\r\nXADD\r\n$1\r\na\r\n$1\r\n*\r\n$5\r\nfield\r\n$3\r\nval\r\n")
        .await
        .unwrap();
    let _ = read_reply(&mut writer).await;

    // only one of the two requested streams has data so far; the blocked
    // reader must not have replied yet.
    let premature = tokio::time::timeout(Duration::from_millis(200), read_reply(&mut reader)).await;
    assert!(premature.is_err(), "XREAD replied before every key had data");

    writer
        .write_all(b"*5\r\n$4\r\nXADD\r\n$1\r\nb\r\n$1\r\n*\r\n$5\r\nfield\r\n$3\r\nval2\r\n")
        .await
        .unwrap();
    let _ = read_reply(&mut writer).await;

    let reply = tokio::time::timeout(Duration::from_secs(2), read_reply(&mut reader))
        .await
        .expect("blocking XREAD never woke up after both streams had data");
    assert!(reply.contains('a'));
    assert!(reply.contains('b'));
}

#[tokio::test]
async fn xrange_on_an_empty_range_returns_a_null_array() {
    let addr = spawn_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(b"*4\r\n$6\r\nXRANGE\r\n$1\r\ns\r\n$1\r\n-\r\n$1\r\n+\r\n")
        .await
        .unwrap();
    assert_eq!(read_reply(&mut stream).await, "*-1\r\n");
}

#[tokio::test]
async fn non_blocking_xread_with_no_new_data_returns_a_null_array() {
    let addr = spawn_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(b"*5\r\n$4\r\nXADD\r\n$1\r\ns\r\n$1\r\n*\r\n$5\r\nfield\r\n$3\r\nval\r\n")
        .await
        .unwrap();
    let reply = read_reply(&mut stream).await;
    // bulk-string reply shape is `$<len>\r\n<id>\r\n`; the id is the middle line.
    let id = reply.split("\r\n").nth(1).unwrap();

    stream
        .write_all(
            format!("*4\r\n$5\r\nXREAD\r\n$7\r\nSTREAMS\r\n$1\r\ns\r\n${}\r\n{id}\r\n", id.len())
                .as_bytes(),
        )
        .await
        .unwrap();
    assert_eq!(read_reply(&mut stream).await, "*-1\r\n");
}

#[tokio::test]
async fn wait_with_no_replicas_attached_returns_zero_immediately() {
    let addr = spawn_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(b"*3\r\n$4\r\nWAIT\r\n$1\r\n0\r\n$3\r\n100\r\n")
        .await
        .unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(1), read_reply(&mut stream))
        .await
        .unwrap();
    assert_eq!(reply, ":0\r\n");
}

#[tokio::test]
async fn config_get_reports_the_configured_dir() {
    let addr = spawn_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(b"*3\r\n$6\r\nCONFIG\r\n$3\r\nGET\r\n$3\r\ndir\r\n")
        .await
        .unwrap();
    let reply = read_reply(&mut stream).await;
    assert!(reply.contains("dir"));
    assert!(reply.ends_with(&format!("$1\r\n.\r\n")));
}

#[tokio::test]
async fn set_on_a_stream_key_reports_wrong_type_on_xrange() {
    let addr = spawn_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(b"*3\r\n$3\r\nSET\r\n$1\r\ns\r\n$1\r\nv\r\n")
        .await
        .unwrap();
    assert_eq!(read_reply(&mut stream).await, "+OK\r\n");

    stream
        .write_all(b"*4\r\n$6\r\nXRANGE\r\n$1\r\ns\r\n$1\r\n-\r\n$1\r\n+\r\n")
        .await
        .unwrap();
    let reply = read_reply(&mut stream).await;
    assert!(reply.starts_with("-WRONGTYPE"));
}
