// src/core/replication/handshake.rs

//! The replica side of the sync handshake: `PING` → `REPLCONF listening-port`
//! → `REPLCONF capa psync2` → `PSYNC ? -1`, followed by consuming the
//! `FULLRESYNC` reply and its RDB snapshot payload (spec §4.6, §6).

use crate::core::errors::DbError;
use crate::core::protocol::RespFrame;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::info;

/// Everything a replica learns from a completed handshake: the primary's
/// connection (now positioned right after the snapshot payload, ready to
/// read the live command stream) plus the replication id and starting
/// offset the `FULLRESYNC` reply carried.
pub struct HandshakeOutcome {
    pub stream: BufReader<TcpStream>,
    pub repl_id: String,
    pub offset: u64,
}

/// Drives the handshake against `host:port` and consumes the full-resync
/// snapshot, leaving the stream positioned to read propagated commands.
pub async fn run_replica_handshake(
    host: &str,
    port: u16,
    listening_port: u16,
) -> Result<HandshakeOutcome, DbError> {
    let stream = TcpStream::connect((host, port)).await?;
    let mut stream = BufReader::new(stream);

    send_command(&mut stream, &[b"PING"]).await?;
    let reply = read_line(&mut stream).await?;
    expect_simple_string(&reply, "PONG")?;

    let port_str = listening_port.to_string();
    send_command(
        &mut stream,
        &[b"REPLCONF", b"listening-port", port_str.as_bytes()],
    )
    .await?;
    expect_simple_string(&read_line(&mut stream).await?, "OK")?;

    send_command(&mut stream, &[b"REPLCONF", b"capa", b"psync2"]).await?;
    expect_simple_string(&read_line(&mut stream).await?, "OK")?;

    send_command(&mut stream, &[b"PSYNC", b"?", b"-1"]).await?;
    let fullresync = read_line(&mut stream).await?;
    let (repl_id, offset) = parse_fullresync(&fullresync)?;
    info!(repl_id = %repl_id, offset, "received FULLRESYNC");

    consume_rdb_snapshot(&mut stream).await?;

    Ok(HandshakeOutcome {
        stream,
        repl_id,
        offset,
    })
}

async fn send_command(stream: &mut BufReader<TcpStream>, parts: &[&[u8]]) -> Result<(), DbError> {
    let encoded = RespFrame::command(parts).encode_to_vec();
    stream.get_mut().write_all(&encoded).await?;
    Ok(())
}

/// Reads a single CRLF-terminated line (used for the `+PONG`/`+OK`/
/// `+FULLRESYNC ...` replies, which are simple strings, not full RESP
/// frames worth routing through the codec).
async fn read_line(stream: &mut BufReader<TcpStream>) -> Result<String, DbError> {
    use tokio::io::AsyncBufReadExt;
    let mut line = String::new();
    let n = stream.read_line(&mut line).await?;
    if n == 0 {
        return Err(DbError::Io(std::sync::Arc::new(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "primary closed connection during handshake",
        ))));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn expect_simple_string(line: &str, expected: &str) -> Result<(), DbError> {
    let body = line.strip_prefix('+').unwrap_or(line);
    if body.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(DbError::ReplicationError(format!(
            "expected +{expected}, got {line}"
        )))
    }
}

fn parse_fullresync(line: &str) -> Result<(String, u64), DbError> {
    let body = line.strip_prefix('+').unwrap_or(line);
    let mut parts = body.split_whitespace();
    let keyword = parts.next().unwrap_or("");
    if !keyword.eq_ignore_ascii_case("FULLRESYNC") {
        return Err(DbError::ReplicationError(format!(
            "expected FULLRESYNC, got {line}"
        )));
    }
    let repl_id = parts
        .next()
        .ok_or_else(|| DbError::ReplicationError("FULLRESYNC missing repl id".into()))?
        .to_string();
    let offset: u64 = parts
        .next()
        .ok_or_else(|| DbError::ReplicationError("FULLRESYNC missing offset".into()))?
        .parse()
        .map_err(|_| DbError::ReplicationError("FULLRESYNC offset is not a number".into()))?;
    Ok((repl_id, offset))
}

/// Reads the `$<len>\r\n<payload>` snapshot framing. Unlike an ordinary
/// bulk string, the payload has no trailing CRLF — it is a raw RDB file of
/// exactly `len` bytes.
async fn consume_rdb_snapshot(stream: &mut BufReader<TcpStream>) -> Result<(), DbError> {
    let header = read_line(stream).await?;
    let len_str = header
        .strip_prefix('$')
        .ok_or_else(|| DbError::ReplicationError(format!("expected $<len>, got {header}")))?;
    let len: usize = len_str
        .parse()
        .map_err(|_| DbError::ReplicationError("bad RDB snapshot length".into()))?;

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(())
}
