// src/connection/client.rs

//! The per-client connection task: read a command, dispatch it, write the
//! reply, repeat — except for `PSYNC`, which hands the connection's write
//! half to the replica registry and keeps only a read loop watching for
//! `REPLCONF ACK`.

use crate::core::commands::parse_command;
use crate::core::dispatch::{DispatchOutcome, ServerContext};
use crate::core::errors::DbError;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use crate::core::replication::ReplicaHandle;
use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Decoder;
use tracing::{debug, warn};

const READ_CHUNK: usize = 4096;

pub async fn handle_client_connection(mut stream: TcpStream, ctx: Arc<ServerContext>) {
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let mut codec = RespFrameCodec;

    loop {
        let frame = match read_frame(&mut stream, &mut buf, &mut codec).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                debug!("closing connection on protocol error: {e}");
                return;
            }
        };

        let command = match parse_command(&frame) {
            Ok(c) => c,
            Err(e) => {
                if reply_error_or_close(&mut stream, &e).await.is_break() {
                    return;
                }
                continue;
            }
        };

        let outcome = match ctx.client_dispatch(command, &frame).await {
            Ok(o) => o,
            Err(e) => {
                if reply_error_or_close(&mut stream, &e).await.is_break() {
                    return;
                }
                continue;
            }
        };

        match outcome {
            DispatchOutcome::Reply(reply) => {
                if write_frame(&mut stream, reply).await.is_err() {
                    return;
                }
            }
            DispatchOutcome::NoReply => {}
            DispatchOutcome::BecomeReplica { handshake_reply } => {
                if stream.write_all(&handshake_reply).await.is_err() {
                    return;
                }
                become_replica(stream, buf, ctx).await;
                return;
            }
        }
    }
}

enum ErrorAction {
    Continue,
    Break,
}

impl ErrorAction {
    fn is_break(&self) -> bool {
        matches!(self, ErrorAction::Break)
    }
}

/// Maps a domain error onto the error-reply-and-continue vs.
/// close-the-connection split from §7.
async fn reply_error_or_close(stream: &mut TcpStream, e: &DbError) -> ErrorAction {
    match error_reply(e) {
        Some(reply) => {
            if write_frame(stream, reply).await.is_err() {
                ErrorAction::Break
            } else {
                ErrorAction::Continue
            }
        }
        None => ErrorAction::Break,
    }
}

fn error_reply(e: &DbError) -> Option<RespFrame> {
    match e {
        DbError::InvalidCommand | DbError::UnknownCommand(_) | DbError::SyntaxError => {
            Some(RespFrame::Error("ERR Invalid Command".into()))
        }
        DbError::WrongType => Some(RespFrame::Error(
            "WRONGTYPE Operation against a key holding the wrong kind of value".into(),
        )),
        DbError::NotAnInteger => Some(RespFrame::Error(
            "ERR value is not an integer or out of range".into(),
        )),
        DbError::XaddIdTooSmall => Some(RespFrame::Error(
            "ERR The ID specified in XADD must be greater than 0-0".into(),
        )),
        DbError::XaddIdNotIncreasing => Some(RespFrame::Error(
            "ERR The ID specified in XADD is equal or smaller than the target stream top item"
                .into(),
        )),
        DbError::IncompleteData
        | DbError::Io(_)
        | DbError::ReplicationError(_)
        | DbError::Internal(_) => None,
    }
}

/// After `PSYNC`, this connection becomes a replica feed: the write half is
/// registered so every future propagated command reaches it, and the read
/// half is kept alive only to watch for `REPLCONF ACK` replies.
async fn become_replica(stream: TcpStream, mut buf: BytesMut, ctx: Arc<ServerContext>) {
    let addr = match stream.peer_addr() {
        Ok(a) => a,
        Err(_) => return,
    };
    let (mut read_half, write_half) = stream.into_split();
    let handle = Arc::new(ReplicaHandle::new(addr, write_half));
    ctx.repl.replicas.lock().await.push(handle.clone());
    debug!("replica attached: {addr}");

    let mut codec = RespFrameCodec;
    loop {
        let frame = match read_frame(&mut read_half, &mut buf, &mut codec).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!("replica {addr} connection error: {e}");
                break;
            }
        };
        if let Ok(command) = parse_command(&frame) {
            if let crate::core::commands::Command::ReplconfAck(_) = command {
                let _ = ctx.repl.ack_tx.send(()).await;
            }
        }
    }

    ctx.repl
        .replicas
        .lock()
        .await
        .retain(|r| !Arc::ptr_eq(r, &handle));
    debug!("replica detached: {addr}");
}

async fn read_frame<R: AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut BytesMut,
    codec: &mut RespFrameCodec,
) -> Result<Option<RespFrame>, DbError> {
    loop {
        if let Some(frame) = codec.decode(buf)? {
            return Ok(Some(frame));
        }
        let n = stream.read_buf(buf).await?;
        if n == 0 {
            return Ok(None);
        }
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(stream: &mut W, frame: RespFrame) -> Result<(), DbError> {
    stream.write_all(&frame.encode_to_vec()).await?;
    Ok(())
}
