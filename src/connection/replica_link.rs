// src/connection/replica_link.rs

//! The replica side of an attached primary connection: after the handshake
//! completes, this task reads propagated commands (and `REPLCONF GETACK`)
//! forever, applying them to the local keyspace and tracking the consumed
//! byte offset.

use crate::core::commands::{parse_command, Command};
use crate::core::dispatch::ServerContext;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use crate::core::replication::HandshakeOutcome;
use bytes::BytesMut;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::codec::Decoder;
use tracing::{info, warn};

/// Runs until the primary connection errors or closes. Per §7, a replica
/// that loses its primary connection stays non-replicating until the
/// process is restarted — there is no reconnect loop here.
pub async fn run_replica_link(ctx: Arc<ServerContext>, mut outcome: HandshakeOutcome) {
    *ctx.repl.repl_id.write().await = outcome.repl_id.clone();
    ctx.repl.offset.store(outcome.offset, Ordering::SeqCst);
    info!("replica link established, starting offset {}", outcome.offset);

    let mut buf = BytesMut::with_capacity(4096);
    let mut codec = RespFrameCodec;

    loop {
        let frame = match read_frame(&mut outcome.stream, &mut buf, &mut codec).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                warn!("primary connection closed");
                return;
            }
            Err(e) => {
                warn!("primary connection error: {e}");
                return;
            }
        };

        let raw_len = frame.encode_to_vec().len() as u64;
        let command = match parse_command(&frame) {
            Ok(c) => c,
            Err(e) => {
                warn!("unparseable command from primary: {e}");
                continue;
            }
        };

        match ctx.replica_ingest_dispatch(&command, raw_len).await {
            Ok(Some(offset_before)) => {
                debug_assert!(matches!(command, Command::ReplconfGetAck));
                let ack = RespFrame::command(&[
                    b"REPLCONF",
                    b"ACK",
                    offset_before.to_string().as_bytes(),
                ]);
                if outcome.stream.write_all(&ack.encode_to_vec()).await.is_err() {
                    warn!("failed to write REPLCONF ACK to primary");
                    return;
                }
                ctx.repl.add_offset(raw_len);
            }
            Ok(None) => {}
            Err(e) => warn!("error applying replicated command: {e}"),
        }
    }
}

async fn read_frame<R: tokio::io::AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut BytesMut,
    codec: &mut RespFrameCodec,
) -> Result<Option<RespFrame>, crate::core::errors::DbError> {
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
