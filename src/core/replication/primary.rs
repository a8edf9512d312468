// src/core/replication/primary.rs

//! Primary-side propagation: writing mutating commands out to every attached
//! replica connection, and the `WAIT` quorum coordinator.

use super::state::ReplicationState;
use crate::core::protocol::RespFrame;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tracing::warn;

/// A single attached replica connection. Each handle owns its own write
/// lock so that propagation to this replica is strictly sequential, which is
/// what keeps the total order guarantee in spec §5.
pub struct ReplicaHandle {
    pub addr: SocketAddr,
    pub listening_port: Mutex<Option<u16>>,
    writer: Mutex<OwnedWriteHalf>,
}

impl ReplicaHandle {
    pub fn new(addr: SocketAddr, writer: OwnedWriteHalf) -> Self {
        Self {
            addr,
            listening_port: Mutex::new(None),
            writer: Mutex::new(writer),
        }
    }

    async fn write_all(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut w = self.writer.lock().await;
        w.write_all(bytes).await?;
        w.flush().await
    }
}

/// Serializes `frame` and writes it to every attached replica connection, in
/// the order replicas appear in the registry (arbitrary but stable), then
/// advances the primary's replication offset by the frame's exact byte
/// length — unconditionally, so a replica attaching later sees a consistent
/// offset history regardless of how many replicas were attached at the time
/// of any individual write.
pub async fn propagate(state: &ReplicationState, frame: &RespFrame) -> u64 {
    let encoded = frame.encode_to_vec();
    let len = encoded.len() as u64;

    let replicas = state.replicas.lock().await;
    for replica in replicas.iter() {
        if let Err(e) = replica.write_all(&encoded).await {
            warn!("failed to propagate to replica {}: {}", replica.addr, e);
        }
    }
    drop(replicas);

    state.add_offset(len);
    len
}

/// Implements `WAIT numreplicas timeoutMs` (spec §4.6).
pub async fn wait_for_replicas(
    state: &ReplicationState,
    numreplicas: usize,
    timeout_ms: u64,
) -> i64 {
    let replica_count = state.replicas.lock().await.len();
    if numreplicas == 0 {
        return replica_count as i64;
    }

    let getack = RespFrame::command(&[b"REPLCONF", b"GETACK", b"*"]);
    propagate(state, &getack).await;

    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    let mut acks: usize = 0;
    let mut rx = state.ack_rx.lock().await;
    let mut timed_out = false;

    while acks < numreplicas {
        let now = tokio::time::Instant::now();
        if now >= deadline {
            timed_out = true;
            break;
        }
        match tokio::time::timeout(deadline - now, rx.recv()).await {
            Ok(Some(())) => acks += 1,
            Ok(None) => break,
            Err(_) => {
                timed_out = true;
                break;
            }
        }
    }

    if timed_out && acks == 0 {
        replica_count as i64
    } else {
        acks as i64
    }
}
