// src/core/replication/state.rs

use super::primary::ReplicaHandle;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};

#[derive(Debug, Clone)]
pub enum Role {
    Primary,
    Replica { host: String, port: u16 },
}

/// Node-wide replication state. One instance is shared (via `Arc`) by the
/// accept loop, every client/replica connection handler, and the WAIT
/// coordinator.
pub struct ReplicationState {
    pub role: Role,
    /// 40 hex chars for a primary; filled in from FULLRESYNC for a replica.
    pub repl_id: RwLock<String>,
    /// Primary: total bytes of propagated commands. Replica: bytes of
    /// commands consumed from the primary since the handshake completed.
    pub offset: AtomicU64,
    /// Replicas attached to this node (primary only); each connection owns
    /// its own write lock so propagation preserves per-replica ordering.
    pub replicas: Mutex<Vec<Arc<ReplicaHandle>>>,
    /// A single process-wide buffered channel of acks, drained by `WAIT`.
    /// Spec §5/§9: concurrent `WAIT`s can steal each other's acks — a known
    /// simplification, not fixed here (see DESIGN.md Open Questions).
    pub ack_tx: mpsc::Sender<()>,
    pub ack_rx: Mutex<mpsc::Receiver<()>>,
}

impl ReplicationState {
    pub fn new_primary() -> Arc<Self> {
        let (ack_tx, ack_rx) = mpsc::channel(1024);
        Arc::new(Self {
            role: Role::Primary,
            repl_id: RwLock::new(generate_repl_id()),
            offset: AtomicU64::new(0),
            replicas: Mutex::new(Vec::new()),
            ack_tx,
            ack_rx: Mutex::new(ack_rx),
        })
    }

    pub fn new_replica(host: String, port: u16) -> Arc<Self> {
        let (ack_tx, ack_rx) = mpsc::channel(1024);
        Arc::new(Self {
            role: Role::Replica { host, port },
            repl_id: RwLock::new(String::new()),
            offset: AtomicU64::new(0),
            replicas: Mutex::new(Vec::new()),
            ack_tx,
            ack_rx: Mutex::new(ack_rx),
        })
    }

    pub fn is_replica(&self) -> bool {
        matches!(self.role, Role::Replica { .. })
    }

    pub fn current_offset(&self) -> u64 {
        self.offset.load(Ordering::SeqCst)
    }

    pub fn add_offset(&self, delta: u64) -> u64 {
        self.offset.fetch_add(delta, Ordering::SeqCst)
    }
}

fn generate_repl_id() -> String {
    let mut rng = rand::thread_rng();
    const HEX_CHARS: &[u8] = b"0123456789abcdef";
    (0..40)
        .map(|_| HEX_CHARS[rng.gen_range(0..16)] as char)
        .collect()
}
