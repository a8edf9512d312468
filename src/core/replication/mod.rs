// src/core/replication/mod.rs

//! The replication state machine: primary/replica role, replication id and
//! byte-precise offset, the replica connection registry, and the handshake
//! driver a replica runs against its primary.

mod handshake;
mod primary;
mod state;

pub use handshake::{run_replica_handshake, HandshakeOutcome};
pub use primary::{propagate, wait_for_replicas, ReplicaHandle};
pub use state::{Role, ReplicationState};

/// A fixed, valid, empty RDB file used as the `PSYNC` full-resync snapshot
/// payload. Its bytes are an external collaborator to this spec (§6): this
/// server never *writes* an RDB file, it only ever plays this canned one
/// back to a freshly-synced replica. Same shape as the "empty RDB" blob
/// used throughout the Redis-clone teaching ecosystem: a header, an AUX
/// field, a RESIZEDB opcode with no keys, and an EOF + checksum.
pub fn empty_rdb_snapshot() -> Vec<u8> {
    const EMPTY_RDB_HEX: &str = "524544495330303131fa0972656469732d76657205372e322e30fa0a72656469732d62697473c040fa056374696d65c26d08bc65fa08757365642d6d656dc2b0c41000fa08616f662d62617365c000fff06e3bfec0ff5aa2";
    hex::decode(EMPTY_RDB_HEX).expect("empty RDB snapshot hex is a compile-time constant")
}
