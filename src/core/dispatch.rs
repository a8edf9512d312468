// src/core/dispatch.rs

//! Ties the keyspace, replication state, and pub/sub bus together behind the
//! two dispatch entry points §4.7 describes: the ordinary client path and
//! the silent path a replica runs over commands read from its primary.

use crate::core::commands::Command;
use crate::core::errors::DbError;
use crate::core::protocol::{resp_value, RespFrame, RespValue};
use crate::core::pubsub::{PubSubBus, XREAD_TOPIC};
use crate::core::replication::{self, propagate, wait_for_replicas, ReplicationState, Role};
use crate::core::storage::Db;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Everything a command handler needs, threaded through rather than reached
/// for as global state (§9: "global mutable state → explicit context").
pub struct ServerContext {
    pub db: Arc<Db>,
    pub repl: Arc<ReplicationState>,
    pub pubsub: Arc<PubSubBus>,
    pub dir: String,
    pub dbfilename: String,
}

/// What a client-facing dispatch produced. Most commands just want a single
/// reply frame written back; `PSYNC` hands the connection loop raw bytes to
/// write verbatim (a simple string followed by an un-terminated bulk
/// payload) and a signal to hand this socket's write half to the replica
/// registry from here on.
pub enum DispatchOutcome {
    Reply(RespFrame),
    NoReply,
    BecomeReplica { handshake_reply: Vec<u8> },
}

impl ServerContext {
    /// Handles one command from an ordinary client connection. `raw_frame` is
    /// the exact frame as received, used verbatim for propagation to
    /// replicas so the primary's offset accounting matches what goes out on
    /// the wire.
    pub async fn client_dispatch(
        &self,
        command: Command,
        raw_frame: &RespFrame,
    ) -> Result<DispatchOutcome, DbError> {
        use Command::*;
        let outcome = match command {
            Ping => DispatchOutcome::Reply(RespFrame::SimpleString("PONG".into())),
            Echo(v) => DispatchOutcome::Reply(RespFrame::BulkString(v)),
            Get(key) => {
                let value = self.db.get(&key).await?;
                DispatchOutcome::Reply(match value {
                    Some(v) => RespFrame::BulkString(v),
                    None => RespFrame::Null,
                })
            }
            Set { key, value, px } => {
                self.db.set(key, value, px.unwrap_or(0)).await;
                propagate(&self.repl, raw_frame).await;
                DispatchOutcome::Reply(RespFrame::SimpleString("OK".into()))
            }
            Del(keys) => {
                for key in &keys {
                    self.db.del(key).await;
                }
                propagate(&self.repl, raw_frame).await;
                DispatchOutcome::Reply(RespFrame::SimpleString("OK".into()))
            }
            Type(key) => {
                let t = self.db.type_of(&key).await;
                DispatchOutcome::Reply(RespFrame::SimpleString(t.to_string()))
            }
            Keys => {
                let keys = self.db.keys().await;
                let frame = RespValue::Array(
                    keys.into_iter().map(RespValue::BulkString).collect(),
                );
                DispatchOutcome::Reply(frame.into())
            }
            Info => DispatchOutcome::Reply(RespFrame::BulkString(self.render_info().await)),
            ConfigGet(name) => {
                let value = match name.as_str() {
                    "dir" => self.dir.clone(),
                    "dbfilename" => self.dbfilename.clone(),
                    _ => unreachable!("parser only accepts dir/dbfilename"),
                };
                let frame = RespValue::Array(vec![
                    RespValue::BulkString(Bytes::from(name)),
                    RespValue::BulkString(Bytes::from(value)),
                ]);
                DispatchOutcome::Reply(frame.into())
            }
            ReplconfListeningPort(_port) => {
                DispatchOutcome::Reply(RespFrame::SimpleString("OK".into()))
            }
            ReplconfCapa => DispatchOutcome::Reply(RespFrame::SimpleString("OK".into())),
            ReplconfGetAck => {
                let getack = RespFrame::command(&[b"REPLCONF", b"GETACK", b"*"]);
                propagate(&self.repl, &getack).await;
                DispatchOutcome::NoReply
            }
            ReplconfAck(_offset) => {
                let _ = self.repl.ack_tx.send(()).await;
                DispatchOutcome::NoReply
            }
            Psync => {
                let repl_id = self.repl.repl_id.read().await.clone();
                let offset = self.repl.current_offset();
                let fullresync =
                    RespFrame::SimpleString(format!("FULLRESYNC {repl_id} {offset}"))
                        .encode_to_vec();
                let snapshot = replication::empty_rdb_snapshot();
                let mut reply = fullresync;
                reply.extend_from_slice(format!("${}\r\n", snapshot.len()).as_bytes());
                reply.extend_from_slice(&snapshot);
                DispatchOutcome::BecomeReplica {
                    handshake_reply: reply,
                }
            }
            Wait {
                numreplicas,
                timeout_ms,
            } => {
                let acks = wait_for_replicas(
                    &self.repl,
                    numreplicas.max(0) as usize,
                    timeout_ms,
                )
                .await;
                DispatchOutcome::Reply(RespFrame::Integer(acks))
            }
            Xadd {
                key,
                id_spec,
                fields,
            } => {
                let id = self.db.xadd(&key, id_spec, fields.clone()).await?;
                // Propagate with the id already resolved: replaying `*` or
                // `<ms>-*` downstream would let the replica mint its own,
                // different id instead of mirroring the primary's.
                let id_str = id.to_string();
                let mut parts: Vec<&[u8]> = vec![b"XADD", key.as_ref(), id_str.as_bytes()];
                parts.extend(fields.iter().map(|f| f.as_ref()));
                propagate(&self.repl, &RespFrame::command(&parts)).await;
                self.pubsub.publish(
                    XREAD_TOPIC,
                    format!("{}_{}", String::from_utf8_lossy(&key), id),
                );
                DispatchOutcome::Reply(RespFrame::BulkString(Bytes::from(id.to_string())))
            }
            Xrange { key, start, end } => {
                let entries = self.db.xrange(&key, start, end).await?;
                let reply = if entries.is_empty() {
                    RespFrame::NullArray
                } else {
                    resp_value::encode_stream_range(&entries).into()
                };
                DispatchOutcome::Reply(reply)
            }
            Xread { block_ms, targets } => {
                let reply = self.run_xread(block_ms, targets).await?;
                DispatchOutcome::Reply(reply)
            }
        };
        Ok(outcome)
    }

    async fn render_info(&self) -> Bytes {
        let body = match &self.repl.role {
            Role::Primary => {
                let repl_id = self.repl.repl_id.read().await.clone();
                format!(
                    "role:master\nmaster_replid:{}\nmaster_repl_offset:{}",
                    repl_id,
                    self.repl.current_offset()
                )
            }
            Role::Replica { .. } => "role:slave".to_string(),
        };
        Bytes::from(body)
    }

    /// `XREAD`: a non-blocking pass over the requested keys, then (if asked
    /// to block and not every requested key had data yet) a subscription to
    /// the `xread` topic until either every key has data or the deadline
    /// passes. Blocking mode waits for *all* requested keys, not just one —
    /// the source this was distilled from only replies once
    /// `len(streamMap) == len(args)`.
    async fn run_xread(
        &self,
        block_ms: Option<u64>,
        targets: Vec<crate::core::commands::XReadTarget>,
    ) -> Result<RespFrame, DbError> {
        let mut since = Vec::with_capacity(targets.len());
        for t in &targets {
            let id = match t.since {
                Some(id) => id,
                None => self.db.xlast_id(&t.key).await,
            };
            since.push((t.key.clone(), id));
        }

        let results = self.collect_xread(&since).await?;
        let complete = results.len() == since.len();
        if block_ms.is_none() || complete {
            return Ok(if results.is_empty() {
                RespFrame::NullArray
            } else {
                resp_value::encode_named_streams(&results).into()
            });
        }

        let block_ms = block_ms.unwrap();
        let mut rx = self.pubsub.subscribe(XREAD_TOPIC);
        let deadline = if block_ms == 0 {
            None
        } else {
            Some(tokio::time::Instant::now() + Duration::from_millis(block_ms))
        };

        loop {
            let recv = rx.recv();
            let msg = match deadline {
                Some(dl) => {
                    let remaining = dl.saturating_duration_since(tokio::time::Instant::now());
                    if remaining.is_zero() {
                        return Ok(RespFrame::NullArray);
                    }
                    match tokio::time::timeout(remaining, recv).await {
                        Ok(Ok(m)) => m,
                        Ok(Err(_lagged_or_closed)) => continue,
                        Err(_timeout) => return Ok(RespFrame::NullArray),
                    }
                }
                None => match recv.await {
                    Ok(m) => m,
                    Err(_lagged_or_closed) => continue,
                },
            };

            if !since.iter().any(|(key, _)| {
                msg.message
                    .starts_with(&format!("{}_", String::from_utf8_lossy(key)))
            }) {
                continue;
            }

            let results = self.collect_xread(&since).await?;
            if results.len() == since.len() {
                return Ok(resp_value::encode_named_streams(&results).into());
            }
        }
    }

    async fn collect_xread(
        &self,
        since: &[(Bytes, crate::core::storage::stream::StreamId)],
    ) -> Result<Vec<(Bytes, Vec<crate::core::storage::stream::StreamEntry>)>, DbError> {
        let mut results = Vec::new();
        for (key, id) in since {
            let entries = self.db.xread_since(key, *id).await?;
            if !entries.is_empty() {
                results.push((key.clone(), entries));
            }
        }
        Ok(results)
    }

    /// Applies one command read from the primary connection (this node is a
    /// replica). Returns the offset to report back in a `REPLCONF ACK` reply
    /// when `command` was `REPLCONF GETACK *`; the caller sends that reply
    /// and only then advances the offset by `raw_len`, per §4.6's pre-count
    /// rule.
    pub async fn replica_ingest_dispatch(
        &self,
        command: &Command,
        raw_len: u64,
    ) -> Result<Option<u64>, DbError> {
        use Command::*;
        match command {
            Set { key, value, px } => {
                self.db
                    .set(key.clone(), value.clone(), px.unwrap_or(0))
                    .await;
            }
            Del(keys) => {
                for key in keys {
                    self.db.del(key).await;
                }
            }
            Xadd {
                key,
                id_spec,
                fields,
            } => {
                self.db.xadd(key, id_spec.clone(), fields.clone()).await?;
            }
            ReplconfGetAck => {
                let offset_before = self.repl.current_offset();
                return Ok(Some(offset_before));
            }
            Psync => {
                warn!("received PSYNC on a replica-ingest stream, ignoring");
            }
            _ => {}
        }
        self.repl.add_offset(raw_len);
        Ok(None)
    }
}
