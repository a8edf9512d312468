// src/server/mod.rs

//! Process startup: load configuration, load any on-disk snapshot, stand up
//! node state (primary or replica), and run the accept loop.

use crate::config::{bind_addr, Config};
use crate::connection::{handle_client_connection, run_replica_link};
use crate::core::dispatch::ServerContext;
use crate::core::rdb;
use crate::core::replication::{run_replica_handshake, ReplicationState};
use crate::core::storage::ttl::TtlSweeper;
use crate::core::storage::Db;
use crate::core::pubsub::PubSubBus;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info};

pub async fn run() -> Result<(), i32> {
    let config = Config::from_args().map_err(|e| {
        error!("invalid configuration: {e}");
        1
    })?;

    let db = Arc::new(Db::new());
    let dir = PathBuf::from(&config.dir);
    if let Err(e) = rdb::load_rdb_file(&db, &dir, &config.dbfilename).await {
        error!("failed to load RDB file: {e}");
    }

    let repl = match &config.replicaof {
        Some((host, port)) => ReplicationState::new_replica(host.clone(), *port),
        None => ReplicationState::new_primary(),
    };

    let ctx = Arc::new(ServerContext {
        db: db.clone(),
        repl: repl.clone(),
        pubsub: Arc::new(PubSubBus::new()),
        dir: config.dir.clone(),
        dbfilename: config.dbfilename.clone(),
    });

    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(TtlSweeper::new(db.clone()).run(shutdown_tx.subscribe()));

    if let Some((host, port)) = &config.replicaof {
        let outcome = run_replica_handshake(host, *port, config.port)
            .await
            .map_err(|e| {
                error!("replica handshake with {host}:{port} failed: {e}");
                1
            })?;
        let ctx = ctx.clone();
        tokio::spawn(run_replica_link(ctx, outcome));
    }

    let (addr, port) = bind_addr(config.port);
    let listener = TcpListener::bind((addr, port)).await.map_err(|e| {
        error!("failed to bind 0.0.0.0:{port}: {e}");
        1
    })?;
    info!("listening on 0.0.0.0:{port}");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                error!("accept failed: {e}");
                continue;
            }
        };
        info!("accepted connection from {peer}");
        let ctx = ctx.clone();
        tokio::spawn(async move {
            handle_client_connection(stream, ctx).await;
        });
    }
}
