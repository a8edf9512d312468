// src/main.rs

//! Process entry point: initialize logging, then hand off to the server.

use emberdb::server;

#[tokio::main]
async fn main() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .compact()
        .with_ansi(true)
        .init();

    if let Err(code) = server::run().await {
        std::process::exit(code);
    }
}
