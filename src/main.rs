//! WebSocket Chat Room - Entry Point
//!
//! Loads configuration, starts the Broadcaster actor and accepts connections.

use std::env;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_room::{handle_connection, Broadcaster, ChatConfig, SessionFactory};

/// Default server address
const DEFAULT_ADDR: &str = "127.0.0.1:2022";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_room=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_room=info")),
        )
        .init();

    let config = ChatConfig::from_env()?;

    // Get bind address from command line or use default
    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    // Start TCP listener
    let listener = TcpListener::bind(&addr).await?;
    info!("WebSocket Chat Room listening on {}", addr);

    let broadcaster = Broadcaster::spawn(&config);
    let sessions = SessionFactory::from_config(&config);

    info!(
        offline_capacity = config.offline_capacity,
        outbound_capacity = config.outbound_capacity,
        queue_len = config.broadcast_queue_len,
        "Chat room ready"
    );

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let broadcaster = broadcaster.clone();
                let sessions = sessions.clone();

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, broadcaster, sessions).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
