//! WebSocket Chat Room Library
//!
//! A single-room WebSocket chat server built with tokio-tungstenite
//! using the Actor pattern for state management.
//!
//! # Features
//! - Nickname admission (unique among connected users)
//! - Room-wide broadcast with `@nickname` mentions
//! - Replay of recent messages to every joining user
//! - One-time replay of missed mentions to returning users
//! - Stateless HMAC reconnect tokens
//! - Member list snapshots
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `RoomActor` owns the membership map and the offline cache
//! - `Broadcaster` is the cloneable handle every connection uses
//! - Each connection has a reader and a writer task; the writer drains the
//!   user's bounded outbound queue, which only the actor writes to after entry
//! - No locks needed - all room state access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use chat_room::{handle_connection, Broadcaster, ChatConfig, SessionFactory};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ChatConfig::from_env().unwrap();
//!     let listener = TcpListener::bind("127.0.0.1:2022").await.unwrap();
//!     let broadcaster = Broadcaster::spawn(&config);
//!     let sessions = SessionFactory::from_config(&config);
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, broadcaster.clone(), sessions.clone()));
//!     }
//! }
//! ```

pub mod broadcaster;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod offline;
pub mod token;
pub mod types;
pub mod user;

// Re-export main types for convenience
pub use broadcaster::{Broadcaster, BroadcasterCommand, RoomActor};
pub use config::ChatConfig;
pub use error::{AppError, ConfigError, SendError, TokenError};
pub use handler::handle_connection;
pub use message::{ClientMessage, Message, MessageKind, Origin};
pub use offline::{OfflineCache, RingBuffer};
pub use token::TokenCodec;
pub use types::UserId;
pub use user::{OutboundReceiver, SessionFactory, User, UserSession};
