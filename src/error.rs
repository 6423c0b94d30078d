//! Error types for the chat room
//!
//! Defines application-level errors, token errors, configuration errors
//! and per-user queue send errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// admission errors (send error message to client).
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The broadcaster actor is gone (process shutting down)
    #[error("Broadcaster closed")]
    BroadcasterClosed,

    /// Another live user already holds this nickname
    #[error("Nickname already taken: {0}")]
    NicknameTaken(String),

    /// Nickname length is outside the allowed range
    #[error("Invalid nickname: {0}")]
    InvalidNickname(String),
}

/// Reconnect token validation errors
///
/// Never fatal: the session factory mints a fresh identity on any of these.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Token has no `uid` separator
    #[error("token has no id separator")]
    MissingSeparator,

    /// The hash portion is not valid base64
    #[error("token hash is not valid base64")]
    InvalidEncoding,

    /// The id portion is not a positive decimal number
    #[error("token id is invalid")]
    InvalidId,

    /// Hash does not match the nickname, secret and id
    #[error("invalid token")]
    Mismatch,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    /// A queue or ring capacity was configured as zero
    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),
}

/// Message send errors
///
/// Occurs when attempting to send messages through closed channels.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}
