//! Chat room configuration
//!
//! Loaded from `CHAT_*` environment variables at startup. Every field has a
//! default so the server runs without any configuration.

use rand::Rng;
use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;

const TOKEN_SECRET_VAR: &str = "CHAT_TOKEN_SECRET";
const OFFLINE_NUM_VAR: &str = "CHAT_OFFLINE_NUM";
const OUTBOUND_CAPACITY_VAR: &str = "CHAT_OUTBOUND_CAPACITY";
const QUEUE_LEN_VAR: &str = "CHAT_QUEUE_LEN";

/// Runtime settings for the chat room core
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Shared secret keying the reconnect tokens
    pub token_secret: String,
    /// Capacity N of every offline ring
    pub offline_capacity: usize,
    /// Capacity of each user's outbound queue
    pub outbound_capacity: usize,
    /// Capacity of the broadcaster's command queue
    pub broadcast_queue_len: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            token_secret: random_secret(),
            offline_capacity: 10,
            outbound_capacity: 32,
            broadcast_queue_len: 1024,
        }
    }
}

impl ChatConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        match lookup(TOKEN_SECRET_VAR).filter(|s| !s.is_empty()) {
            Some(secret) => config.token_secret = secret,
            None => warn!(
                "{} not set, using a random secret; reconnect tokens will not survive a restart",
                TOKEN_SECRET_VAR
            ),
        }
        if let Some(n) = parse_var(&lookup, OFFLINE_NUM_VAR)? {
            config.offline_capacity = n;
        }
        if let Some(n) = parse_var(&lookup, OUTBOUND_CAPACITY_VAR)? {
            config.outbound_capacity = n;
        }
        if let Some(n) = parse_var(&lookup, QUEUE_LEN_VAR)? {
            config.broadcast_queue_len = n;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject zero capacities
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.offline_capacity == 0 {
            return Err(ConfigError::ZeroCapacity(OFFLINE_NUM_VAR));
        }
        if self.outbound_capacity == 0 {
            return Err(ConfigError::ZeroCapacity(OUTBOUND_CAPACITY_VAR));
        }
        if self.broadcast_queue_len == 0 {
            return Err(ConfigError::ZeroCapacity(QUEUE_LEN_VAR));
        }
        Ok(())
    }
}

fn parse_var<F>(lookup: &F, key: &'static str) -> Result<Option<usize>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue { key, value })
        })
        .transpose()
}

/// Generate a 32-character alphanumeric secret
fn random_secret() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}
