//! User identity and per-connection session
//!
//! `User` is the cloneable identity snapshot carried by messages and member
//! lists. `UserSession` pairs it with a relay into the user's bounded
//! outbound queue; once handed to the broadcaster it is the only handle, so
//! dropping it inside the actor is what closes the queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::config::ChatConfig;
use crate::error::SendError;
use crate::message::Message;
use crate::token::TokenCodec;
use crate::types::UserId;

/// Receiving half of a user's outbound queue, drained by the transport
pub type OutboundReceiver = mpsc::Receiver<Arc<Message>>;

/// Identity and connection metadata of a chat user
#[derive(Debug, Clone, Serialize)]
pub struct User {
    uid: UserId,
    nickname: String,
    enter_at: DateTime<Utc>,
    addr: String,
    #[serde(skip)]
    token: String,
    #[serde(skip)]
    is_new: bool,
}

impl User {
    pub fn new(
        uid: UserId,
        nickname: impl Into<String>,
        addr: impl Into<String>,
        token: impl Into<String>,
        is_new: bool,
    ) -> Self {
        Self {
            uid,
            nickname: nickname.into(),
            enter_at: Utc::now(),
            addr: addr.into(),
            token: token.into(),
            is_new,
        }
    }

    pub fn id(&self) -> UserId {
        self.uid
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn enter_at(&self) -> DateTime<Utc> {
        self.enter_at
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Reconnect token, either resumed or freshly minted
    pub fn token(&self) -> &str {
        &self.token
    }

    /// True if this identity was minted for this connection
    pub fn is_new(&self) -> bool {
        self.is_new
    }
}

/// A connected user together with the relay feeding their outbound queue
///
/// Messages handed to the session are forwarded into the bounded outbound
/// queue by a per-session task, so the holder never waits on a slow reader.
#[derive(Debug)]
pub struct UserSession {
    user: User,
    relay: mpsc::UnboundedSender<Arc<Message>>,
}

impl UserSession {
    /// Create a session with a fresh bounded outbound queue
    ///
    /// Spawns the forwarding task on the current tokio runtime. The queue
    /// closes once the session is dropped and every relayed message has been
    /// forwarded.
    pub fn new(user: User, capacity: usize) -> (Self, OutboundReceiver) {
        let (outbound, rx) = mpsc::channel(capacity);
        let (relay, relayed) = mpsc::unbounded_channel();
        tokio::spawn(forward(user.nickname.clone(), relayed, outbound));
        (Self { user, relay }, rx)
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    /// Hand a message to this user's forwarder without waiting
    ///
    /// Returns an error once the transport has dropped the receiving half.
    pub fn send(&self, msg: Arc<Message>) -> Result<(), SendError> {
        self.relay.send(msg).map_err(|_| SendError::ChannelClosed)
    }

    /// Resolves when the forwarder has stopped because the receiver is gone
    pub async fn closed(&self) {
        self.relay.closed().await
    }
}

/// Move relayed messages into the bounded outbound queue in order
async fn forward(
    nickname: String,
    mut relayed: mpsc::UnboundedReceiver<Arc<Message>>,
    outbound: mpsc::Sender<Arc<Message>>,
) {
    loop {
        let msg = tokio::select! {
            msg = relayed.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
            _ = outbound.closed() => break,
        };

        match outbound.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => {
                warn!(
                    nickname = %nickname,
                    max = outbound.max_capacity(),
                    "Outbound queue full, holding delivery for a slow reader"
                );
                if outbound.send(msg).await.is_err() {
                    break;
                }
            }
            Err(TrySendError::Closed(_)) => break,
        }
    }
    debug!(nickname = %nickname, "Forwarder ended");
}

/// Creates user sessions, minting or resuming identities
///
/// Owns the id allocator and the token codec; clones share the allocator.
#[derive(Debug, Clone)]
pub struct SessionFactory {
    codec: TokenCodec,
    next_id: Arc<AtomicU64>,
    outbound_capacity: usize,
}

impl SessionFactory {
    pub fn new(codec: TokenCodec, outbound_capacity: usize) -> Self {
        Self {
            codec,
            next_id: Arc::new(AtomicU64::new(0)),
            outbound_capacity,
        }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(
            TokenCodec::new(config.token_secret.clone()),
            config.outbound_capacity,
        )
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Build a session for a new connection
    ///
    /// A token that validates for `nickname` resumes its id (`is_new == false`);
    /// a missing or invalid token mints a new id and token (`is_new == true`).
    pub fn new_user_session(
        &self,
        token: Option<&str>,
        nickname: &str,
        addr: &str,
    ) -> (UserSession, OutboundReceiver) {
        let resumed = token
            .filter(|t| !t.is_empty())
            .and_then(|t| match self.codec.validate(t, nickname) {
                Ok(id) => Some((id, t.to_string())),
                Err(e) => {
                    warn!(nickname = %nickname, addr = %addr, "Rejected reconnect token: {}", e);
                    None
                }
            });

        let user = match resumed {
            Some((id, token)) => {
                // Minted ids must never collide with a resumed one
                self.next_id.fetch_max(id.get(), Ordering::Relaxed);
                debug!(uid = %id, nickname = %nickname, "Resumed identity");
                User::new(id, nickname, addr, token, false)
            }
            None => {
                let id = UserId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
                let token = self.codec.mint(id, nickname);
                debug!(uid = %id, nickname = %nickname, "Minted identity");
                User::new(id, nickname, addr, token, true)
            }
        };

        UserSession::new(user, self.outbound_capacity)
    }
}
