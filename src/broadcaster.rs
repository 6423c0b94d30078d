//! Broadcaster actor implementation
//!
//! The single owner of room state: the nickname → session membership map and
//! the offline cache. Every request arrives on one mpsc queue and is handled
//! to completion before the next, so membership changes and broadcasts are
//! totally ordered and no lock is needed. Deliveries are handed to each
//! session's forwarder, so a slow reader never holds up the loop.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::error::AppError;
use crate::message::Message;
use crate::offline::OfflineCache;
use crate::types::UserId;
use crate::user::{User, UserSession};

/// Commands sent from connection handlers to the room actor
#[derive(Debug)]
pub enum BroadcasterCommand {
    /// Is this nickname free?
    CanEnter {
        nickname: String,
        respond_to: oneshot::Sender<bool>,
    },
    /// Register a session and replay offline messages into its queue
    Enter {
        session: UserSession,
        respond_to: oneshot::Sender<Result<(), AppError>>,
    },
    /// Remove a member, closing its outbound queue
    Leave {
        user_id: UserId,
        nickname: String,
        respond_to: oneshot::Sender<()>,
    },
    /// Fan a message out to every other member
    Broadcast { msg: Arc<Message> },
    /// Deliver a message to a single member
    SendTo {
        user_id: UserId,
        nickname: String,
        msg: Arc<Message>,
    },
    /// Snapshot of the current members
    ListUsers {
        respond_to: oneshot::Sender<Vec<User>>,
    },
}

/// Handle to the room actor
///
/// Cheap to clone; every connection task holds one.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    sender: mpsc::Sender<BroadcasterCommand>,
}

impl Broadcaster {
    /// Create a handle and its actor without starting it
    pub fn channel(queue_len: usize, offline_capacity: usize) -> (Self, RoomActor) {
        let (sender, receiver) = mpsc::channel(queue_len);
        (Self { sender }, RoomActor::new(receiver, offline_capacity))
    }

    /// Create the actor on the current tokio runtime and return its handle
    pub fn spawn(config: &ChatConfig) -> Self {
        let (handle, actor) = Self::channel(config.broadcast_queue_len, config.offline_capacity);
        tokio::spawn(actor.run());
        handle
    }

    /// Check whether `nickname` is free
    pub async fn can_enter_room(&self, nickname: &str) -> Result<bool, AppError> {
        self.request(|respond_to| BroadcasterCommand::CanEnter {
            nickname: nickname.to_string(),
            respond_to,
        })
        .await
    }

    /// Register a session
    ///
    /// The nickname is re-checked in the same actor turn that inserts it. A
    /// refused session gets an error message on its own queue and is dropped.
    pub async fn user_entering(&self, session: UserSession) -> Result<(), AppError> {
        self.request(|respond_to| BroadcasterCommand::Enter {
            session,
            respond_to,
        })
        .await?
    }

    /// Deregister a user; a stale handle for a reused nickname is ignored
    pub async fn user_leaving(&self, user: &User) -> Result<(), AppError> {
        self.request(|respond_to| BroadcasterCommand::Leave {
            user_id: user.id(),
            nickname: user.nickname().to_string(),
            respond_to,
        })
        .await
    }

    /// Queue a message for fan-out
    ///
    /// Never drops: when the queue is saturated a warning is logged and the
    /// caller waits for capacity.
    pub async fn broadcast(&self, msg: Message) -> Result<(), AppError> {
        if self.sender.capacity() == 0 {
            warn!(
                max = self.sender.max_capacity(),
                "Broadcast queue is full, waiting for capacity"
            );
        }
        self.send(BroadcasterCommand::Broadcast { msg: Arc::new(msg) })
            .await
    }

    /// Deliver a message to one live member
    pub async fn send_to(&self, user: &User, msg: Message) -> Result<(), AppError> {
        self.send(BroadcasterCommand::SendTo {
            user_id: user.id(),
            nickname: user.nickname().to_string(),
            msg: Arc::new(msg),
        })
        .await
    }

    /// Current members ordered by join time
    pub async fn get_user_list(&self) -> Result<Vec<User>, AppError> {
        self.request(|respond_to| BroadcasterCommand::ListUsers { respond_to })
            .await
    }

    async fn send(&self, cmd: BroadcasterCommand) -> Result<(), AppError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| AppError::BroadcasterClosed)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> BroadcasterCommand,
    ) -> Result<T, AppError> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await.map_err(|_| AppError::BroadcasterClosed)
    }
}

/// The room actor
///
/// Owns the membership map and the offline cache; nothing else reads or
/// writes them.
pub struct RoomActor {
    /// Live members: nickname -> session
    members: HashMap<String, UserSession>,
    offline: OfflineCache,
    receiver: mpsc::Receiver<BroadcasterCommand>,
}

impl RoomActor {
    pub fn new(receiver: mpsc::Receiver<BroadcasterCommand>, offline_capacity: usize) -> Self {
        Self {
            members: HashMap::new(),
            offline: OfflineCache::new(offline_capacity),
            receiver,
        }
    }

    /// Run the event loop until every handle is dropped
    pub async fn run(mut self) {
        info!("Broadcaster started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("Broadcaster shutting down");
    }

    fn handle_command(&mut self, cmd: BroadcasterCommand) {
        match cmd {
            BroadcasterCommand::CanEnter { nickname, respond_to } => {
                let _ = respond_to.send(!self.members.contains_key(&nickname));
            }
            BroadcasterCommand::Enter { session, respond_to } => {
                let result = self.handle_enter(session);
                let _ = respond_to.send(result);
            }
            BroadcasterCommand::Leave {
                user_id,
                nickname,
                respond_to,
            } => {
                self.handle_leave(user_id, &nickname);
                let _ = respond_to.send(());
            }
            BroadcasterCommand::Broadcast { msg } => {
                self.handle_broadcast(msg);
            }
            BroadcasterCommand::SendTo {
                user_id,
                nickname,
                msg,
            } => {
                self.handle_send_to(user_id, &nickname, msg);
            }
            BroadcasterCommand::ListUsers { respond_to } => {
                let _ = respond_to.send(self.user_list());
            }
        }
    }

    fn handle_enter(&mut self, session: UserSession) -> Result<(), AppError> {
        let nickname = session.user().nickname().to_string();

        if self.members.contains_key(&nickname) {
            warn!(nickname = %nickname, "Nickname taken, refusing entry");
            let notice: Message = AppError::NicknameTaken(nickname.clone()).into();
            let _ = session.send(Arc::new(notice));
            // Dropping the session closes its queue
            return Err(AppError::NicknameTaken(nickname));
        }

        let replay = self.offline.replay(session.user());
        debug!(nickname = %nickname, count = replay.len(), "Replaying offline messages");
        for msg in replay {
            if session.send(msg).is_err() {
                debug!(nickname = %nickname, "Queue closed during replay");
                break;
            }
        }

        info!(
            nickname = %nickname,
            uid = %session.user().id(),
            is_new = session.user().is_new(),
            "User entered"
        );
        self.members.insert(nickname, session);
        debug!("Total members: {}", self.members.len());
        Ok(())
    }

    fn handle_leave(&mut self, user_id: UserId, nickname: &str) {
        match self.members.get(nickname) {
            Some(session) if session.user().id() == user_id => {
                self.members.remove(nickname);
                info!(nickname = %nickname, uid = %user_id, "User left");
                debug!("Total members: {}", self.members.len());
            }
            _ => debug!(nickname = %nickname, uid = %user_id, "Leave for absent user ignored"),
        }
    }

    fn handle_broadcast(&mut self, msg: Arc<Message>) {
        let author = msg.author_id();

        for (nickname, session) in &self.members {
            if Some(session.user().id()) == author {
                continue;
            }
            if session.send(Arc::clone(&msg)).is_err() {
                debug!(nickname = %nickname, "Queue closed, skipping delivery");
            }
        }

        self.offline.save(&msg);
    }

    fn handle_send_to(&mut self, user_id: UserId, nickname: &str, msg: Arc<Message>) {
        match self.members.get(nickname) {
            Some(session) if session.user().id() == user_id => {
                let _ = session.send(msg);
            }
            _ => debug!(nickname = %nickname, "Direct message for absent user dropped"),
        }
    }

    fn user_list(&self) -> Vec<User> {
        let mut users: Vec<User> = self.members.values().map(|s| s.user().clone()).collect();
        users.sort_by(|a, b| {
            a.enter_at()
                .cmp(&b.enter_at())
                .then_with(|| a.nickname().cmp(b.nickname()))
        });
        users
    }
}
