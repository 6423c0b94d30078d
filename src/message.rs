//! Message model
//!
//! Outbound chat events (`Message`) are immutable once built and are shared
//! between the actor, the offline rings and every recipient queue as
//! `Arc<Message>`. Inbound client frames use a tagged enum (`ClientMessage`).

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::types::UserId;
use crate::user::User;

/// Client → Server message
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Send a chat message to the room
    Chat { content: String },
    /// Request the current member list
    UserList,
}

/// Type tag of an outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Regular user chat message
    Normal,
    /// Greeting sent only to the joining user
    Welcome,
    /// A user joined the room
    UserEntered,
    /// A user left the room
    UserLeft,
    /// Error notice for a single connection
    Error,
    /// Snapshot of the current members
    UserList,
}

/// Who produced a message
///
/// Serialized without a tag: the user object itself, or `null` for the server.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Origin {
    /// Generated by the server itself
    System,
    /// Sent by, or about, a user
    User(User),
}

/// Server → Client chat event
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(rename = "user")]
    origin: Origin,
    #[serde(rename = "type")]
    kind: MessageKind,
    content: String,
    msg_time: DateTime<Utc>,
    /// Mention tokens, each including the leading `@`
    #[serde(rename = "ats")]
    mentions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    users: Vec<User>,
    /// Reconnect token, only present on the welcome sent to its owner
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

impl Message {
    fn build(origin: Origin, kind: MessageKind, content: String) -> Self {
        Self {
            origin,
            kind,
            content,
            msg_time: Utc::now(),
            mentions: Vec::new(),
            users: Vec::new(),
            token: None,
        }
    }

    /// A user's chat message; mentions are extracted from the content
    pub fn normal(user: &User, content: impl Into<String>) -> Self {
        let content = content.into();
        let mut msg = Self::build(Origin::User(user.clone()), MessageKind::Normal, content);
        msg.mentions = extract_mentions(&msg.content);
        msg
    }

    pub fn welcome(user: &User) -> Self {
        let content = format!("{}, welcome to the chat room!", user.nickname());
        let mut msg = Self::build(Origin::User(user.clone()), MessageKind::Welcome, content);
        msg.token = Some(user.token().to_string());
        msg
    }

    pub fn user_entered(user: &User) -> Self {
        let content = format!("{} joined the chat room", user.nickname());
        Self::build(Origin::User(user.clone()), MessageKind::UserEntered, content)
    }

    pub fn user_left(user: &User) -> Self {
        let content = format!("{} left the chat room", user.nickname());
        Self::build(Origin::User(user.clone()), MessageKind::UserLeft, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::build(Origin::System, MessageKind::Error, content.into())
    }

    pub fn user_list(users: Vec<User>) -> Self {
        let content = format!("{} user(s) online", users.len());
        let mut msg = Self::build(Origin::System, MessageKind::UserList, content);
        msg.users = users;
        msg
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn msg_time(&self) -> DateTime<Utc> {
        self.msg_time
    }

    pub fn mentions(&self) -> &[String] {
        &self.mentions
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Id of the authoring user, `None` for system notices
    pub fn author_id(&self) -> Option<UserId> {
        match &self.origin {
            Origin::System => None,
            Origin::User(user) => Some(user.id()),
        }
    }

    /// Mentioned nicknames without the leading `@`
    pub fn mentioned_nicknames(&self) -> impl Iterator<Item = &str> {
        self.mentions.iter().map(|m| m.trim_start_matches('@'))
    }
}

/// Extract `@nickname` tokens (2 to 20 non-space characters) from content
pub fn extract_mentions(content: &str) -> Vec<String> {
    static MENTION: OnceLock<Regex> = OnceLock::new();
    let re = MENTION.get_or_init(|| Regex::new(r"@[^\s@]{2,20}").expect("mention pattern is valid"));
    re.find_iter(content).map(|m| m.as_str().to_string()).collect()
}

/// Convert AppError to an error Message for client notification
impl From<AppError> for Message {
    fn from(err: AppError) -> Self {
        let content = match &err {
            AppError::NicknameTaken(nickname) => {
                format!("Nickname '{}' is already taken", nickname)
            }
            AppError::InvalidNickname(_) => {
                "Invalid nickname, length must be 2-20 characters".to_string()
            }
            AppError::Json(e) => format!("Invalid message format: {}", e),
            // Fatal errors are not typically converted (connection closes)
            _ => "Internal error".to_string(),
        };
        Message::error(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> User {
        User::new(UserId(1), "alice", "127.0.0.1:5000", "tok", true)
    }

    #[test]
    fn test_extract_mentions() {
        assert_eq!(extract_mentions("@alice hi @bob"), vec!["@alice", "@bob"]);
        assert_eq!(extract_mentions("mail me@x"), Vec::<String>::new());
        assert_eq!(extract_mentions("@a too short"), Vec::<String>::new());
        assert_eq!(extract_mentions("@alice@bob"), vec!["@alice", "@bob"]);
    }

    #[test]
    fn test_normal_message_mentions() {
        let msg = Message::normal(&alice(), "@carol hi");
        assert_eq!(msg.kind(), MessageKind::Normal);
        assert_eq!(msg.mentions(), ["@carol"]);
        assert_eq!(msg.mentioned_nicknames().collect::<Vec<_>>(), vec!["carol"]);
        assert_eq!(msg.author_id(), Some(UserId(1)));
    }

    #[test]
    fn test_notices_carry_no_mentions() {
        let msg = Message::user_entered(&alice());
        assert_eq!(msg.kind(), MessageKind::UserEntered);
        assert!(msg.mentions().is_empty());
        assert_eq!(msg.content(), "alice joined the chat room");
    }

    #[test]
    fn test_welcome_carries_token() {
        let msg = Message::welcome(&alice());
        assert_eq!(msg.token(), Some("tok"));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"token\":\"tok\""));
    }

    #[test]
    fn test_error_message_is_system() {
        let msg: Message = AppError::NicknameTaken("alice".into()).into();
        assert_eq!(msg.kind(), MessageKind::Error);
        assert!(msg.author_id().is_none());
        assert!(msg.content().contains("alice"));
    }

    #[test]
    fn test_client_message_deserialize() {
        let json = r#"{"type": "chat", "content": "hello"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Chat { content } => assert_eq!(content, "hello"),
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_message_serialize() {
        let msg = Message::normal(&alice(), "hi @bob");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"normal\""));
        assert!(json.contains("\"ats\":[\"@bob\"]"));
        assert!(json.contains("\"nickname\":\"alice\""));
        assert!(!json.contains("\"users\""));
        assert!(!json.contains("\"token\""));
    }

    #[test]
    fn test_origin_is_not_nested() {
        let msg = Message::normal(&alice(), "hi");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["user"]["nickname"], "alice");
        assert_eq!(value["user"]["uid"], 1);
        assert!(value["user"].get("user").is_none());

        let notice: Message = AppError::NicknameTaken("alice".into()).into();
        let value = serde_json::to_value(&notice).unwrap();
        assert!(value["user"].is_null());
    }
}
