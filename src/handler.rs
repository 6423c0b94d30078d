//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, nickname
//! admission, and bidirectional communication with the Broadcaster.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::broadcaster::Broadcaster;
use crate::error::AppError;
use crate::message::{ClientMessage, Message};
use crate::user::SessionFactory;

/// Allowed nickname length in characters
const NICKNAME_LEN: std::ops::RangeInclusive<usize> = 2..=20;

/// Connection parameters taken from the handshake query string
#[derive(Debug, Default, PartialEq, Eq)]
pub struct JoinParams {
    pub nickname: String,
    pub token: Option<String>,
}

impl JoinParams {
    /// Parse `nickname=..&token=..` (percent-decoded)
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "nickname" => params.nickname = value.trim().to_string(),
                // An unescaped '+' from the base64 alphabet arrives as a space
                "token" if !value.is_empty() => params.token = Some(value.replace(' ', "+")),
                _ => {}
            }
        }
        params
    }
}

/// Check the nickname length rule
pub fn validate_nickname(nickname: &str) -> Result<(), AppError> {
    if NICKNAME_LEN.contains(&nickname.chars().count()) {
        Ok(())
    } else {
        Err(AppError::InvalidNickname(nickname.to_string()))
    }
}

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, admits the user, runs the reader and
/// writer tasks, and deregisters the user when either side finishes.
pub async fn handle_connection(
    stream: TcpStream,
    broadcaster: Broadcaster,
    sessions: SessionFactory,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake, capturing the query string
    let mut query = String::new();
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        query = req.uri().query().unwrap_or_default().to_string();
        Ok::<_, ErrorResponse>(resp)
    })
    .await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let params = JoinParams::from_query(&query);

    // Admission: nickname rule, then uniqueness
    let admission = match validate_nickname(&params.nickname) {
        Ok(()) => {
            if broadcaster.can_enter_room(&params.nickname).await? {
                Ok(())
            } else {
                Err(AppError::NicknameTaken(params.nickname.clone()))
            }
        }
        Err(e) => Err(e),
    };
    if let Err(e) = admission {
        warn!("Refusing {} from {}: {}", params.nickname, peer_addr, e);
        let reason = e.to_string();
        let json = serde_json::to_string(&Message::from(e))?;
        ws_sender.send(WsMessage::Text(json)).await?;
        ws_sender
            .send(WsMessage::Close(Some(CloseFrame {
                code: CloseCode::Unsupported,
                reason: reason.into(),
            })))
            .await?;
        return Ok(());
    }

    let (session, mut outbound) =
        sessions.new_user_session(params.token.as_deref(), &params.nickname, &peer_addr);
    let user = session.user().clone();

    // Spawn write task (outbound queue -> WebSocket); ends when the queue closes
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            match serde_json::to_string(msg.as_ref()) {
                Ok(json) => {
                    if ws_sender.send(WsMessage::Text(json)).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                }
            }
        }
        debug!("Write task ended");

        let _ = ws_sender.close().await;
    });

    // Greet the user before they join, then announce them to the room
    let _ = session.send(Message::welcome(&user).into());
    if let Err(e) = broadcaster.user_entering(session).await {
        // The refusal notice is already queued; let the writer flush it
        warn!("User {} could not enter: {}", user.nickname(), e);
        let _ = write_task.await;
        return Ok(());
    }
    broadcaster.broadcast(Message::user_entered(&user)).await?;
    info!(nickname = %user.nickname(), uid = %user.id(), addr = %peer_addr, "User joined chat");

    // Spawn read task (WebSocket -> Broadcaster)
    let read_broadcaster = broadcaster.clone();
    let read_user = user.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(WsMessage::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Chat { content }) => {
                        let msg = Message::normal(&read_user, content);
                        if read_broadcaster.broadcast(msg).await.is_err() {
                            break;
                        }
                    }
                    Ok(ClientMessage::UserList) => {
                        let Ok(users) = read_broadcaster.get_user_list().await else {
                            break;
                        };
                        let reply = Message::user_list(users);
                        if read_broadcaster.send_to(&read_user, reply).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Invalid JSON from {}: {}", read_user.nickname(), e);
                        let notice = Message::from(AppError::Json(e));
                        let _ = read_broadcaster.send_to(&read_user, notice).await;
                    }
                },
                Ok(WsMessage::Close(_)) => {
                    debug!("{} sent close frame", read_user.nickname());
                    break;
                }
                Ok(_) => {
                    // Binary, ping and pong frames; pong replies are automatic
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", read_user.nickname(), e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", read_user.nickname());
    });

    let writer_done = tokio::select! {
        _ = &mut read_task => {
            debug!("Read task completed for {}", user.nickname());
            false
        }
        _ = &mut write_task => {
            debug!("Write task completed for {}", user.nickname());
            read_task.abort();
            true
        }
    };

    // Leaving closes the outbound queue, which ends the writer
    broadcaster.user_leaving(&user).await?;
    broadcaster.broadcast(Message::user_left(&user)).await?;
    if !writer_done {
        let _ = write_task.await;
    }

    info!(nickname = %user.nickname(), uid = %user.id(), "User left chat");

    Ok(())
}
