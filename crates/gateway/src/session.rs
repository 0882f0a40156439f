//! Per-connection session lifecycle.
//!
//! Each socket is handled by one task: an in-band authentication loop on
//! the raw socket, then a spawned write task draining the connection's
//! bounded queue while this task keeps reading. Nothing touches the
//! registry until authentication succeeds, so a connection abandoned
//! mid-auth leaves no trace and triggers no notices.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crosstalk_accounts::AuthError;
use crosstalk_relay::{ClientEvent, RelayMessage, ServerEvent};

use crate::connection::ClientConnection;
use crate::state::RelayState;

/// Depth of each connection's outbound queue. A client that falls further
/// behind than this starts losing frames (see [`crate::fanout`]).
const OUTBOUND_QUEUE_DEPTH: usize = 100;

pub(crate) async fn relay_websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<RelayState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: RelayState) {
    let (mut sink, mut stream) = socket.split();

    let Some(username) = authenticate(&mut sink, &mut stream, &state).await else {
        debug!("connection closed before authentication");
        return;
    };

    let connection_id = cuid2::create_id();
    let (tx, rx) = mpsc::channel::<Arc<String>>(OUTBOUND_QUEUE_DEPTH);
    let connection = Arc::new(ClientConnection::new(
        connection_id.clone(),
        username.clone(),
        tx,
    ));
    let writer = tokio::spawn(write_loop(sink, rx));

    state.registry.register(Arc::clone(&connection)).await;
    info!(
        connection_id = %connection_id,
        username = %username,
        live = state.registry.count(),
        "session authenticated"
    );

    // The newcomer gets the replay; everyone else hears about the arrival.
    let messages = state.history.snapshot().await;
    send_event(&connection, &ServerEvent::History { messages });
    state
        .broadcast(
            &RelayMessage::system(format!("{username} joined the chat")),
            Some(&connection_id),
        )
        .await;

    read_loop(&mut stream, &state, &connection).await;

    connection.close();
    state.registry.unregister(&connection_id).await;
    state
        .broadcast(
            &RelayMessage::system(format!("{username} left the chat")),
            Some(&connection_id),
        )
        .await;
    let _ = writer.await;
    info!(
        connection_id = %connection_id,
        username = %username,
        live = state.registry.count(),
        "session closed"
    );
}

/// Drive the authentication loop until a signup or login succeeds.
///
/// Every attempt is acknowledged with exactly one reply; a rejected attempt
/// leaves the connection open for another try. Returns `None` when the
/// client disconnects first.
async fn authenticate(
    sink: &mut SplitSink<WebSocket, Message>,
    stream: &mut SplitStream<WebSocket>,
    state: &RelayState,
) -> Option<String> {
    while let Some(frame) = stream.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(err) => {
                debug!(error = %err, "websocket error during authentication");
                return None;
            }
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => return None,
            _ => continue,
        };

        let outcome = match serde_json::from_str::<ClientEvent>(&text) {
            Ok(ClientEvent::Signup {
                username,
                password,
                invite_code,
            }) => state
                .auth
                .signup(&username, &password, invite_code.as_deref())
                .await
                .map(|username| (username, "Account created successfully")),
            Ok(ClientEvent::Login { username, password }) => state
                .auth
                .login(&username, &password)
                .map(|username| (username, "Login successful")),
            Ok(_) => Err(AuthError::MalformedRequest),
            Err(err) => {
                debug!(error = %err, "unparseable frame during authentication");
                Err(AuthError::MalformedRequest)
            }
        };

        match outcome {
            Ok((username, message)) => {
                let accepted = ServerEvent::AuthSuccess {
                    message: message.to_string(),
                };
                if !reply(sink, &accepted).await {
                    return None;
                }
                return Some(username);
            }
            Err(err) => {
                warn!(error = %err, "authentication attempt rejected");
                let rejected = ServerEvent::AuthError {
                    message: err.to_string(),
                };
                if !reply(sink, &rejected).await {
                    return None;
                }
            }
        }
    }

    None
}

/// Read frames from an authenticated session until the socket ends.
async fn read_loop(
    stream: &mut SplitStream<WebSocket>,
    state: &RelayState,
    connection: &Arc<ClientConnection>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => handle_event(event, state, connection).await,
                Err(err) => {
                    warn!(
                        connection_id = %connection.id,
                        username = %connection.username,
                        error = %err,
                        "dropping unparseable frame"
                    );
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(
                    connection_id = %connection.id,
                    error = %err,
                    "websocket error, ending session"
                );
                break;
            }
        }
    }
}

/// Dispatch one parsed frame from an authenticated session.
async fn handle_event(event: ClientEvent, state: &RelayState, connection: &Arc<ClientConnection>) {
    match event {
        ClientEvent::Message {
            content,
            message_key,
        } => {
            debug!(
                username = %connection.username,
                "relaying chat message"
            );
            // History keeps the plain message; only the live broadcast
            // carries the sender's correlation key.
            let stored = RelayMessage::chat(connection.username.clone(), content);
            state.history.append(stored.clone()).await;
            state
                .broadcast(&stored.with_message_key(message_key), None)
                .await;
        }
        ClientEvent::GenerateInvite => {
            let code = state.invites.issue(&connection.username).await;
            info!(username = %connection.username, "invite code issued");
            send_event(
                connection,
                &ServerEvent::InviteCode {
                    message: format!("Invite code generated: {code}"),
                    code,
                },
            );
        }
        ClientEvent::Signup { .. } | ClientEvent::Login { .. } => {
            warn!(
                connection_id = %connection.id,
                username = %connection.username,
                "dropping authentication frame on an authenticated session"
            );
        }
    }
}

/// Queue a server event on one connection.
fn send_event(connection: &ClientConnection, event: &ServerEvent) {
    match serde_json::to_string(event) {
        Ok(json) => {
            if !connection.send(Arc::new(json)) {
                warn!(
                    connection_id = %connection.id,
                    username = %connection.username,
                    "dropped direct frame for slow client"
                );
            }
        }
        Err(err) => warn!(error = %err, "failed to serialize outbound frame"),
    }
}

/// Send one frame on the raw sink. Returns `false` when the socket is gone.
async fn reply(sink: &mut SplitSink<WebSocket, Message>, event: &ServerEvent) -> bool {
    let Ok(json) = serde_json::to_string(event) else {
        return false;
    };
    sink.send(Message::Text(json)).await.is_ok()
}

/// Drain the outbound queue onto the socket until the channel closes or a
/// write fails.
async fn write_loop(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Arc<String>>) {
    while let Some(frame) = rx.recv().await {
        if let Err(err) = sink.send(Message::Text((*frame).clone())).await {
            debug!(error = %err, "stopping writer after failed send");
            break;
        }
    }
}
