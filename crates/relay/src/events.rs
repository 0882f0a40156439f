//! Wire protocol for the relay WebSocket.
//!
//! Every frame is a JSON object tagged by `type`. Clients send
//! authentication and chat frames; the relay answers each sender directly
//! with [`ServerEvent`] frames and fans [`RelayMessage`] frames out to live
//! sessions.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Frames a client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Signup {
        username: String,
        password: String,
        #[serde(default)]
        invite_code: Option<String>,
    },
    Login {
        username: String,
        password: String,
    },
    Message {
        content: String,
        #[serde(rename = "messageKey", default)]
        message_key: Option<String>,
    },
    GenerateInvite,
}

/// Frames the relay sends to one client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    AuthSuccess { message: String },
    AuthError { message: String },
    History { messages: Vec<RelayMessage> },
    InviteCode { code: String, message: String },
}

/// Frames broadcast to live sessions and replayed from history.
///
/// Chat frames carry the sender's optional `messageKey` back to every
/// recipient verbatim; the field is omitted entirely when the sender did
/// not supply one, and history entries never carry it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    #[serde(rename = "message")]
    Chat {
        username: String,
        content: String,
        timestamp: String,
        #[serde(rename = "messageKey", skip_serializing_if = "Option::is_none")]
        message_key: Option<String>,
    },
    System {
        content: String,
        timestamp: String,
    },
}

impl RelayMessage {
    /// A chat frame stamped with the current time. Carries no `messageKey`;
    /// outbound copies attach one with [`RelayMessage::with_message_key`].
    pub fn chat(username: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Chat {
            username: username.into(),
            content: content.into(),
            timestamp: Utc::now().to_rfc3339(),
            message_key: None,
        }
    }

    /// A system notice stamped with the current time.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Attach the sender-supplied correlation key to an outbound copy.
    /// System notices are unaffected.
    pub fn with_message_key(mut self, key: Option<String>) -> Self {
        if let Self::Chat { message_key, .. } = &mut self {
            *message_key = key;
        }
        self
    }
}
