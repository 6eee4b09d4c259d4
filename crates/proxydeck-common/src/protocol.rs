//! Wire protocol between the terminal bridge and its clients.
//!
//! JSON text frames tagged by `type`. Terminal output is base64 encoded so
//! byte chunks that split a UTF-8 sequence arrive intact.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::id::SessionId;

/// Messages received from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Spawn the session's shell if it is not running.
    Start,

    /// Keystrokes, delivered verbatim.
    Input { data: String },

    Resize { cols: u16, rows: u16 },

    Ping,
}

/// Messages sent to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message on every connection.
    Ready { session_id: SessionId },

    /// Raw shell output, base64 encoded.
    Output { data: String },

    /// The shell exited on its own.
    Exit { code: Option<u32> },

    Pong,
}

impl ServerMessage {
    pub fn output(bytes: &[u8]) -> Self {
        ServerMessage::Output {
            data: STANDARD.encode(bytes),
        }
    }

    /// Decode the payload of an `output` message. `None` for other kinds
    /// or an invalid payload.
    pub fn output_bytes(&self) -> Option<Vec<u8>> {
        match self {
            ServerMessage::Output { data } => STANDARD.decode(data).ok(),
            _ => None,
        }
    }

    pub fn to_json(&self) -> String {
        // Plain enums with string/integer fields always serialize
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl ClientMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
