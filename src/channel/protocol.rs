//! ShareDB wire messages (the subset used by a read-only mirror)
//!
//! Every frame is a JSON object whose `a` field names the action:
//!
//! | action | direction | meaning |
//! |---|---|---|
//! | `init` | server → client | connection greeting |
//! | `hs` | both | handshake |
//! | `s` | both | subscribe request / snapshot reply |
//! | `op` | server → client | live operation (ignored) |

use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Messages sent by the mirror
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "a")]
pub enum ClientMessage {
    /// Handshake
    #[serde(rename = "hs")]
    Handshake {
        /// Client id to resume, none for a fresh connection
        id: Option<String>,
    },
    /// Subscribe to a document
    #[serde(rename = "s")]
    Subscribe {
        /// Collection name
        c: String,
        /// Document id
        d: String,
    },
}

impl ClientMessage {
    /// Subscribe request for `collection/id`
    pub fn subscribe(collection: &str, id: &str) -> Self {
        ClientMessage::Subscribe {
            c: collection.to_string(),
            d: id.to_string(),
        }
    }

    /// Serialize to a text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Error object attached to a failed reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Numeric or string error code
    #[serde(default)]
    pub code: serde_json::Value,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
}

impl RemoteError {
    /// Convert into a channel error
    pub fn into_channel_error(self) -> ChannelError {
        ChannelError::Remote {
            code: self.code.as_i64().unwrap_or(-1),
            message: self.message,
        }
    }
}

/// Document snapshot as delivered in a subscribe reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Document version
    #[serde(default)]
    pub v: u64,
    /// OT type URI, absent when the document does not exist
    #[serde(default, rename = "type")]
    pub doc_type: Option<String>,
    /// Document content
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl Snapshot {
    /// Whether the document exists on the server
    pub fn exists(&self) -> bool {
        self.doc_type.is_some()
    }
}

/// Messages received from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "a")]
pub enum ServerMessage {
    /// Connection greeting
    #[serde(rename = "init")]
    Init {
        /// Protocol version
        #[serde(default)]
        protocol: Option<u32>,
        /// Client id assigned by the server
        #[serde(default)]
        id: Option<String>,
    },
    /// Handshake reply
    #[serde(rename = "hs")]
    Handshake {
        /// Client id assigned by the server
        #[serde(default)]
        id: Option<String>,
        /// Error, if the handshake was refused
        #[serde(default)]
        error: Option<RemoteError>,
    },
    /// Subscribe reply
    #[serde(rename = "s")]
    Subscribe {
        /// Collection name
        c: String,
        /// Document id
        d: String,
        /// Snapshot, absent on error or when the client was already current
        #[serde(default)]
        data: Option<Snapshot>,
        /// Error, if the subscription was refused
        #[serde(default)]
        error: Option<RemoteError>,
    },
    /// Any other action (ops, presence, queries)
    #[serde(other)]
    Other,
}

impl ServerMessage {
    /// Parse a text frame
    pub fn from_json(text: &str) -> Result<Self, ChannelError> {
        serde_json::from_str(text).map_err(|e| ChannelError::Protocol(e.to_string()))
    }
}
