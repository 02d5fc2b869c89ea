//! Subscription channel
//!
//! A persistent real-time connection to the remote service. The resolver only
//! needs one thing from it: "subscribe to document N and hand me its data once
//! it has loaded".
//!
//! ```text
//! ┌────────────┐  subscribe(c, id)  ┌──────────────────┐   {"a":"s"}   ┌────────┐
//! │  Resolver  │───────────────────►│ SubscriptionChan │──────────────►│ ShareDB│
//! │            │◄───────────────────│   (trait)        │◄──────────────│ server │
//! └────────────┘   Snapshot         └──────────────────┘   snapshot    └────────┘
//! ```
//!
//! [`WebSocketChannel`] speaks ShareDB over `tokio-tungstenite`; tests use
//! in-memory implementations of the trait.

pub mod protocol;
mod websocket;


pub use protocol::Snapshot;
pub use websocket::{ConnectionState, WebSocketChannel};

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::types::{BrainRecord, NodeId, NodeRecord};

/// Document collections read by the mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Workspace records (`mainCellId`, `title`)
    Brain,
    /// Cell records (`title`, `kind`, `childIds`)
    Cell,
}

impl Collection {
    /// Collection name on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Brain => "ot_brain",
            Collection::Cell => "ot_cell",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription-based document source
///
/// `subscribe` resolves exactly once, when the document's authoritative data
/// first becomes available. Subscribing again to a loaded document returns
/// the same data without another round trip.
#[async_trait]
pub trait SubscriptionChannel: Send + Sync {
    /// Subscribe to `collection/id` and wait for its snapshot
    async fn subscribe(&self, collection: Collection, id: &str) -> Result<Snapshot, ChannelError>;

    /// Load a cell record
    async fn load_node(&self, id: &NodeId) -> Result<NodeRecord, ChannelError> {
        let snapshot = self.subscribe(Collection::Cell, id.as_str()).await?;
        decode(Collection::Cell, id.as_str(), snapshot)
    }

    /// Load the workspace record
    async fn load_brain(&self, brain_id: &str) -> Result<BrainRecord, ChannelError> {
        let snapshot = self.subscribe(Collection::Brain, brain_id).await?;
        decode(Collection::Brain, brain_id, snapshot)
    }
}

/// Decode the content of an existing document
fn decode<T: serde::de::DeserializeOwned>(
    collection: Collection,
    id: &str,
    snapshot: Snapshot,
) -> Result<T, ChannelError> {
    if !snapshot.exists() {
        return Err(ChannelError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        });
    }
    let data = snapshot.data.unwrap_or(serde_json::Value::Null);
    serde_json::from_value(data).map_err(|e| {
        ChannelError::Protocol(format!("malformed {}/{}: {}", collection, id, e))
    })
}
