//! Shared in-memory collaborators for unit tests.

use crate::channel::{Collection, Snapshot, SubscriptionChannel};
use crate::error::{ChannelError, FetchError};
use crate::fetcher::{ContentFetcher, ContentStream};
use crate::types::{BrainRecord, NodeId, NodeKind, NodeRecord};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Subscription channel backed by a fixed set of records.
///
/// Every `subscribe` call is counted (this fake has no snapshot cache, so
/// the count is exactly what the caller asked for). Per-id delays simulate
/// out-of-order arrival; `hang` ids never load.
#[derive(Default)]
pub(crate) struct FakeChannel {
    cells: HashMap<String, NodeRecord>,
    brains: HashMap<String, BrainRecord>,
    delays: HashMap<String, Duration>,
    hang: HashSet<String>,
    disconnect: HashSet<String>,
    subscriptions: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeChannel {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn brain(mut self, id: &str, main_cell: &str, title: &str) -> Self {
        self.brains.insert(
            id.to_string(),
            BrainRecord {
                main_cell_id: NodeId::from(main_cell),
                title: title.to_string(),
            },
        );
        self
    }

    pub(crate) fn node(mut self, id: &str, title: &str, kind: NodeKind, children: &[&str]) -> Self {
        self.cells.insert(
            id.to_string(),
            NodeRecord {
                title: title.to_string(),
                kind,
                child_ids: children.iter().map(|c| NodeId::from(*c)).collect(),
            },
        );
        self
    }

    pub(crate) fn branch(self, id: &str, title: &str, children: &[&str]) -> Self {
        self.node(id, title, NodeKind::Branch, children)
    }

    pub(crate) fn leaf(self, id: &str, title: &str) -> Self {
        self.node(id, title, NodeKind::Leaf, &[])
    }

    pub(crate) fn delay(mut self, id: &str, millis: u64) -> Self {
        self.delays
            .insert(id.to_string(), Duration::from_millis(millis));
        self
    }

    pub(crate) fn hang(mut self, id: &str) -> Self {
        self.hang.insert(id.to_string());
        self
    }

    pub(crate) fn disconnect_on(mut self, id: &str) -> Self {
        self.disconnect.insert(id.to_string());
        self
    }

    pub(crate) fn subscriptions(&self, id: &str) -> usize {
        self.subscriptions
            .lock()
            .unwrap()
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn total_subscriptions(&self) -> usize {
        self.subscriptions.lock().unwrap().values().sum()
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn snapshot(data: serde_json::Value) -> Snapshot {
    Snapshot {
        v: 1,
        doc_type: Some("http://sharejs.org/types/JSONv0".to_string()),
        data: Some(data),
    }
}

#[async_trait]
impl SubscriptionChannel for FakeChannel {
    async fn subscribe(&self, collection: Collection, id: &str) -> Result<Snapshot, ChannelError> {
        *self
            .subscriptions
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(delay) = self.delays.get(id) {
            tokio::time::sleep(*delay).await;
        }
        if self.hang.contains(id) {
            std::future::pending::<()>().await;
        }
        if self.disconnect.contains(id) {
            return Err(ChannelError::Disconnected);
        }

        let data = match collection {
            Collection::Brain => self.brains.get(id).map(serde_json::to_value),
            Collection::Cell => self.cells.get(id).map(serde_json::to_value),
        };
        match data {
            Some(value) => Ok(snapshot(value.unwrap())),
            None => Ok(Snapshot {
                v: 0,
                doc_type: None,
                data: None,
            }),
        }
    }
}

/// Content of one leaf served by [`FakeFetcher`]
#[derive(Clone)]
pub(crate) enum FakeContent {
    /// Stream these chunks
    Chunks(Vec<&'static str>),
    /// Fail before any byte is produced
    Fail,
    /// Produce these chunks, then fail mid-stream
    Broken(Vec<&'static str>),
    /// Produce these chunks, then never finish
    Stall(Vec<&'static str>),
}

/// Leaf content source that records every fetch
#[derive(Default)]
pub(crate) struct FakeFetcher {
    content: HashMap<NodeId, FakeContent>,
    calls: Mutex<Vec<NodeId>>,
}

impl FakeFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, id: &str, content: FakeContent) -> Self {
        self.content.insert(NodeId::from(id), content);
        self
    }

    pub(crate) fn text(self, id: &str, text: &'static str) -> Self {
        self.with(id, FakeContent::Chunks(vec![text]))
    }

    pub(crate) fn calls(&self) -> Vec<NodeId> {
        self.calls.lock().unwrap().clone()
    }
}

fn network_error(id: &NodeId) -> FetchError {
    FetchError::Network {
        id: id.clone(),
        reason: "connection reset".to_string(),
        transient: true,
    }
}

#[async_trait]
impl ContentFetcher for FakeFetcher {
    async fn fetch(&self, id: &NodeId) -> Result<ContentStream, FetchError> {
        self.calls.lock().unwrap().push(id.clone());
        let chunks = match self.content.get(id) {
            Some(FakeContent::Chunks(chunks)) => chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .collect::<Vec<_>>(),
            Some(FakeContent::Broken(chunks)) => chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .chain(std::iter::once(Err(network_error(id))))
                .collect(),
            Some(FakeContent::Stall(chunks)) => {
                let head = chunks
                    .iter()
                    .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                    .collect::<Vec<_>>();
                return Ok(Box::pin(
                    futures::stream::iter(head).chain(futures::stream::pending()),
                ));
            }
            Some(FakeContent::Fail) => return Err(network_error(id)),
            None => return Err(FetchError::NotFound { id: id.clone() }),
        };
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}
