//! Node resolver
//!
//! Discovers the document hierarchy by subscribing to every reachable cell,
//! starting from the workspace's main cell. Nothing tells us up front how many
//! cells exist, so resolution is driven by a work queue:
//!
//! 1. a cell id is queued (and marked visited) the first time it is seen
//! 2. up to `max_in_flight` subscriptions run at once, each bounded by
//!    `subscription_timeout`
//! 3. when a record arrives its children are queued
//! 4. resolution is complete when every issued subscription has completed
//!
//! A subscription that fails or times out marks the cell skipped; the walk
//! continues without it. All bookkeeping lives in one [`ResolutionSession`]
//! driven by a single task, so no locking is needed.

mod gate;
mod tree;


pub use gate::CompletionGate;
pub use tree::assemble;

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::SubscriptionChannel;
use crate::config::ResolverConfig;
use crate::error::{ChannelError, Error, Result};
use crate::types::{DocumentNode, Event, NodeId, NodeRecord, SessionId};

/// Result of a finished resolution
#[derive(Debug, Clone)]
pub struct ResolvedTree {
    /// Assembled document tree
    pub root: DocumentNode,
    /// Number of cells a subscription was issued for
    pub visited: usize,
    /// Number of cells whose record arrived
    pub resolved: usize,
    /// Cells whose subscription failed or timed out, in completion order
    pub skipped: Vec<NodeId>,
    /// When the first subscription was issued
    pub started_at: DateTime<Utc>,
}

type Outcome = (NodeId, usize, std::result::Result<NodeRecord, ChannelError>);

/// Bookkeeping for one tree download
///
/// Created fresh for every connection and dropped once the export is written.
pub struct ResolutionSession {
    session: SessionId,
    config: ResolverConfig,
    event_tx: broadcast::Sender<Event>,
    visited: HashSet<NodeId>,
    resolved: HashSet<NodeId>,
    records: HashMap<NodeId, NodeRecord>,
    skipped: Vec<NodeId>,
    queue: VecDeque<(NodeId, usize)>,
    issued: usize,
    completed: usize,
    gate: CompletionGate,
    started_at: DateTime<Utc>,
}

impl ResolutionSession {
    /// Create an empty session
    pub fn new(
        session: SessionId,
        config: ResolverConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            session,
            config,
            event_tx,
            visited: HashSet::new(),
            resolved: HashSet::new(),
            records: HashMap::new(),
            skipped: Vec::new(),
            queue: VecDeque::new(),
            issued: 0,
            completed: 0,
            gate: CompletionGate::new(),
            started_at: Utc::now(),
        }
    }

    /// Session identifier
    pub fn id(&self) -> SessionId {
        self.session
    }

    /// Completion gate, fired once when every issued subscription completed
    pub fn completion(&self) -> &CompletionGate {
        &self.gate
    }

    /// Number of cells a subscription was issued for
    pub fn visited(&self) -> usize {
        self.visited.len()
    }

    /// Number of cells whose record arrived
    pub fn resolved(&self) -> usize {
        self.resolved.len()
    }

    /// Resolve every cell reachable from `root` and assemble the tree
    ///
    /// `root_title` (the workspace title) names the root until its own record
    /// overrides it. Cells already visited by this session are not subscribed
    /// again. Returns [`Error::Cancelled`] if `cancel` fires,
    /// a channel error if the connection drops, and
    /// [`Error::IncompleteResolution`] if the root itself cannot be loaded.
    pub async fn resolve<C>(
        &mut self,
        channel: &C,
        root: &NodeId,
        root_title: &str,
        cancel: &CancellationToken,
    ) -> Result<ResolvedTree>
    where
        C: SubscriptionChannel + ?Sized,
    {
        info!(session = %self.session, root = %root, "started downloading tree information");
        self.request(root.clone(), 0);

        let mut in_flight: FuturesUnordered<BoxFuture<'_, Outcome>> = FuturesUnordered::new();
        let limit = self.config.max_in_flight.max(1);
        let timeout = self.config.subscription_timeout;

        loop {
            while in_flight.len() < limit {
                let Some((id, depth)) = self.queue.pop_front() else {
                    break;
                };
                in_flight.push(Box::pin(async move {
                    let outcome = match tokio::time::timeout(timeout, channel.load_node(&id)).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(ChannelError::Timeout {
                            id: id.to_string(),
                            after: timeout,
                        }),
                    };
                    (id, depth, outcome)
                }));
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(session = %self.session, "resolution cancelled");
                    return Err(Error::Cancelled);
                }
                Some((id, depth, outcome)) = in_flight.next() => {
                    self.completed += 1;
                    match outcome {
                        Ok(record) => self.on_loaded(id, depth, record),
                        Err(ChannelError::Disconnected) => {
                            warn!(session = %self.session, node_id = %id, "connection lost during resolution");
                            return Err(Error::Channel(ChannelError::Disconnected));
                        }
                        Err(e) => self.on_failed(id, e),
                    }
                }
            }
        }

        // Covers sessions whose last completion was a skip or a branch whose
        // children were all seen before; a no-op if a leaf already fired it.
        self.check_complete();

        if !self.resolved.contains(root) {
            return Err(Error::IncompleteResolution {
                resolved: self.resolved.len(),
                visited: self.visited.len(),
            });
        }

        Ok(ResolvedTree {
            root: assemble(root, root_title, &self.records),
            visited: self.visited.len(),
            resolved: self.resolved.len(),
            skipped: self.skipped.clone(),
            started_at: self.started_at,
        })
    }

    /// Queue a subscription unless the cell was already visited
    fn request(&mut self, id: NodeId, depth: usize) -> bool {
        if self.visited.contains(&id) {
            debug!(session = %self.session, node_id = %id, "already visited");
            return false;
        }
        self.visited.insert(id.clone());
        self.queue.push_back((id, depth));
        self.issued += 1;
        true
    }

    fn on_loaded(&mut self, id: NodeId, depth: usize, record: NodeRecord) {
        debug!(
            session = %self.session,
            node_id = %id,
            depth,
            title = %record.title,
            children = record.child_ids.len(),
            "resolved"
        );
        self.emit(Event::NodeResolved {
            session: self.session,
            id: id.clone(),
            title: record.title.clone(),
            depth,
        });

        for child in &record.child_ids {
            self.request(child.clone(), depth + 1);
        }
        let is_leaf = record.child_ids.is_empty();
        self.resolved.insert(id.clone());
        self.records.insert(id, record);

        if is_leaf {
            self.check_complete();
        }
    }

    fn on_failed(&mut self, id: NodeId, error: ChannelError) {
        warn!(session = %self.session, node_id = %id, error = %error, "skipping node");
        self.emit(Event::NodeSkipped {
            session: self.session,
            id: id.clone(),
            reason: error.to_string(),
        });
        self.skipped.push(id);
    }

    fn check_complete(&self) {
        if self.completed != self.issued || !self.queue.is_empty() {
            return;
        }
        if self.gate.fire() {
            info!(
                session = %self.session,
                resolved = self.resolved.len(),
                visited = self.visited.len(),
                skipped = self.skipped.len(),
                "completed downloading tree information"
            );
            self.emit(Event::ResolutionComplete {
                session: self.session,
                resolved: self.resolved.len(),
                visited: self.visited.len(),
            });
        }
    }

    fn emit(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine
        self.event_tx.send(event).ok();
    }
}
