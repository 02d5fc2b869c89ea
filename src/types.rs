//! Core types for brain-mirror

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Opaque identifier of a document node, stable across sessions
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Create a new NodeId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one resolution + serialization pass
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of a document node
///
/// The remote service reports kinds as strings. `LEAF` is the only kind with
/// exportable content; the workspace root is reported as `BRAIN`. Every other
/// non-empty kind is treated as a container.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    /// Not resolved yet, or the server sent no kind
    #[default]
    Unknown,
    /// May have children
    Branch,
    /// No children, has exportable content
    Leaf,
    /// Workspace root
    Root,
}

impl NodeKind {
    /// Map a wire kind string onto a NodeKind
    pub fn from_wire(kind: &str) -> Self {
        match kind {
            "" => NodeKind::Unknown,
            "LEAF" => NodeKind::Leaf,
            "BRAIN" | "ROOT" => NodeKind::Root,
            _ => NodeKind::Branch,
        }
    }

    /// Wire representation
    pub fn as_wire(&self) -> &'static str {
        match self {
            NodeKind::Unknown => "",
            NodeKind::Branch => "BRANCH",
            NodeKind::Leaf => "LEAF",
            NodeKind::Root => "ROOT",
        }
    }
}

impl From<String> for NodeKind {
    fn from(kind: String) -> Self {
        NodeKind::from_wire(&kind)
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_wire().to_string()
    }
}

/// A node of the mirrored document tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentNode {
    /// Node identifier
    pub id: NodeId,
    /// Display title (the id until real data arrives)
    pub title: String,
    /// Node kind
    pub kind: NodeKind,
    /// Children in the order reported by the remote source
    pub children: Vec<DocumentNode>,
}

impl DocumentNode {
    /// An unresolved node: titled with its own id, unknown kind, no children
    pub fn unresolved(id: NodeId) -> Self {
        Self {
            title: id.0.clone(),
            id,
            kind: NodeKind::Unknown,
            children: Vec::new(),
        }
    }

    /// Total number of nodes in this subtree, including this one
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(DocumentNode::node_count).sum::<usize>()
    }
}

/// Snapshot fields of a cell (`ot_cell` collection)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    /// Cell title
    #[serde(default)]
    pub title: String,
    /// Cell kind
    #[serde(default)]
    pub kind: NodeKind,
    /// Ordered child cell ids
    #[serde(default)]
    pub child_ids: Vec<NodeId>,
}

/// Snapshot fields of the workspace record (`ot_brain` collection)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrainRecord {
    /// Root cell of the document hierarchy
    pub main_cell_id: NodeId,
    /// Workspace title
    #[serde(default)]
    pub title: String,
}

/// Outcome of a finished session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportReport {
    /// Session that produced the export
    pub session: SessionId,
    /// Path of the written export file
    pub output_path: PathBuf,
    /// Nodes a subscription was issued for
    pub visited: usize,
    /// Nodes whose data arrived
    pub resolved: usize,
    /// Nodes skipped after a failed or timed-out subscription
    pub skipped: Vec<NodeId>,
    /// Headings written
    pub headings: usize,
    /// Leaves whose content was inlined
    pub leaves_inlined: usize,
    /// Leaves whose content fetch failed
    pub leaves_failed: usize,
    /// When resolution started
    pub started_at: DateTime<Utc>,
    /// When the export file was finalized
    pub finished_at: DateTime<Utc>,
}

/// Event emitted during the mirror lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Session credential was refreshed
    CredentialRefreshed,

    /// Backup archive was saved
    BackupDownloaded {
        /// Where the archive was written
        path: PathBuf,
        /// Archive size in bytes
        bytes: u64,
    },

    /// Backup archive was extracted
    BackupExtracted {
        /// Extraction directory
        dir: PathBuf,
        /// Number of extracted files
        files: usize,
    },

    /// Sync channel connected and a session started
    SessionStarted {
        /// Session ID
        session: SessionId,
    },

    /// A node's data arrived
    NodeResolved {
        /// Session ID
        session: SessionId,
        /// Node ID
        id: NodeId,
        /// Node title
        title: String,
        /// Distance from the root
        depth: usize,
    },

    /// A node's subscription failed or timed out
    NodeSkipped {
        /// Session ID
        session: SessionId,
        /// Node ID
        id: NodeId,
        /// Failure description
        reason: String,
    },

    /// Every issued subscription completed (fires once per session)
    ResolutionComplete {
        /// Session ID
        session: SessionId,
        /// Nodes whose data arrived
        resolved: usize,
        /// Nodes a subscription was issued for
        visited: usize,
    },

    /// Leaf content was inlined into the export
    LeafFetched {
        /// Session ID
        session: SessionId,
        /// Leaf ID
        id: NodeId,
        /// Bytes written
        bytes: u64,
    },

    /// Leaf content fetch failed (export continues)
    LeafFetchFailed {
        /// Session ID
        session: SessionId,
        /// Leaf ID
        id: NodeId,
        /// Error message
        error: String,
    },

    /// Export file finalized
    ExportWritten {
        /// Session ID
        session: SessionId,
        /// Export file path
        path: PathBuf,
    },

    /// Sync channel dropped, session discarded
    Disconnected {
        /// Session ID
        session: SessionId,
    },

    /// Mirror is shutting down
    Shutdown,
}
