//! Error types for brain-mirror
//!
//! This module provides the error taxonomy for the library:
//! - A top-level [`Error`] returned by session-level operations
//! - Domain-specific errors for each collaborator (credential, sync channel,
//!   leaf content fetch, backup archive)
//!
//! Failures local to a single node (a leaf fetch, a subscription that times
//! out) are recorded and logged by the caller rather than propagated; failures
//! of the credential refresh or the backup abort session startup.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::NodeId;

/// Result type alias for brain-mirror operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for brain-mirror
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "workspace.brain_id")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error from the HTTP client
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Credential could not be read or refreshed
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Real-time sync channel failure
    #[error("sync channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Leaf content or cell export download failure
    #[error("content fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Backup archive could not be downloaded or extracted
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// The workspace root could not be resolved at all
    #[error("resolution incomplete: {resolved} of {visited} nodes resolved")]
    IncompleteResolution {
        /// Number of nodes whose data arrived
        resolved: usize,
        /// Number of nodes a subscription was issued for
        visited: usize,
    },

    /// The session was cancelled (shutdown or disconnect)
    #[error("session cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Credential errors (token file and session refresh)
#[derive(Debug, Error)]
pub enum AuthError {
    /// Token file could not be read
    #[error("failed to read token file {path}: {reason}")]
    TokenFileUnreadable {
        /// Path of the token file
        path: PathBuf,
        /// Underlying reason
        reason: String,
    },

    /// Token file exists but holds no token
    #[error("token file {path} is empty")]
    EmptyToken {
        /// Path of the token file
        path: PathBuf,
    },

    /// The refresh endpoint rejected the credential
    #[error("session refresh rejected with HTTP {status}")]
    Rejected {
        /// HTTP status code returned by the refresh endpoint
        status: u16,
    },

    /// Credential cannot be encoded as an HTTP header
    #[error("credential contains characters not allowed in a header: {0}")]
    InvalidHeader(String),
}

/// Leaf content fetch errors
///
/// The serializer treats every variant as non-fatal for the overall walk.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The node has no exportable content on the server
    #[error("node {id} not found")]
    NotFound {
        /// The node that was requested
        id: NodeId,
    },

    /// The credential was not accepted for this node
    #[error("not authorized to export node {id}")]
    Unauthorized {
        /// The node that was requested
        id: NodeId,
    },

    /// Connection, timeout or body read failure
    #[error("network failure fetching node {id}: {reason}")]
    Network {
        /// The node that was requested
        id: NodeId,
        /// Underlying reason
        reason: String,
        /// Whether the failure looks transient (timeout, connect, reset)
        transient: bool,
    },

    /// Any other non-success HTTP status
    #[error("unexpected HTTP {status} exporting node {id}")]
    Status {
        /// The node that was requested
        id: NodeId,
        /// HTTP status code
        status: u16,
    },
}

/// Subscription channel errors
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// WebSocket connection could not be established
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection dropped while the subscription was pending
    #[error("connection closed")]
    Disconnected,

    /// Message could not be sent
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Server sent something that does not follow the protocol
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server answered the subscription with an error
    #[error("remote error {code}: {message}")]
    Remote {
        /// Error code reported by the server
        code: i64,
        /// Error message reported by the server
        message: String,
    },

    /// Document does not exist (deleted or never created)
    #[error("{collection}/{id} does not exist")]
    NotFound {
        /// Collection name
        collection: String,
        /// Document id
        id: String,
    },

    /// No data arrived for the subscription in time
    #[error("subscription to {id} timed out after {after:?}")]
    Timeout {
        /// Document id
        id: String,
        /// Configured timeout
        after: Duration,
    },
}

/// Backup archive errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The archive endpoint did not return the archive
    #[error("archive download failed with HTTP {status}")]
    DownloadFailed {
        /// HTTP status code
        status: u16,
    },

    /// Archive extraction failed
    #[error("extraction failed for {archive}: {reason}")]
    ExtractionFailed {
        /// The archive file that failed to extract
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },
}
