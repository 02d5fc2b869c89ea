//! # brain-mirror
//!
//! Mirrors a hierarchical document workspace hosted by a real-time
//! collaborative editing service onto local storage.
//!
//! ## How it works
//!
//! - The session credential is refreshed and written back to the token file
//! - Optionally, the whole workspace is downloaded as a Markdown ZIP and extracted
//! - A ShareDB subscription channel is opened over a WebSocket
//! - The document tree is resolved by subscribing to every reachable cell
//! - The resolved tree is written to one Markdown file, a heading per node,
//!   with leaf content inlined (up to a configured number of leaves)
//!
//! When the channel drops, the whole flow starts over with fresh state.
//!
//! ## Quick Start
//!
//! ```no_run
//! use brain_mirror::{Config, Mirror};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.workspace.brain_id = "my-workspace".to_string();
//!     config.workspace.app_id = "my-app-uid".to_string();
//!
//!     let mirror = Mirror::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = mirror.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let credential = mirror.refresh_credential().await?;
//!     let report = mirror.run_session(&credential, &CancellationToken::new()).await?;
//!     println!("wrote {} headings", report.headings);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Bulk workspace backup
pub mod backup;
/// Subscription channel (ShareDB over WebSocket)
pub mod channel;
/// Configuration types
pub mod config;
/// Session credential handling
pub mod credential;
/// Error types
pub mod error;
/// Leaf content fetching
pub mod fetcher;
/// Mirror orchestration
pub mod mirror;
/// Node resolver
pub mod resolver;
/// Retry logic with exponential backoff
pub mod retry;
/// Tree serializer
pub mod serializer;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use channel::{Collection, ConnectionState, SubscriptionChannel, WebSocketChannel};
pub use config::{Config, FileCollisionAction};
pub use credential::{Credential, TokenStore};
pub use error::{ArchiveError, AuthError, ChannelError, Error, FetchError, Result};
pub use fetcher::{ContentFetcher, ContentStream, HttpContentFetcher};
pub use mirror::Mirror;
pub use resolver::{CompletionGate, ResolutionSession, ResolvedTree};
pub use serializer::{SerializeStats, TreeSerializer};
pub use types::{
    BrainRecord, DocumentNode, Event, ExportReport, NodeId, NodeKind, NodeRecord, SessionId,
};

/// Helper function to run the mirror with graceful signal handling.
///
/// Runs [`Mirror::run`] until a termination signal arrives, then calls the
/// mirror's `shutdown()` method and waits for the loop to finish.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use brain_mirror::{Mirror, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::load(std::path::Path::new("mirror.json"))?;
///     let mirror = Mirror::new(config)?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(mirror).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(mirror: Mirror) -> Result<()> {
    let run = mirror.run();
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => return result,
        _ = wait_for_signal() => {}
    }

    mirror.shutdown().await?;
    run.await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments; ctrl_c is the fallback.
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut term), Ok(mut int)) => {
            let name = tokio::select! {
                _ = term.recv() => "SIGTERM",
                _ = int.recv() => "SIGINT",
            };
            tracing::info!(signal = name, "shutting down");
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "signal handler registration failed, listening for one signal only");
            only.recv().await;
            tracing::info!("shutting down");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "no signal handlers registered, falling back to ctrl_c");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl_c");
        return;
    }
    tracing::info!(signal = "ctrl_c", "shutting down");
}
