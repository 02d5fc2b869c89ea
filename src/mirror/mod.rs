//! Mirror orchestration split into focused submodules.
//!
//! The `Mirror` struct ties the collaborators together:
//! - [`session`] - one resolution + serialization pass over an open channel
//! - [`lifecycle`] - reconnect loop and shutdown
//!
//! Credential refresh, backups and single cell exports are one-shot calls
//! defined here.

mod lifecycle;
mod session;


use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::backup::{download_backup, extract_backup};
use crate::config::Config;
use crate::credential::{self, Credential, TokenStore};
use crate::error::Result;
use crate::fetcher::HttpContentFetcher;
use crate::types::{Event, NodeId, SessionId};

/// Workspace mirror
///
/// Cheap to clone; clones share configuration, HTTP client, event channel
/// and shutdown token.
#[derive(Clone)]
pub struct Mirror {
    /// Configuration (wrapped in Arc for sharing)
    pub(crate) config: Arc<Config>,
    /// HTTP client for refresh, backup and content requests
    pub(crate) client: reqwest::Client,
    /// Token file holding the session credential
    pub(crate) token_store: TokenStore,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Session counter
    next_session: Arc<AtomicU64>,
    /// Cancelled on shutdown; parent of every session token
    pub(crate) shutdown_token: CancellationToken,
}

impl Mirror {
    /// Create a mirror from a validated configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid, or a network
    /// error if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.endpoints.request_timeout)
            .build()?;
        // Subscribers that fall more than 1000 events behind see `Lagged`.
        let (event_tx, _rx) = broadcast::channel(1000);
        let token_store = TokenStore::new(config.token_path.clone());

        info!(brain_id = %config.workspace.brain_id, "mirror initialized");

        Ok(Self {
            config: Arc::new(config),
            client,
            token_store,
            event_tx,
            next_session: Arc::new(AtomicU64::new(1)),
            shutdown_token: CancellationToken::new(),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to lifecycle events
    ///
    /// Each subscriber receives every event emitted after it subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    pub(crate) fn next_session_id(&self) -> SessionId {
        SessionId(self.next_session.fetch_add(1, Ordering::SeqCst))
    }

    /// Refresh the session credential and persist the new token
    pub async fn refresh_credential(&self) -> Result<Credential> {
        let credential =
            credential::refresh_credential(&self.client, &self.config, &self.token_store).await?;
        self.emit_event(Event::CredentialRefreshed);
        Ok(credential)
    }

    /// Download the workspace archive and extract it
    ///
    /// Returns the extracted files.
    pub async fn create_backup(&self, credential: &Credential) -> Result<Vec<PathBuf>> {
        let bytes = download_backup(&self.client, &self.config, credential).await?;
        self.emit_event(Event::BackupDownloaded {
            path: self.config.backup.archive_path.clone(),
            bytes,
        });

        let files =
            extract_backup(&self.config.backup.archive_path, &self.config.backup.extract_dir)
                .await?;
        self.emit_event(Event::BackupExtracted {
            dir: self.config.backup.extract_dir.clone(),
            files: files.len(),
        });
        Ok(files)
    }

    /// Export a single cell to `export.cell_export_dir`
    ///
    /// The file is named after `title` (the id when absent) and `format`
    /// (`export.cell_export_format` when absent).
    pub async fn export_cell(
        &self,
        credential: &Credential,
        id: &NodeId,
        title: Option<&str>,
        format: Option<&str>,
    ) -> Result<PathBuf> {
        let fetcher = HttpContentFetcher::new(self.client.clone(), &self.config, credential)?;
        let export = &self.config.export;
        fetcher
            .export_to_file(
                id,
                title.unwrap_or(id.as_str()),
                format.unwrap_or(&export.cell_export_format),
                &export.cell_export_dir,
                export.file_collision,
            )
            .await
    }
}
