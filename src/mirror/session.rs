//! One tree download: load the workspace record, resolve, serialize.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::channel::{SubscriptionChannel, WebSocketChannel};
use crate::credential::Credential;
use crate::error::{ChannelError, Error, Result};
use crate::fetcher::{ContentFetcher, HttpContentFetcher};
use crate::resolver::{ResolutionSession, ResolvedTree};
use crate::serializer::{TreeSerializer, write_export};
use crate::types::{BrainRecord, Event, ExportReport, SessionId};

use super::Mirror;

impl Mirror {
    /// Connect, export the tree once, and close the connection
    ///
    /// Cancelling `cancel` abandons the session, as does losing the
    /// connection before the tree is resolved.
    pub async fn run_session(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<ExportReport> {
        let channel = WebSocketChannel::connect(&self.config, credential).await?;
        let session = self.next_session_id();
        let result = self
            .export_over(&channel, credential, session, cancel)
            .await;
        channel.close();
        result
    }

    /// Export over an open WebSocket channel
    ///
    /// Losing the connection abandons the session only while the tree is
    /// still being resolved. Serialization needs nothing from the channel,
    /// so once resolution completes the export is always written unless
    /// `cancel` fires.
    pub(crate) async fn export_over(
        &self,
        channel: &WebSocketChannel,
        credential: &Credential,
        session: SessionId,
        cancel: &CancellationToken,
    ) -> Result<ExportReport> {
        let fetcher = HttpContentFetcher::new(self.client.clone(), &self.config, credential)?;
        let tree = tokio::select! {
            tree = self.resolve_workspace(channel, session, cancel) => tree?,
            _ = channel.disconnected() => {
                return Err(Error::Channel(ChannelError::Disconnected));
            }
        };
        self.write_tree(&fetcher, session, tree, cancel).await
    }

    /// Resolve the workspace tree over `channel` and write the export file
    ///
    /// Works with any channel and fetcher implementation.
    pub async fn export_tree<C, F>(
        &self,
        channel: &C,
        fetcher: &F,
        session: SessionId,
        cancel: &CancellationToken,
    ) -> Result<ExportReport>
    where
        C: SubscriptionChannel + ?Sized,
        F: ContentFetcher + ?Sized,
    {
        let tree = self.resolve_workspace(channel, session, cancel).await?;
        self.write_tree(fetcher, session, tree, cancel).await
    }

    /// Load the workspace record and resolve the tree below its main cell
    async fn resolve_workspace<C>(
        &self,
        channel: &C,
        session: SessionId,
        cancel: &CancellationToken,
    ) -> Result<ResolvedTree>
    where
        C: SubscriptionChannel + ?Sized,
    {
        self.emit_event(Event::SessionStarted { session });
        let brain = self.load_brain(channel, cancel).await?;

        let mut resolution =
            ResolutionSession::new(session, self.config.resolver.clone(), self.event_tx.clone());
        let tree = resolution
            .resolve(channel, &brain.main_cell_id, &brain.title, cancel)
            .await?;
        if !tree.skipped.is_empty() {
            warn!(%session, skipped = tree.skipped.len(), "some nodes could not be resolved");
        }
        Ok(tree)
    }

    /// Serialize a resolved tree to `export.output_path`
    async fn write_tree<F>(
        &self,
        fetcher: &F,
        session: SessionId,
        tree: ResolvedTree,
        cancel: &CancellationToken,
    ) -> Result<ExportReport>
    where
        F: ContentFetcher + ?Sized,
    {
        let output_path = self.config.export.output_path.clone();
        let mut serializer = TreeSerializer::new(fetcher, self.config.export.leaf_download_limit)
            .with_events(session, self.event_tx.clone());
        let stats = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = write_export(&mut serializer, &tree.root, &output_path) => result?,
        };

        self.emit_event(Event::ExportWritten {
            session,
            path: output_path.clone(),
        });
        info!(
            %session,
            path = %output_path.display(),
            nodes = tree.root.node_count(),
            leaves = stats.leaves_inlined,
            "completed export"
        );

        Ok(ExportReport {
            session,
            output_path,
            visited: tree.visited,
            resolved: tree.resolved,
            skipped: tree.skipped,
            headings: stats.headings,
            leaves_inlined: stats.leaves_inlined,
            leaves_failed: stats.leaves_failed,
            started_at: tree.started_at,
            finished_at: Utc::now(),
        })
    }

    async fn load_brain<C>(&self, channel: &C, cancel: &CancellationToken) -> Result<BrainRecord>
    where
        C: SubscriptionChannel + ?Sized,
    {
        let brain_id = &self.config.workspace.brain_id;
        let timeout = self.config.resolver.subscription_timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            loaded = tokio::time::timeout(timeout, channel.load_brain(brain_id)) => match loaded {
                Ok(brain) => Ok(brain?),
                Err(_) => Err(Error::Channel(ChannelError::Timeout {
                    id: brain_id.clone(),
                    after: timeout,
                })),
            },
        }
    }
}
