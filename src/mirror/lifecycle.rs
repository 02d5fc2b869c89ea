//! Reconnect loop and shutdown coordination.

use tracing::{error, info, warn};

use crate::channel::WebSocketChannel;
use crate::error::{ChannelError, Error, Result};
use crate::types::Event;

use super::Mirror;

impl Mirror {
    /// Mirror the workspace until [`shutdown`](Mirror::shutdown) is called
    ///
    /// Each cycle refreshes the credential, creates a backup (if enabled),
    /// connects, and exports the tree once. The connection is then held
    /// open; when it drops the whole cycle starts over after
    /// `reconnect_delay`. A failing cycle is logged and retried the same way.
    pub async fn run(&self) -> Result<()> {
        info!("mirror running");

        while !self.shutdown_token.is_cancelled() {
            match self.cycle().await {
                Ok(()) => {}
                Err(Error::Cancelled) => break,
                Err(e) => error!(error = %e, "mirror session failed"),
            }

            info!(delay = ?self.config.reconnect_delay, "reconnecting");
            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }

        info!("mirror stopped");
        Ok(())
    }

    /// One connection lifetime
    async fn cycle(&self) -> Result<()> {
        let credential = self.refresh_credential().await?;
        if self.config.backup.enabled {
            self.create_backup(&credential).await?;
        }

        let channel = WebSocketChannel::connect(&self.config, &credential).await?;
        let session = self.next_session_id();
        let cancel = self.shutdown_token.child_token();

        match self.export_over(&channel, &credential, session, &cancel).await {
            Ok(report) => {
                info!(%session, visited = report.visited, "export done, waiting for changes");
            }
            Err(Error::Channel(ChannelError::Disconnected)) => {
                warn!(%session, "sync channel lost during export");
                self.emit_event(Event::Disconnected { session });
                return Ok(());
            }
            Err(e) => {
                channel.close();
                return Err(e);
            }
        }

        tokio::select! {
            _ = channel.disconnected() => {
                warn!(%session, "sync channel disconnected");
                self.emit_event(Event::Disconnected { session });
                Ok(())
            }
            _ = self.shutdown_token.cancelled() => {
                channel.close();
                Err(Error::Cancelled)
            }
        }
    }

    /// Stop the mirror
    ///
    /// Cancels the running session (in-flight subscriptions are abandoned)
    /// and makes [`run`](Mirror::run) return.
    pub async fn shutdown(&self) -> Result<()> {
        info!("initiating shutdown");
        self.shutdown_token.cancel();
        self.emit_event(Event::Shutdown);
        Ok(())
    }

    /// Whether [`shutdown`](Mirror::shutdown) has been called
    pub fn is_shut_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }
}
