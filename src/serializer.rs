//! Tree serializer
//!
//! Writes the resolved tree as one Markdown file: a `#<title>` heading per
//! node in depth-first pre-order, with the exported content of the first
//! `leaf_download_limit` leaves inlined right after their heading. The
//! heading marker does not grow with depth.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{FetchError, Result};
use crate::fetcher::ContentFetcher;
use crate::types::{DocumentNode, Event, NodeId, NodeKind, SessionId};

/// Counters of one serialization pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerializeStats {
    /// Headings written
    pub headings: usize,
    /// Leaves whose content was inlined
    pub leaves_inlined: usize,
    /// Leaves whose content fetch failed
    pub leaves_failed: usize,
}

/// Depth-first writer of a resolved tree
pub struct TreeSerializer<'a, F: ContentFetcher + ?Sized> {
    fetcher: &'a F,
    leaf_limit: usize,
    requested: Vec<NodeId>,
    events: Option<(SessionId, broadcast::Sender<Event>)>,
}

impl<'a, F: ContentFetcher + ?Sized> TreeSerializer<'a, F> {
    /// Serializer inlining content for at most `leaf_limit` leaves
    pub fn new(fetcher: &'a F, leaf_limit: usize) -> Self {
        Self {
            fetcher,
            leaf_limit,
            requested: Vec::new(),
            events: None,
        }
    }

    /// Publish per-leaf events for `session`
    pub fn with_events(mut self, session: SessionId, event_tx: broadcast::Sender<Event>) -> Self {
        self.events = Some((session, event_tx));
        self
    }

    /// Write `root` and its subtree to `sink`, then flush it
    ///
    /// Leaf fetch failures are logged and skipped; only sink errors abort.
    pub async fn serialize<W>(&mut self, root: &DocumentNode, sink: &mut W) -> Result<SerializeStats>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut stats = SerializeStats::default();
        let mut stack = vec![root];

        while let Some(node) = stack.pop() {
            sink.write_all(format!("#{}\n", node.title).as_bytes()).await?;
            stats.headings += 1;

            if node.kind == NodeKind::Leaf {
                self.inline_leaf(node, sink, &mut stats).await?;
            }

            stack.extend(node.children.iter().rev());
        }

        sink.flush().await?;
        Ok(stats)
    }

    async fn inline_leaf<W>(
        &mut self,
        node: &DocumentNode,
        sink: &mut W,
        stats: &mut SerializeStats,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if self.requested.contains(&node.id) {
            debug!(node_id = %node.id, "content already inlined");
            return Ok(());
        }
        if self.requested.len() >= self.leaf_limit {
            debug!(node_id = %node.id, limit = self.leaf_limit, "leaf download limit reached");
            return Ok(());
        }
        self.requested.push(node.id.clone());
        info!(node_id = %node.id, title = %node.title, "downloading");

        let (written, failure) = match self.fetcher.fetch(&node.id).await {
            Ok(mut stream) => {
                let mut written = 0u64;
                let mut last = None;
                let mut failure = None;
                while let Some(chunk) = stream.next().await {
                    match chunk {
                        Ok(bytes) => {
                            if let Some(&b) = bytes.last() {
                                last = Some(b);
                            }
                            written += bytes.len() as u64;
                            sink.write_all(&bytes).await?;
                        }
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
                // Keep the next heading on its own line.
                if last.is_some_and(|b| b != b'\n') {
                    sink.write_all(b"\n").await?;
                }
                (written, failure)
            }
            Err(e) => (0, Some(e)),
        };

        match failure {
            None => {
                stats.leaves_inlined += 1;
                self.emit(|session| Event::LeafFetched {
                    session,
                    id: node.id.clone(),
                    bytes: written,
                });
            }
            Some(e) => {
                stats.leaves_failed += 1;
                self.report_failure(node, &e);
            }
        }
        Ok(())
    }

    fn report_failure(&self, node: &DocumentNode, error: &FetchError) {
        warn!(node_id = %node.id, title = %node.title, error = %error, "leaf content fetch failed, continuing");
        self.emit(|session| Event::LeafFetchFailed {
            session,
            id: node.id.clone(),
            error: error.to_string(),
        });
    }

    fn emit(&self, event: impl FnOnce(SessionId) -> Event) {
        if let Some((session, tx)) = &self.events {
            tx.send(event(*session)).ok();
        }
    }
}

/// Export file under construction, removed on drop unless committed
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn new(target: &Path) -> Self {
        let mut path = target.as_os_str().to_owned();
        path.push(".part");
        Self {
            path: PathBuf::from(path),
            committed: false,
        }
    }

    async fn commit(mut self, target: &Path) -> Result<()> {
        tokio::fs::rename(&self.path, target).await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed {
            std::fs::remove_file(&self.path).ok();
        }
    }
}

/// Serialize `root` into the file at `path`
///
/// Content goes to `<path>.part` first; the file only replaces `path` once
/// the whole walk has been written and flushed. The partial file is removed
/// on error and when the returned future is dropped.
pub async fn write_export<F>(
    serializer: &mut TreeSerializer<'_, F>,
    root: &DocumentNode,
    path: &Path,
) -> Result<SerializeStats>
where
    F: ContentFetcher + ?Sized,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = PartialFile::new(path);

    let file = tokio::fs::File::create(&partial.path).await?;
    let mut writer = BufWriter::new(file);
    let stats = serializer.serialize(root, &mut writer).await?;
    writer.get_mut().sync_all().await?;
    drop(writer);
    partial.commit(path).await?;

    info!(path = %path.display(), headings = stats.headings, "export written");
    Ok(stats)
}
