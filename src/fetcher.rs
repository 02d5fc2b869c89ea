//! Leaf content fetching
//!
//! Leaf nodes are exported by the remote service over plain HTTP at
//! `{files_url}/export/cells/{id}.{format}`. The [`ContentFetcher`] trait is
//! the seam the serializer depends on; [`HttpContentFetcher`] is the real
//! implementation.

use crate::config::{Config, FileCollisionAction, RetryConfig};
use crate::credential::{Credential, auth_headers};
use crate::error::{FetchError, Result};
use crate::retry::with_retry;
use crate::types::NodeId;
use crate::utils::{get_unique_path, sanitize_file_name};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Body of a leaf export, delivered chunk by chunk
pub type ContentStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, FetchError>> + Send>>;

/// Retrieves the exportable content of a leaf node
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Start fetching the content of `id`
    ///
    /// # Errors
    ///
    /// `NotFound`, `Unauthorized`, `Network` or an unexpected `Status`. The
    /// serializer treats every error as non-fatal.
    async fn fetch(&self, id: &NodeId) -> std::result::Result<ContentStream, FetchError>;
}

/// Fetches leaf content from the per-node export endpoint
#[derive(Clone)]
pub struct HttpContentFetcher {
    client: reqwest::Client,
    files_url: String,
    headers: HeaderMap,
    format: String,
    retry: RetryConfig,
}

impl HttpContentFetcher {
    /// Create a fetcher authenticated with `credential`, using the configured leaf format
    pub fn new(client: reqwest::Client, config: &Config, credential: &Credential) -> Result<Self> {
        Ok(Self {
            client,
            files_url: config.endpoints.files_url.trim_end_matches('/').to_string(),
            headers: auth_headers(config, credential)?,
            format: config.export.leaf_format.clone(),
            retry: config.retry.clone(),
        })
    }

    /// URL of the export of `id` in `format`
    pub fn cell_url(&self, id: &NodeId, format: &str) -> String {
        format!("{}/export/cells/{}.{}", self.files_url, id, format)
    }

    /// Issue the export request, retrying transient failures
    async fn open(
        &self,
        id: &NodeId,
        format: &str,
    ) -> std::result::Result<reqwest::Response, FetchError> {
        let url = self.cell_url(id, format);
        debug!(node_id = %id, %url, "requesting cell export");

        with_retry(&self.retry, || {
            let request = self.client.get(&url).headers(self.headers.clone());
            async move {
                let response = request.send().await.map_err(|e| network_error(id, &e))?;
                check_status(id, response.status())?;
                Ok(response)
            }
        })
        .await
    }

    /// Download the export of a single cell into `dir` as `{title}.{format}`
    ///
    /// Returns the path written, which differs from the plain name when
    /// `collision` is [`FileCollisionAction::Rename`].
    pub async fn export_to_file(
        &self,
        id: &NodeId,
        title: &str,
        format: &str,
        dir: &Path,
        collision: FileCollisionAction,
    ) -> Result<PathBuf> {
        let response = self.open(id, format).await?;

        tokio::fs::create_dir_all(dir).await?;
        let file_name = format!("{}.{}", sanitize_file_name(title, id.as_str()), format);
        let target = get_unique_path(&dir.join(file_name), collision)?;

        let mut file = tokio::fs::File::create(&target).await?;
        let mut body = body_stream(id.clone(), response);
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        info!(node_id = %id, path = %target.display(), bytes = written, "cell exported");
        Ok(target)
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, id: &NodeId) -> std::result::Result<ContentStream, FetchError> {
        let response = self.open(id, &self.format).await?;
        Ok(body_stream(id.clone(), response))
    }
}

/// Map an HTTP status onto the fetch error taxonomy
fn check_status(id: &NodeId, status: StatusCode) -> std::result::Result<(), FetchError> {
    if status.is_success() {
        return Ok(());
    }
    Err(match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => FetchError::NotFound { id: id.clone() },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            FetchError::Unauthorized { id: id.clone() }
        }
        other => FetchError::Status {
            id: id.clone(),
            status: other.as_u16(),
        },
    })
}

fn network_error(id: &NodeId, e: &reqwest::Error) -> FetchError {
    FetchError::Network {
        id: id.clone(),
        reason: e.to_string(),
        transient: e.is_timeout() || e.is_connect(),
    }
}

/// Stream a response body chunk by chunk; ends after the first error
fn body_stream(id: NodeId, response: reqwest::Response) -> ContentStream {
    Box::pin(futures::stream::unfold(
        Some(response),
        move |state| {
            let id = id.clone();
            async move {
                let mut response = state?;
                match response.chunk().await {
                    Ok(Some(chunk)) => Some((Ok(chunk), Some(response))),
                    Ok(None) => None,
                    Err(e) => Some((Err(network_error(&id, &e)), None)),
                }
            }
        },
    ))
}
