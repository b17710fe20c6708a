//! Ensures a complete local copy of the census file exists.
//!
//! The remote file is streamed into a sibling staging file
//! (`<local_path>.part`), flushed to disk, and only then renamed onto
//! `local_path`. A crash or failed transfer therefore never leaves a
//! partial file at `local_path`, and "the file exists" is enough to skip the
//! download on later calls.
//!
//! ```text
//! data/censo.parquet.part   <- written while downloading, removed on failure
//! data/censo.parquet        <- appears atomically once the download completes
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use async_trait::async_trait;
use futures::StreamExt;
use object_store::ObjectStore;
use object_store::path::Path as ObjectPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use crate::error::FetchError;
use crate::utils::file_interaction_local_and_cloud::get_object_store;

/// Source of the local census file.
///
/// Exactly one attempt per call; retry policy belongs to the caller.
#[async_trait]
pub trait DatasetFetcher: Send + Sync + 'static {
    /// Makes sure the dataset is present locally and returns its path.
    async fn ensure_local_copy(&self) -> Result<PathBuf, FetchError>;
}

/// Fetches the census file from any origin the object store layer understands
/// (`https://`, `http://`, `s3://`, `memory://`, or a local path).
#[derive(Debug, Clone)]
pub struct ObjectStoreFetcher {
    origin: String,
    local_path: PathBuf,
    source: Option<(Arc<dyn ObjectStore>, ObjectPath)>,
}

impl ObjectStoreFetcher {
    pub fn new(origin: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            origin: origin.into(),
            local_path: local_path.into(),
            source: None,
        }
    }

    /// Reads the object at `location` in an already configured store instead
    /// of resolving `origin`, which is then only used in logs and errors.
    pub fn with_store(mut self, store: Arc<dyn ObjectStore>, location: ObjectPath) -> Self {
        self.source = Some((store, location));
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Path the download is staged at before being published.
    pub fn staging_path(&self) -> PathBuf {
        let mut staged = self.local_path.clone().into_os_string();
        staged.push(".part");
        PathBuf::from(staged)
    }

    async fn resolve(&self) -> Result<(Arc<dyn ObjectStore>, ObjectPath), FetchError> {
        if let Some((store, location)) = &self.source {
            return Ok((Arc::clone(store), location.clone()));
        }
        get_object_store(&self.origin).await
            .map_err(|e| FetchError::Origin { origin: self.origin.clone(), reason: e.to_string() })
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> FetchError {
        FetchError::Io { path: path.display().to_string(), source }
    }

    fn remote_error(&self, source: object_store::Error) -> FetchError {
        FetchError::Remote { origin: self.origin.clone(), source }
    }

    async fn download_to(
        &self,
        store: &dyn ObjectStore,
        remote: &ObjectPath,
        staging: &Path,
    ) -> Result<u64, FetchError> {
        let response = store.get(remote).await.map_err(|e| self.remote_error(e))?;
        let mut body = response.into_stream();

        let mut file = tokio::fs::File::create(staging).await
            .map_err(|e| self.io_error(staging, e))?;
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| self.remote_error(e))?;
            file.write_all(&chunk).await.map_err(|e| self.io_error(staging, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| self.io_error(staging, e))?;
        file.sync_all().await.map_err(|e| self.io_error(staging, e))?;
        Ok(written)
    }
}

#[async_trait]
impl DatasetFetcher for ObjectStoreFetcher {
    async fn ensure_local_copy(&self) -> Result<PathBuf, FetchError> {
        let local = self.local_path.as_path();
        if tokio::fs::try_exists(local).await.map_err(|e| self.io_error(local, e))? {
            debug!(path = %local.display(), "local census copy present, skipping download");
            return Ok(self.local_path.clone());
        }

        let (store, remote) = self.resolve().await?;

        if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| self.io_error(parent, e))?;
        }

        let staging = self.staging_path();
        let started = Instant::now();
        info!(origin = %self.origin, path = %local.display(), "downloading census file");

        let written = match self.download_to(store.as_ref(), &remote, &staging).await {
            Ok(written) => written,
            Err(err) => {
                warn!(origin = %self.origin, error = %err, "census download failed");
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(err);
            }
        };

        if let Err(err) = tokio::fs::rename(&staging, local).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(self.io_error(local, err));
        }

        info!(
            path = %local.display(),
            bytes = written,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "census file downloaded"
        );
        Ok(self.local_path.clone())
    }
}
