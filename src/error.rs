//! Error taxonomy for fetching, loading, materializing and looking up census records.
//!
//! Each stage owns its own error type so callers can tell *where* a failure
//! happened without reading logs:
//!
//! - [`FetchError`] - retrieving the remote Parquet file into the local cache path
//! - [`LoadError`] - decoding the local file into a [`CensusTable`](crate::census_table::CensusTable)
//!   or building its equality index
//! - [`MaterializeError`] - the outcome shared by every caller waiting on one build episode
//! - [`LookupError`] - what the lookup service reports to its callers
//!
//! "No match" is not an error anywhere in this crate; it is `Ok(None)`.

use std::sync::Arc;
use std::time::Duration;

/// Failure while ensuring a local copy of the source file exists.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The origin URI could not be turned into an object store.
    #[error("invalid dataset origin '{origin}': {reason}")]
    Origin { origin: String, reason: String },

    /// The remote store rejected the request or the transfer broke mid-stream.
    #[error("download from '{origin}' failed: {source}")]
    Remote {
        origin: String,
        #[source]
        source: object_store::Error,
    },

    /// Local filesystem failure while writing or publishing the cached copy.
    #[error("local cache write to '{path}' failed: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure while bulk-loading the local file or building an index over it.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("could not open '{path}': {reason}")]
    Store { path: String, reason: String },

    #[error("parquet decode failed: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow conversion failed: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// A column of the fixed projection is absent from the source schema.
    #[error("source file has no column '{column}'")]
    MissingColumn { column: String },

    /// The identity column is neither text nor integer.
    #[error("identity column has unsupported type {data_type}")]
    UnsupportedKeyType { data_type: String },

    /// Only projected columns stored as text or 64-bit integers can carry an equality index.
    #[error("column '{column}' cannot be indexed")]
    UnindexableColumn { column: String },

    #[error("load task failed: {0}")]
    Task(String),
}

/// Outcome of a failed materialization episode.
///
/// Cloned to every caller that joined the episode, so the underlying
/// causes are held behind `Arc`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MaterializeError {
    #[error("dataset fetch failed: {0}")]
    Fetch(#[source] Arc<FetchError>),

    #[error("dataset load failed: {0}")]
    Load(#[source] Arc<LoadError>),

    /// The caller stopped waiting; the build itself keeps running.
    #[error("dataset not ready after {0:?}")]
    Timeout(Duration),

    /// The build task panicked or was cancelled before reporting.
    #[error("dataset build aborted: {0}")]
    Aborted(String),
}

impl From<FetchError> for MaterializeError {
    fn from(err: FetchError) -> Self {
        MaterializeError::Fetch(Arc::new(err))
    }
}

impl From<LoadError> for MaterializeError {
    fn from(err: LoadError) -> Self {
        MaterializeError::Load(Arc::new(err))
    }
}

/// Error returned by [`LookupService::find`](crate::lookup::LookupService::find).
#[derive(Debug, Clone, thiserror::Error)]
pub enum LookupError {
    /// The key was rejected before any materialization work started.
    #[error("invalid identity: {0}")]
    Validation(String),

    /// The dataset could not be made ready for this request.
    #[error("census data unavailable: {0}")]
    Unavailable(#[from] MaterializeError),
}

impl LookupError {
    pub fn is_validation(&self) -> bool {
        matches!(self, LookupError::Validation(_))
    }
}
