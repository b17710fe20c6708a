//! Census Lookup - Point lookups over a published Parquet census file
//!
//! Answers "which census record has identity number X" against a large,
//! read-only Parquet file that is downloaded and materialized in memory the
//! first time it is needed.
//!
//! # Overview
//!
//! - **Fetching**: the remote file is copied to a local cache path once, published atomically
//! - **Materialization**: a single build episode loads a fixed column projection and indexes
//!   the identity column, no matter how many requests arrive while it runs
//! - **Recovery**: a failed episode is reported to every waiter, and the next request retries
//! - **Lookups**: hash-indexed equality on the identity column, at most one record per key
//!
//! # Quick Start
//!
//! ```no_run
//! use census_lookup::LookupConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = LookupConfig::new("https://example.org/censo.parquet", "data/censo.parquet");
//!     let service = config.lookup_service();
//!
//!     match service.find("0801-1990-12345").await? {
//!         Some(record) => println!("{} {:?}", record.identity_number, record.polling_center_name),
//!         None => println!("no record"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Performance
//!
//! - **First request**: download + decode + index build (the whole dataset)
//! - **Every later request**: one hash lookup, no locking
//! - **Memory**: only the ten projected columns are held, regardless of source width
pub mod census_table;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod lookup;
pub mod materialize;
#[cfg(test)]
pub mod unit_tests;
pub mod utils;

pub use crate::census_table::{CensusRecord, CensusTable, FieldValue};
pub use crate::config::{LookupConfig, ServerConfig};
pub use crate::error::{FetchError, LoadError, LookupError, MaterializeError};
pub use crate::fetcher::{DatasetFetcher, ObjectStoreFetcher};
pub use crate::lookup::LookupService;
pub use crate::materialize::{MaterializationCoordinator, MaterializationStatus};

/// Looks up a single identity without keeping a service around.
///
/// This is a convenience for scripts and the CLI: it builds a coordinator,
/// materializes the dataset (reusing an existing local copy), and performs one
/// lookup. For repeated lookups, construct a [`LookupService`] once instead.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> Result<(), census_lookup::LookupError> {
/// let record = census_lookup::find_identity(
///     "https://example.org/censo.parquet",
///     "data/censo.parquet",
///     "0801199012345",
/// ).await?;
/// println!("{:?}", record);
/// # Ok(())
/// # }
/// ```
pub async fn find_identity(
    origin_url: &str,
    local_path: &str,
    raw_identity: &str,
) -> Result<Option<CensusRecord>, LookupError> {
    LookupConfig::new(origin_url, local_path)
        .lookup_service()
        .find(raw_identity)
        .await
}
