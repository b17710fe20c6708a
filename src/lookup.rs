//! Identity lookups against the materialized census table.
//!
//! Validation runs before anything else: a key that cannot be valid never
//! triggers a download or a table build.

use std::sync::Arc;
use tracing::debug;
use crate::census_table::CensusRecord;
use crate::error::LookupError;
use crate::materialize::MaterializationCoordinator;

/// Shortest identity number accepted after normalization.
pub const MIN_IDENTITY_DIGITS: usize = 6;

/// Keeps only the ASCII digits of `raw`.
///
/// ```
/// use census_lookup::lookup::normalize_identity;
///
/// assert_eq!(normalize_identity("  0801-1990-12345 "), "0801199012345");
/// assert_eq!(normalize_identity("abc"), "");
/// ```
pub fn normalize_identity(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Normalizes `raw` and rejects keys shorter than [`MIN_IDENTITY_DIGITS`].
pub fn validate_identity(raw: &str) -> Result<String, LookupError> {
    let identity = normalize_identity(raw);
    if identity.len() < MIN_IDENTITY_DIGITS {
        return Err(LookupError::Validation(format!(
            "identity must contain at least {} digits, got {}",
            MIN_IDENTITY_DIGITS,
            identity.len()
        )));
    }
    Ok(identity)
}

/// Answers "which census record has this identity number".
#[derive(Clone)]
pub struct LookupService {
    coordinator: Arc<MaterializationCoordinator>,
}

impl LookupService {
    pub fn new(coordinator: Arc<MaterializationCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<MaterializationCoordinator> {
        &self.coordinator
    }

    /// Finds the record for `raw_identity`.
    ///
    /// Returns `Ok(None)` when the dataset is available but holds no such
    /// identity.
    ///
    /// # Errors
    ///
    /// - [`LookupError::Validation`] if the normalized key is too short; the
    ///   dataset is not touched.
    /// - [`LookupError::Unavailable`] if the dataset could not be made ready.
    pub async fn find(&self, raw_identity: &str) -> Result<Option<CensusRecord>, LookupError> {
        let identity = validate_identity(raw_identity)?;
        let table = self.coordinator.ensure_ready().await?;
        let record = table.lookup_by_key(&identity);
        debug!(identity = %identity, found = record.is_some(), "census lookup");
        Ok(record)
    }
}
