//! In-memory census table with an equality index on the identity column.
//!
//! The table is built in two steps by the materialization coordinator:
//!
//! 1. [`CensusTable::load`] decodes the fixed projection of the Parquet file into
//!    Arrow batches, in projection order (see [`projection`]).
//! 2. [`CensusTable::create_index`] builds a hash index over a column.
//!
//! After that the table is wrapped in an `Arc` and never mutated again, so
//! concurrent lookups need no locking.
//!
//! # Key Matching
//!
//! Identity numbers are published either as text or as integers. Text keys
//! match byte for byte. Integer keys match when the requested digits parse to
//! the stored value, so `"0801199012345"` finds `801199012345`.
//!
//! # Duplicate Keys
//!
//! The identity column is expected to be unique but this is not enforced.
//! When several rows share a key, lookups return the one that appears first in
//! file order. The index and the unindexed scan apply the same rule, so the
//! result never depends on which path served the lookup.

pub mod projection;
pub mod record;


use std::sync::Arc;
use std::time::Instant;
use arrow::array::{ArrayRef, AsArray, RecordBatch};
use arrow::compute::{cast_with_options, CastOptions};
use arrow::datatypes::{Field, Int64Type, Schema, SchemaRef};
use futures::StreamExt;
use hashbrown::HashMap;
use parquet::arrow::ProjectionMask;
use parquet::arrow::async_reader::{ParquetObjectReader, ParquetRecordBatchStreamBuilder};
use tracing::{debug, info};
use crate::error::LoadError;
use crate::utils::file_interaction_local_and_cloud::get_object_store;
use self::projection::{column_position, KeyKind, CENSUS_COLUMNS, IDENTITY_NUMBER, KEY_COLUMN};

pub use self::record::{CensusRecord, FieldValue};

/// Rows per decoded batch.
const BATCH_SIZE: usize = 8192;

/// Location of a row inside the table's batch list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RowAddress {
    batch: u32,
    row: u32,
}

impl RowAddress {
    fn new(batch: usize, row: usize) -> Self {
        Self { batch: batch as u32, row: row as u32 }
    }
}

/// Hash index from a column's values to the first row holding each value.
#[derive(Debug)]
enum EqualityIndex {
    Text(HashMap<Box<str>, RowAddress>),
    Integer(HashMap<i64, RowAddress>),
}

impl EqualityIndex {
    fn get(&self, key: &str) -> Option<RowAddress> {
        match self {
            EqualityIndex::Text(entries) => entries.get(key).copied(),
            EqualityIndex::Integer(entries) => entries.get(&key.parse::<i64>().ok()?).copied(),
        }
    }

    fn len(&self) -> usize {
        match self {
            EqualityIndex::Text(entries) => entries.len(),
            EqualityIndex::Integer(entries) => entries.len(),
        }
    }
}

/// Read-only census data plus any equality indexes built over it.
#[derive(Debug)]
pub struct CensusTable {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    num_rows: usize,
    indexes: HashMap<String, EqualityIndex>,
}

impl CensusTable {
    /// Bulk-loads the fixed projection from a Parquet file.
    ///
    /// `local_path` is resolved through the object store layer, so besides
    /// filesystem paths it also accepts `memory://` URIs.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::MissingColumn`] if any projected column is absent,
    /// [`LoadError::UnsupportedKeyType`] if the identity column is neither text
    /// nor integer, or a Parquet / Arrow error if the file cannot be decoded.
    pub async fn load(local_path: &str) -> Result<Self, LoadError> {
        let started = Instant::now();
        let store_error = |reason: String| LoadError::Store { path: local_path.to_string(), reason };

        let (store, path) = get_object_store(local_path).await
            .map_err(|e| store_error(e.to_string()))?;
        let meta = store.head(&path).await
            .map_err(|e| store_error(e.to_string()))?;
        let reader = ParquetObjectReader::new(store, path).with_file_size(meta.size);

        let builder = ParquetRecordBatchStreamBuilder::new(reader).await?;

        // Arrow top-level fields line up with Parquet root columns.
        let file_schema = builder.schema().clone();
        let mut roots = Vec::with_capacity(CENSUS_COLUMNS.len());
        for name in CENSUS_COLUMNS {
            let index = file_schema.index_of(name)
                .map_err(|_| LoadError::MissingColumn { column: name.to_string() })?;
            roots.push(index);
        }
        let mask = ProjectionMask::roots(builder.parquet_schema(), roots);

        let mut stream = builder
            .with_projection(mask)
            .with_batch_size(BATCH_SIZE)
            .build()?;
        let layout = BatchLayout::for_stream(stream.schema())?;

        let mut batches = Vec::new();
        let mut num_rows = 0usize;
        while let Some(batch) = stream.next().await {
            let batch = layout.apply(&batch?)?;
            num_rows += batch.num_rows();
            batches.push(batch);
        }

        info!(
            path = local_path,
            rows = num_rows,
            batches = batches.len(),
            key_kind = ?layout.key_kind,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "census table loaded"
        );

        Ok(Self {
            schema: layout.schema,
            batches,
            num_rows,
            indexes: HashMap::new(),
        })
    }

    /// Builds an equality index on `column`.
    ///
    /// Calling this again for a column that is already indexed does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::UnindexableColumn`] if `column` is not part of the
    /// projection or is stored as something other than `Utf8` or `Int64`.
    pub fn create_index(&mut self, column: &str) -> Result<(), LoadError> {
        if self.indexes.contains_key(column) {
            debug!(column, "index already present");
            return Ok(());
        }
        let unindexable = || LoadError::UnindexableColumn { column: column.to_string() };
        let position = column_position(column).ok_or_else(unindexable)?;

        let started = Instant::now();
        let index = match self.schema.field(position).data_type() {
            t if *t == KeyKind::Text.stored_type() => {
                let mut entries: HashMap<Box<str>, RowAddress> = HashMap::with_capacity(self.num_rows);
                for (batch_idx, batch) in self.batches.iter().enumerate() {
                    let values = batch.column(position).as_string_opt::<i32>().ok_or_else(unindexable)?;
                    for (row_idx, value) in values.iter().enumerate() {
                        let Some(value) = value else { continue };
                        // First occurrence in load order wins.
                        entries.entry_ref(value).or_insert(RowAddress::new(batch_idx, row_idx));
                    }
                }
                EqualityIndex::Text(entries)
            }
            t if *t == KeyKind::Integer.stored_type() => {
                let mut entries: HashMap<i64, RowAddress> = HashMap::with_capacity(self.num_rows);
                for (batch_idx, batch) in self.batches.iter().enumerate() {
                    let values = batch.column(position).as_primitive_opt::<Int64Type>().ok_or_else(unindexable)?;
                    for (row_idx, value) in values.iter().enumerate() {
                        let Some(value) = value else { continue };
                        entries.entry(value).or_insert(RowAddress::new(batch_idx, row_idx));
                    }
                }
                EqualityIndex::Integer(entries)
            }
            _ => return Err(unindexable()),
        };

        info!(
            column,
            distinct_keys = index.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "equality index built"
        );
        self.indexes.insert(column.to_string(), index);
        Ok(())
    }

    /// Returns the first record whose identity number equals `key`.
    ///
    /// Uses the index on [`KEY_COLUMN`] when one exists, otherwise scans the
    /// table in load order.
    pub fn lookup_by_key(&self, key: &str) -> Option<CensusRecord> {
        let address = match self.indexes.get(KEY_COLUMN) {
            Some(index) => index.get(key)?,
            None => self.scan_for_key(key)?,
        };
        let batch = self.batches.get(address.batch as usize)?;
        CensusRecord::from_row(batch, address.row as usize)
    }

    fn scan_for_key(&self, key: &str) -> Option<RowAddress> {
        let wanted = key.parse::<i64>().ok();
        self.batches.iter().enumerate().find_map(|(batch_idx, batch)| {
            let column = batch.column(IDENTITY_NUMBER);
            let row_idx = if let Some(values) = column.as_string_opt::<i32>() {
                values.iter().position(|value| value == Some(key))
            } else if let Some(values) = column.as_primitive_opt::<Int64Type>() {
                let wanted = wanted?;
                values.iter().position(|value| value == Some(wanted))
            } else {
                None
            };
            row_idx.map(|row_idx| RowAddress::new(batch_idx, row_idx))
        })
    }

    /// Schema of the loaded batches: the projection, in order.
    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn has_index(&self, column: &str) -> bool {
        self.indexes.contains_key(column)
    }
}

/// How decoded batches are rearranged into the table's layout.
///
/// Computed once per file from the decoder's schema: the projected columns
/// in file order become projection order, and the key column is widened to
/// its stored type. Every other column is kept exactly as decoded.
struct BatchLayout {
    order: Vec<usize>,
    key_kind: KeyKind,
    widen_key: bool,
    schema: SchemaRef,
}

impl BatchLayout {
    fn for_stream(decoded: &SchemaRef) -> Result<Self, LoadError> {
        let mut order = Vec::with_capacity(CENSUS_COLUMNS.len());
        for name in CENSUS_COLUMNS {
            let index = decoded.index_of(name)
                .map_err(|_| LoadError::MissingColumn { column: name.to_string() })?;
            order.push(index);
        }

        let key_field = decoded.field(order[IDENTITY_NUMBER]);
        let key_kind = KeyKind::for_source(key_field.data_type()).ok_or_else(|| {
            LoadError::UnsupportedKeyType { data_type: key_field.data_type().to_string() }
        })?;
        let stored = key_kind.stored_type();
        let widen_key = key_field.data_type() != &stored;

        let mut fields: Vec<Field> = order.iter().map(|&i| decoded.field(i).clone()).collect();
        fields[IDENTITY_NUMBER] = Field::new(KEY_COLUMN, stored, true);

        Ok(Self {
            order,
            key_kind,
            widen_key,
            schema: Arc::new(Schema::new(fields)),
        })
    }

    fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch, LoadError> {
        let mut columns: Vec<ArrayRef> = self.order.iter().map(|&i| Arc::clone(batch.column(i))).collect();
        if self.widen_key {
            // Strict cast: a key that does not fit is an error, never a silent null.
            let strict = CastOptions { safe: false, ..Default::default() };
            columns[IDENTITY_NUMBER] =
                cast_with_options(&columns[IDENTITY_NUMBER], &self.key_kind.stored_type(), &strict)?;
        }
        Ok(RecordBatch::try_new(Arc::clone(&self.schema), columns)?)
    }
}
