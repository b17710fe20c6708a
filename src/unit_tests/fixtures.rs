//! Parquet fixtures shaped like the published census file.
//!
//! The generated schema deliberately differs from the projection order:
//! columns are out of order, `NUMERO_JRV` is Int32, `NUMERO_LINEA` is a
//! string, and two extra columns exist that the loader must drop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use arrow::array::{Array, ArrayRef, Int32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct FixtureRow {
    pub identity: String,
    pub first_name: Option<String>,
    pub second_name: Option<String>,
    pub first_surname: String,
    pub second_surname: Option<String>,
    pub department: String,
    pub municipality: String,
    pub center: String,
    pub polling_station: i32,
    pub line: String,
}

impl FixtureRow {
    pub fn new(identity: &str, first_name: &str, first_surname: &str) -> Self {
        Self {
            identity: identity.to_string(),
            first_name: Some(first_name.to_string()),
            second_name: None,
            first_surname: first_surname.to_string(),
            second_surname: None,
            department: "FRANCISCO MORAZAN".to_string(),
            municipality: "DISTRITO CENTRAL".to_string(),
            center: "ESCUELA REPUBLICA DE MEXICO".to_string(),
            polling_station: 1,
            line: "1".to_string(),
        }
    }
}

/// Identity number of the well-known row present in every sample file.
pub const KNOWN_IDENTITY: &str = "0801199012345";

/// A known row, a duplicated key, and `filler` seeded random rows.
pub fn sample_rows(filler: usize) -> Vec<FixtureRow> {
    let mut rows = vec![FixtureRow {
        identity: KNOWN_IDENTITY.to_string(),
        first_name: Some("MARIA".to_string()),
        second_name: Some("JOSE".to_string()),
        first_surname: "LOPEZ".to_string(),
        second_surname: Some("REYES".to_string()),
        department: "FRANCISCO MORAZAN".to_string(),
        municipality: "DISTRITO CENTRAL".to_string(),
        center: "INSTITUTO CENTRAL VICENTE CACERES".to_string(),
        polling_station: 1542,
        line: "87".to_string(),
    }];

    let mut rng = rand::rngs::StdRng::seed_from_u64(2025);
    for i in 0..filler {
        let mut row = FixtureRow::new(
            &format!("0501{:09}", 100_000_000 + i),
            "CARLOS",
            "MEJIA",
        );
        row.polling_station = rng.random_range(1..6000);
        row.line = rng.random_range(1..400).to_string();
        rows.push(row);
    }

    let mut first = FixtureRow::new("0101198800001", "ANA", "PRIMERA");
    first.line = "5".to_string();
    let mut second = FixtureRow::new("0101198800001", "ANA", "SEGUNDA");
    second.line = "6".to_string();
    rows.push(first);
    rows.push(second);
    rows
}

/// Builds the census batch for `rows` in the published file's column layout.
pub fn census_batch(rows: &[FixtureRow]) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("NUMERO_LINEA", DataType::Utf8, false),
        Field::new("SEXO", DataType::Utf8, false),
        Field::new("NUMERO_IDENTIDAD", DataType::Utf8, false),
        Field::new("PRIMER_NOMBRE", DataType::Utf8, true),
        Field::new("SEGUNDO_NOMBRE", DataType::Utf8, true),
        Field::new("PRIMER_APELLIDO", DataType::Utf8, false),
        Field::new("SEGUNDO_APELLIDO", DataType::Utf8, true),
        Field::new("NOMBRE_DEPARTAMENTO", DataType::Utf8, false),
        Field::new("NOMBRE_MUNICIPIO", DataType::Utf8, false),
        Field::new("CODIGO_SECTOR", DataType::Int32, false),
        Field::new("NOMBRE_CENTRO", DataType::Utf8, false),
        Field::new("NUMERO_JRV", DataType::Int32, false),
    ]));

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.line.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|_| "F"))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.identity.as_str()))),
            Arc::new(rows.iter().map(|r| r.first_name.as_deref()).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.second_name.as_deref()).collect::<StringArray>()),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.first_surname.as_str()))),
            Arc::new(rows.iter().map(|r| r.second_surname.as_deref()).collect::<StringArray>()),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.department.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.municipality.as_str()))),
            Arc::new(Int32Array::from_iter_values(rows.iter().map(|_| 7))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.center.as_str()))),
            Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.polling_station))),
        ],
    )
    .expect("fixture batch")
}

/// Returns `batch` with column `name` swapped for `values`, keeping its position.
pub fn replace_column(batch: &RecordBatch, name: &str, values: ArrayRef) -> RecordBatch {
    let position = batch.schema().index_of(name).expect("fixture column");
    let mut fields: Vec<Field> = batch.schema().fields().iter().map(|f| f.as_ref().clone()).collect();
    fields[position] = Field::new(name, values.data_type().clone(), true);
    let mut columns = batch.columns().to_vec();
    columns[position] = values;
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).expect("fixture batch")
}

/// Returns `batch` without column `name`.
pub fn drop_column(batch: &RecordBatch, name: &str) -> RecordBatch {
    let position = batch.schema().index_of(name).expect("fixture column");
    let keep: Vec<usize> = (0..batch.num_columns()).filter(|&i| i != position).collect();
    batch.project(&keep).expect("fixture projection")
}

/// Encodes a batch as Parquet, starting a new row group every `row_group_size` rows.
pub fn parquet_bytes(batch: &RecordBatch, row_group_size: usize) -> Vec<u8> {
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_max_row_group_size(row_group_size)
        .build();

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props)).expect("fixture writer");
    writer.write(batch).expect("fixture write");
    writer.close().expect("fixture close");
    buffer
}

/// Encodes rows as Parquet in the published file's column layout.
pub fn census_parquet_bytes(rows: &[FixtureRow], row_group_size: usize) -> Vec<u8> {
    parquet_bytes(&census_batch(rows), row_group_size)
}

/// Writes a sample census file into `dir` and returns its path.
pub fn write_sample_file(dir: &Path, name: &str, filler: usize) -> PathBuf {
    let path = dir.join(name);
    let bytes = census_parquet_bytes(&sample_rows(filler), 256);
    std::fs::write(&path, bytes).expect("fixture file");
    path
}

/// Census file with every projected column except `NOMBRE_CENTRO`.
pub fn parquet_missing_center_column() -> Vec<u8> {
    let batch = drop_column(&census_batch(&sample_rows(3)), "NOMBRE_CENTRO");
    parquet_bytes(&batch, 1024)
}
