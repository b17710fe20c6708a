//! The fixed column projection loaded from the census file.
//!
//! Only these ten columns are read; everything else in the source schema is
//! dropped at decode time, so memory use does not grow with the width of the
//! published file.
//!
//! ```text
//! position  column
//! 0         NUMERO_IDENTIDAD       (lookup key)
//! 1         PRIMER_NOMBRE
//! 2         SEGUNDO_NOMBRE
//! 3         PRIMER_APELLIDO
//! 4         SEGUNDO_APELLIDO
//! 5         NOMBRE_DEPARTAMENTO
//! 6         NOMBRE_MUNICIPIO
//! 7         NOMBRE_CENTRO
//! 8         NUMERO_JRV
//! 9         NUMERO_LINEA
//! ```
//!
//! Projected columns keep the type they have in the file. The key column is
//! the one exception: it is widened to `Utf8` (any string type) or `Int64`
//! (any integer type) so the index has exactly two shapes to deal with.

use arrow::datatypes::DataType;

/// Name of the identity-number column every lookup is keyed on.
pub const KEY_COLUMN: &str = "NUMERO_IDENTIDAD";

pub const IDENTITY_NUMBER: usize = 0;
pub const FIRST_NAME: usize = 1;
pub const SECOND_NAME: usize = 2;
pub const FIRST_SURNAME: usize = 3;
pub const SECOND_SURNAME: usize = 4;
pub const DEPARTMENT_NAME: usize = 5;
pub const MUNICIPALITY_NAME: usize = 6;
pub const POLLING_CENTER_NAME: usize = 7;
pub const POLLING_STATION_NUMBER: usize = 8;
pub const LINE_NUMBER: usize = 9;

/// Column names in projection order; positions match the constants above.
pub const CENSUS_COLUMNS: [&str; 10] = [
    KEY_COLUMN,
    "PRIMER_NOMBRE",
    "SEGUNDO_NOMBRE",
    "PRIMER_APELLIDO",
    "SEGUNDO_APELLIDO",
    "NOMBRE_DEPARTAMENTO",
    "NOMBRE_MUNICIPIO",
    "NOMBRE_CENTRO",
    "NUMERO_JRV",
    "NUMERO_LINEA",
];

/// Position of `name` within the projection, if it is part of it.
pub fn column_position(name: &str) -> Option<usize> {
    CENSUS_COLUMNS.iter().position(|column| *column == name)
}

/// How key values are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Text,
    Integer,
}

impl KeyKind {
    /// Picks the comparison for a source column type, or `None` if values of
    /// that type cannot be matched against an identity number.
    pub fn for_source(data_type: &DataType) -> Option<Self> {
        match data_type {
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => Some(KeyKind::Text),
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => Some(KeyKind::Integer),
            _ => None,
        }
    }

    /// Type the column is stored as once loaded.
    pub fn stored_type(&self) -> DataType {
        match self {
            KeyKind::Text => DataType::Utf8,
            KeyKind::Integer => DataType::Int64,
        }
    }
}
