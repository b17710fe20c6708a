use std::fmt;
use arrow::array::{Array, AsArray, RecordBatch};
use arrow::datatypes::{
    DataType, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type, UInt8Type,
    UInt16Type, UInt32Type, UInt64Type,
};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use serde::Serialize;
use super::projection::*;

/// A single cell, carried as the file stores it.
///
/// Serializes untagged, so text stays a JSON string (leading zeros and all)
/// and numbers stay JSON numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    Boolean(bool),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Reads row `row` of `array`. Null cells are `None`.
    ///
    /// Types without a direct variant (decimals, dates, ...) are rendered
    /// with Arrow's display formatting.
    pub(crate) fn read(array: &dyn Array, row: usize) -> Option<Self> {
        if array.is_null(row) {
            return None;
        }
        let value = match array.data_type() {
            DataType::Utf8 => FieldValue::Text(array.as_string::<i32>().value(row).to_string()),
            DataType::LargeUtf8 => FieldValue::Text(array.as_string::<i64>().value(row).to_string()),
            DataType::Utf8View => FieldValue::Text(array.as_string_view().value(row).to_string()),
            DataType::Int8 => FieldValue::Integer(array.as_primitive::<Int8Type>().value(row).into()),
            DataType::Int16 => FieldValue::Integer(array.as_primitive::<Int16Type>().value(row).into()),
            DataType::Int32 => FieldValue::Integer(array.as_primitive::<Int32Type>().value(row).into()),
            DataType::Int64 => FieldValue::Integer(array.as_primitive::<Int64Type>().value(row)),
            DataType::UInt8 => FieldValue::Integer(array.as_primitive::<UInt8Type>().value(row).into()),
            DataType::UInt16 => FieldValue::Integer(array.as_primitive::<UInt16Type>().value(row).into()),
            DataType::UInt32 => FieldValue::Integer(array.as_primitive::<UInt32Type>().value(row).into()),
            DataType::UInt64 => FieldValue::Unsigned(array.as_primitive::<UInt64Type>().value(row)),
            DataType::Float32 => FieldValue::Float(array.as_primitive::<Float32Type>().value(row).into()),
            DataType::Float64 => FieldValue::Float(array.as_primitive::<Float64Type>().value(row)),
            DataType::Boolean => FieldValue::Boolean(array.as_boolean().value(row)),
            _ => {
                let formatter = ArrayFormatter::try_new(array, &FormatOptions::default()).ok()?;
                FieldValue::Text(formatter.value(row).to_string())
            }
        };
        Some(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Unsigned(value) => write!(f, "{value}"),
            FieldValue::Float(value) => write!(f, "{value}"),
            FieldValue::Boolean(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(text: &str) -> Self {
        FieldValue::Text(text.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

/// One census row restricted to the fixed projection.
///
/// Serializes with the source column names so JSON responses keep the field
/// names clients of the census API already rely on. The identity and the
/// two station numbers are [`FieldValue`]s because publishers have shipped
/// them both as text and as integers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CensusRecord {
    #[serde(rename = "NUMERO_IDENTIDAD")]
    pub identity_number: FieldValue,
    #[serde(rename = "PRIMER_NOMBRE")]
    pub first_name: Option<String>,
    #[serde(rename = "SEGUNDO_NOMBRE")]
    pub second_name: Option<String>,
    #[serde(rename = "PRIMER_APELLIDO")]
    pub first_surname: Option<String>,
    #[serde(rename = "SEGUNDO_APELLIDO")]
    pub second_surname: Option<String>,
    #[serde(rename = "NOMBRE_DEPARTAMENTO")]
    pub department_name: Option<String>,
    #[serde(rename = "NOMBRE_MUNICIPIO")]
    pub municipality_name: Option<String>,
    #[serde(rename = "NOMBRE_CENTRO")]
    pub polling_center_name: Option<String>,
    #[serde(rename = "NUMERO_JRV")]
    pub polling_station_number: Option<FieldValue>,
    #[serde(rename = "NUMERO_LINEA")]
    pub line_number: Option<FieldValue>,
}

impl CensusRecord {
    /// Reads row `row` of a loaded batch.
    ///
    /// Returns `None` if the row has no identity number.
    pub(crate) fn from_row(batch: &RecordBatch, row: usize) -> Option<Self> {
        let value_at = |column: usize| FieldValue::read(batch.column(column).as_ref(), row);
        let text_at = |column: usize| value_at(column).map(|value| match value {
            FieldValue::Text(text) => text,
            other => other.to_string(),
        });

        Some(Self {
            identity_number: value_at(IDENTITY_NUMBER)?,
            first_name: text_at(FIRST_NAME),
            second_name: text_at(SECOND_NAME),
            first_surname: text_at(FIRST_SURNAME),
            second_surname: text_at(SECOND_SURNAME),
            department_name: text_at(DEPARTMENT_NAME),
            municipality_name: text_at(MUNICIPALITY_NAME),
            polling_center_name: text_at(POLLING_CENTER_NAME),
            polling_station_number: value_at(POLLING_STATION_NUMBER),
            line_number: value_at(LINE_NUMBER),
        })
    }
}
