//! Loosely-typed result cells and rows.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// One cell of a query result.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// Maps the text representation Postgres sends for a column of type
    /// `type_name`. Numbers that fail to parse are kept as text.
    pub fn from_pg_text(type_name: &str, raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return CellValue::Null;
        };

        match type_name.to_ascii_uppercase().as_str() {
            "INT2" | "INT4" | "INT8" | "OID" => raw
                .parse()
                .map(CellValue::Integer)
                .unwrap_or_else(|_| CellValue::Text(raw.to_string())),
            "FLOAT4" | "FLOAT8" | "NUMERIC" => raw
                .parse()
                .map(CellValue::Float)
                .unwrap_or_else(|_| CellValue::Text(raw.to_string())),
            "BOOL" => match raw {
                "t" | "true" => CellValue::Bool(true),
                "f" | "false" => CellValue::Bool(false),
                other => CellValue::Text(other.to_string()),
            },
            _ => CellValue::Text(raw.to_string()),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_unit(),
            CellValue::Bool(b) => serializer.serialize_bool(*b),
            CellValue::Integer(i) => serializer.serialize_i64(*i),
            // JSON has no NaN/Infinity
            CellValue::Float(f) if !f.is_finite() => serializer.serialize_unit(),
            CellValue::Float(f) => serializer.serialize_f64(*f),
            CellValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// A result row: column names paired with values, in select-list order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, CellValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: CellValue) {
        self.fields.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }
}

impl FromIterator<(String, CellValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, CellValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
