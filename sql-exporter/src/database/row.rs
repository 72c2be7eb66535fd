//! Row mapping.
//!
//! Every result row becomes a [`Row`]: lowercased column names mapped to the
//! raw textual value of the column. SQL `NULL` is kept as the literal
//! string [`NULL`] so that it takes part in the normal numeric parsing and
//! gets skipped there.

use std::collections::HashMap;

use sqlx::any::AnyRow;
use sqlx::{Column, Row as _, ValueRef};

use crate::{Error, Result};

/// Textual representation of SQL `NULL`.
pub const NULL: &str = "NULL";

/// One result row, keyed by lowercased column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    fields: HashMap<String, String>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: HashMap::with_capacity(capacity),
        }
    }

    /// Store a column value. The column name is lowercased.
    pub fn insert(&mut self, column: &str, value: impl Into<String>) {
        self.fields.insert(column.to_lowercase(), value.into());
    }

    /// Case-insensitive column lookup.
    pub fn get(&self, column: &str) -> Option<&str> {
        match self.fields.get(column) {
            Some(value) => Some(value.as_str()),
            None => self
                .fields
                .get(&column.to_lowercase())
                .map(String::as_str),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Row
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.insert(column.as_ref(), value);
        }
        row
    }
}

/// Convert a driver row into a [`Row`].
pub fn map_any_row(row: &AnyRow) -> Result<Row> {
    let mut mapped = Row::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let value = render_value(row, index).map_err(|e| {
            Error::row_scan(format!("column '{}': {}", column.name(), e))
        })?;
        mapped.insert(column.name(), value);
    }
    Ok(mapped)
}

fn render_value(row: &AnyRow, index: usize) -> std::result::Result<String, String> {
    let is_null = row
        .try_get_raw(index)
        .map_err(|e| e.to_string())?
        .is_null();
    if is_null {
        return Ok(NULL.to_string());
    }

    if let Ok(value) = row.try_get::<String, _>(index) {
        return Ok(value);
    }
    if let Ok(value) = row.try_get::<i64, _>(index) {
        return Ok(value.to_string());
    }
    if let Ok(value) = row.try_get::<i32, _>(index) {
        return Ok(value.to_string());
    }
    if let Ok(value) = row.try_get::<i16, _>(index) {
        return Ok(value.to_string());
    }
    if let Ok(value) = row.try_get::<f64, _>(index) {
        return Ok(value.to_string());
    }
    if let Ok(value) = row.try_get::<f32, _>(index) {
        return Ok(value.to_string());
    }
    if let Ok(value) = row.try_get::<bool, _>(index) {
        return Ok(if value { "1" } else { "0" }.to_string());
    }
    if let Ok(value) = row.try_get::<Vec<u8>, _>(index) {
        return Ok(String::from_utf8_lossy(&value).into_owned());
    }

    Err("value cannot be read as text".to_string())
}
