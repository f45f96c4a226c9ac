//! Driver-neutral values, rows and cursors.
//!
//! Stores exchange parameters and results with the engine through [`Value`] and
//! [`Row`], so the engine and the per-entity callbacks never see driver types.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{DriverError, DriverResult};

/// A single SQL value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// SQL NULL.
    #[default]
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl Value {
    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Text(v.to_rfc3339())
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Conversion from a column [`Value`] into a Rust type.
pub trait FromValue: Sized {
    /// Converts `value`, read from `column`, into `Self`.
    fn from_value(value: &Value, column: &str) -> DriverResult<Self>;
}

fn mismatch(value: &Value, column: &str, expected: &str) -> DriverError {
    DriverError::Conversion {
        column: column.to_string(),
        message: format!("expected {}, found {}", expected, value.type_name()),
    }
}

impl FromValue for Value {
    fn from_value(value: &Value, _column: &str) -> DriverResult<Self> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value, column: &str) -> DriverResult<Self> {
        match value {
            Value::Integer(v) => Ok(*v),
            other => Err(mismatch(other, column, "integer")),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value, column: &str) -> DriverResult<Self> {
        let wide = i64::from_value(value, column)?;
        i32::try_from(wide).map_err(|_| DriverError::Conversion {
            column: column.to_string(),
            message: format!("{} out of range for i32", wide),
        })
    }
}

impl FromValue for bool {
    fn from_value(value: &Value, column: &str) -> DriverResult<Self> {
        Ok(i64::from_value(value, column)? != 0)
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value, column: &str) -> DriverResult<Self> {
        match value {
            Value::Real(v) => Ok(*v),
            Value::Integer(v) => Ok(*v as f64),
            other => Err(mismatch(other, column, "real")),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value, column: &str) -> DriverResult<Self> {
        match value {
            Value::Text(v) => Ok(v.clone()),
            other => Err(mismatch(other, column, "text")),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value, column: &str) -> DriverResult<Self> {
        match value {
            Value::Blob(v) => Ok(v.clone()),
            Value::Text(v) => Ok(v.clone().into_bytes()),
            other => Err(mismatch(other, column, "blob")),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value, column: &str) -> DriverResult<Self> {
        let text = String::from_value(value, column)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DriverError::Conversion {
                column: column.to_string(),
                message: format!("invalid timestamp '{}': {}", text, e),
            })
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value, column: &str) -> DriverResult<Self> {
        let text = String::from_value(value, column)?;
        Uuid::parse_str(&text).map_err(|e| DriverError::Conversion {
            column: column.to_string(),
            message: format!("invalid uuid '{}': {}", text, e),
        })
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value, column: &str) -> DriverResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other, column).map(Some),
        }
    }
}

/// One result row: column names shared across the result set, plus values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a row. `values` is expected to line up with `columns`.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Raw values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reads and converts the value at `idx`.
    pub fn get<T: FromValue>(&self, idx: usize) -> DriverResult<T> {
        let value = self.values.get(idx).ok_or_else(|| DriverError::ColumnNotFound {
            column: format!("#{}", idx),
        })?;
        let column = self.columns.get(idx).map(String::as_str).unwrap_or("?");
        T::from_value(value, column)
    }

    /// Reads and converts the value of the column called `name`.
    pub fn get_named<T: FromValue>(&self, name: &str) -> DriverResult<T> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .ok_or_else(|| DriverError::ColumnNotFound {
                column: name.to_string(),
            })?;
        self.get(idx)
    }
}

/// Result of a single-row query.
///
/// Errors are deferred until the row is consumed, so a store can hand back a
/// handle even when the query itself failed.
#[derive(Debug)]
pub struct SingleRow {
    result: DriverResult<Option<Row>>,
}

impl SingleRow {
    pub fn from_row(row: Row) -> Self {
        Self {
            result: Ok(Some(row)),
        }
    }

    /// A handle for a query that matched nothing.
    pub fn empty() -> Self {
        Self { result: Ok(None) }
    }

    /// A handle carrying a query failure.
    pub fn failed(err: DriverError) -> Self {
        Self { result: Err(err) }
    }

    /// Consumes the handle. Zero rows is reported as [`DriverError::NoRows`].
    pub fn into_row(self) -> DriverResult<Row> {
        self.result?.ok_or(DriverError::NoRows)
    }
}

impl From<DriverResult<Option<Row>>> for SingleRow {
    fn from(result: DriverResult<Option<Row>>) -> Self {
        Self { result }
    }
}

/// Forward-only cursor over a multi-row result.
#[async_trait]
pub trait RowCursor: Send {
    /// Returns the next row, or `None` when the result is exhausted.
    async fn next(&mut self) -> DriverResult<Option<Row>>;

    /// Releases the cursor. Further calls to `next` return `None`.
    fn close(&mut self);
}

/// A cursor over rows already read into memory.
#[derive(Debug, Default)]
pub struct BufferedRows {
    rows: VecDeque<Row>,
    closed: bool,
}

impl BufferedRows {
    pub fn new(rows: impl IntoIterator<Item = Row>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
            closed: false,
        }
    }

    /// Returns true once the cursor has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl RowCursor for BufferedRows {
    async fn next(&mut self) -> DriverResult<Option<Row>> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.rows.pop_front())
    }

    fn close(&mut self) {
        self.closed = true;
        self.rows.clear();
    }
}

/// Closes the wrapped cursor when dropped.
pub struct CursorGuard {
    inner: Box<dyn RowCursor>,
}

impl CursorGuard {
    pub fn new(inner: Box<dyn RowCursor>) -> Self {
        Self { inner }
    }

    pub async fn next(&mut self) -> DriverResult<Option<Row>> {
        self.inner.next().await
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: Vec<Value>) -> Row {
        let columns: Arc<[String]> =
            vec!["id".to_string(), "name".to_string(), "at".to_string()].into();
        Row::new(columns, values)
    }

    #[test]
    fn test_typed_access_by_index_and_name() {
        let now = Utc::now();
        let r = row(vec![Value::Integer(7), "gear".into(), now.into()]);

        assert_eq!(r.get::<i64>(0).unwrap(), 7);
        assert_eq!(r.get_named::<String>("NAME").unwrap(), "gear");
        let at: DateTime<Utc> = r.get_named("at").unwrap();
        assert_eq!(at.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn test_missing_column() {
        let r = row(vec![Value::Null, Value::Null, Value::Null]);
        assert!(matches!(
            r.get_named::<String>("missing"),
            Err(DriverError::ColumnNotFound { .. })
        ));
        assert!(matches!(r.get::<i64>(9), Err(DriverError::ColumnNotFound { .. })));
    }

    #[test]
    fn test_conversion_mismatch_names_column() {
        let r = row(vec![Value::Text("x".into()), Value::Null, Value::Null]);
        match r.get::<i64>(0) {
            Err(DriverError::Conversion { column, .. }) => assert_eq!(column, "id"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_option_and_null() {
        let r = row(vec![Value::Null, Value::Null, Value::Null]);
        assert_eq!(r.get::<Option<String>>(1).unwrap(), None);
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(3i32)), Value::Integer(3));
    }

    #[test]
    fn test_single_row_without_row_is_no_rows() {
        assert!(matches!(SingleRow::empty().into_row(), Err(DriverError::NoRows)));
        assert!(matches!(
            SingleRow::failed(DriverError::Cancelled).into_row(),
            Err(DriverError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_buffered_rows_stop_after_close() {
        let mut cursor = BufferedRows::new(vec![
            row(vec![Value::Integer(1), Value::Null, Value::Null]),
            row(vec![Value::Integer(2), Value::Null, Value::Null]),
        ]);

        let first = cursor.next().await.unwrap().unwrap();
        assert_eq!(first.get::<i64>(0).unwrap(), 1);

        cursor.close();
        assert!(cursor.is_closed());
        assert!(cursor.next().await.unwrap().is_none());
    }
}
