//! Conversions between [`Value`] and rusqlite, and statement runners shared by
//! the pooled connection and the transaction.

use std::sync::Arc;

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, params_from_iter};

use crate::core::{Row, Value};
use crate::error::{DriverError, DriverResult};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(v) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Integer(v),
            ValueRef::Real(v) => Value::Real(v),
            ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
            ValueRef::Blob(v) => Value::Blob(v.to_vec()),
        }
    }
}

fn ensure_statement(sql: &str) -> DriverResult<()> {
    if sql.trim().is_empty() {
        return Err(DriverError::EmptyStatement);
    }
    Ok(())
}

/// Runs `sql` and reads every row.
pub(crate) fn query_on(conn: &Connection, sql: &str, params: &[Value]) -> DriverResult<Vec<Row>> {
    ensure_statement(sql)?;
    let mut stmt = conn.prepare_cached(sql)?;
    let columns: Arc<[String]> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();

    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut res = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            values.push(Value::from(row.get_ref(idx)?));
        }
        res.push(Row::new(Arc::clone(&columns), values));
    }
    Ok(res)
}

/// Runs `sql` to completion and keeps the first row.
///
/// The statement is always stepped to the end so writes with `RETURNING`
/// are fully applied before the row is handed back.
pub(crate) fn query_row_on(
    conn: &Connection,
    sql: &str,
    params: &[Value],
) -> DriverResult<Option<Row>> {
    Ok(query_on(conn, sql, params)?.into_iter().next())
}

/// Runs `sql` and returns the number of rows changed.
pub(crate) fn exec_on(conn: &Connection, sql: &str, params: &[Value]) -> DriverResult<u64> {
    ensure_statement(sql)?;
    let mut stmt = conn.prepare_cached(sql)?;
    let changed = stmt.execute(params_from_iter(params.iter()))?;
    Ok(changed as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, score REAL, data BLOB);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_values_survive_a_round_trip_through_sqlite() {
        let conn = conn();
        let changed = exec_on(
            &conn,
            "INSERT INTO t (id, name, score, data) VALUES (?1, ?2, ?3, ?4)",
            &[1.into(), "bolt".into(), 2.5.into(), vec![1u8, 2, 3].into()],
        )
        .unwrap();
        assert_eq!(changed, 1);

        let row = query_row_on(&conn, "SELECT id, name, score, data FROM t", &[])
            .unwrap()
            .unwrap();
        assert_eq!(row.columns(), &["id", "name", "score", "data"]);
        assert_eq!(row.get::<i64>(0).unwrap(), 1);
        assert_eq!(row.get_named::<String>("name").unwrap(), "bolt");
        assert_eq!(row.get::<f64>(2).unwrap(), 2.5);
        assert_eq!(row.get::<Vec<u8>>(3).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_null_binds_and_reads_back() {
        let conn = conn();
        let params = [7.into(), Value::Null];
        exec_on(&conn, "INSERT INTO t (id, name) VALUES (?1, ?2)", &params).unwrap();

        let row = query_row_on(&conn, "SELECT name FROM t WHERE id = ?1", &[7.into()])
            .unwrap()
            .unwrap();
        assert_eq!(row.get::<Option<String>>(0).unwrap(), None);
    }

    #[test]
    fn test_no_row_and_empty_statement() {
        let conn = conn();
        assert!(query_row_on(&conn, "SELECT id FROM t", &[]).unwrap().is_none());
        assert!(matches!(
            exec_on(&conn, "  ", &[]),
            Err(DriverError::EmptyStatement)
        ));
    }

    #[test]
    fn test_returning_applies_insert() {
        let conn = conn();
        let row = query_row_on(
            &conn,
            "INSERT INTO t (name) VALUES (?1) RETURNING id, name",
            &["nut".into()],
        )
        .unwrap()
        .unwrap();
        assert_eq!(row.get_named::<String>("name").unwrap(), "nut");

        let count = query_row_on(&conn, "SELECT COUNT(*) FROM t", &[]).unwrap().unwrap();
        assert_eq!(count.get::<i64>(0).unwrap(), 1);
    }
}
