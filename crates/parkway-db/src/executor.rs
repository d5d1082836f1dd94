use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use parkway_common::{Error, Result};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ErrorCode, ToSql, ffi, params_from_iter};
use tracing::{debug, info};

/// A dynamically typed statement argument or result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// One result row, cells in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row(pub Vec<Value>);

impl Row {
    fn cell(&self, idx: usize) -> Result<&Value> {
        self.0
            .get(idx)
            .ok_or_else(|| Error::Database(format!("column {idx} out of range")))
    }

    pub fn get_i64(&self, idx: usize) -> Result<i64> {
        match self.cell(idx)? {
            Value::Integer(v) => Ok(*v),
            other => Err(Error::Database(format!(
                "column {idx}: expected integer, got {other:?}"
            ))),
        }
    }

    pub fn get_str(&self, idx: usize) -> Result<&str> {
        match self.cell(idx)? {
            Value::Text(v) => Ok(v),
            other => Err(Error::Database(format!(
                "column {idx}: expected text, got {other:?}"
            ))),
        }
    }

    pub fn get_opt_str(&self, idx: usize) -> Result<Option<&str>> {
        match self.cell(idx)? {
            Value::Null => Ok(None),
            _ => self.get_str(idx).map(Some),
        }
    }
}

/// Executes statements against a durable store.
///
/// Implementations own whatever concurrency discipline the backend needs;
/// callers share one executor across threads.
pub trait StatementExecutor: Send + Sync {
    /// Run a single statement and return the number of affected rows.
    fn execute(&self, statement: &str, args: &[Value]) -> Result<usize>;

    /// Run a script of one or more statements verbatim, without arguments.
    fn execute_batch(&self, script: &str) -> Result<()>;

    /// Run a statement that yields rows.
    fn query(&self, statement: &str, args: &[Value]) -> Result<Vec<Row>>;
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(v) => ToSqlOutput::Borrowed(ValueRef::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Borrowed(ValueRef::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
        })
    }
}

impl TryFrom<ValueRef<'_>> for Value {
    type Error = Error;

    fn try_from(value: ValueRef<'_>) -> Result<Self> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Integer(v),
            ValueRef::Real(v) => Value::Real(v),
            ValueRef::Text(v) => Value::Text(
                String::from_utf8(v.to_vec())
                    .map_err(|e| Error::Database(format!("invalid utf-8 in text column: {e}")))?,
            ),
            ValueRef::Blob(v) => Value::Blob(v.to_vec()),
        })
    }
}

/// `StatementExecutor` backed by a single SQLite connection.
pub struct SqliteExecutor {
    conn: Mutex<Connection>,
}

impl SqliteExecutor {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(dir) = db_path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir).map_err(|e| {
                Error::Database(format!(
                    "failed to create database directory {}: {e}",
                    dir.display()
                ))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;
        info!("database opened at {}", db_path.display());
        Self::configure(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("connection lock poisoned".into()))
    }
}

impl StatementExecutor for SqliteExecutor {
    fn execute(&self, statement: &str, args: &[Value]) -> Result<usize> {
        debug!(statement, args = args.len(), "execute");
        let conn = self.connection()?;
        conn.execute(statement, params_from_iter(args.iter()))
            .map_err(|e| map_sqlite_error("execute failed", e))
    }

    fn execute_batch(&self, script: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(script)
            .map_err(|e| map_sqlite_error("batch failed", e))
    }

    fn query(&self, statement: &str, args: &[Value]) -> Result<Vec<Row>> {
        debug!(statement, args = args.len(), "query");
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(statement)
            .map_err(|e| map_sqlite_error("failed to prepare query", e))?;
        let column_count = stmt.column_count();

        let mut rows = stmt
            .query(params_from_iter(args.iter()))
            .map_err(|e| map_sqlite_error("query failed", e))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| map_sqlite_error("failed to read row", e))?
        {
            let mut cells = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                let cell = row
                    .get_ref(idx)
                    .map_err(|e| map_sqlite_error("failed to read column", e))?;
                cells.push(Value::try_from(cell)?);
            }
            out.push(Row(cells));
        }
        Ok(out)
    }
}

fn map_sqlite_error(context: &str, e: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(failure, _) = &e
        && failure.code == ErrorCode::ConstraintViolation
        && matches!(
            failure.extended_code,
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE
        )
    {
        return Error::DuplicateKey(e.to_string());
    }
    Error::Database(format!("{context}: {e}"))
}
