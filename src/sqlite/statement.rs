use std::io::Read;
use std::sync::Arc;

use rusqlite::params_from_iter;
use rusqlite::types::Value;

use super::connection::Shared;
use super::cursor::{Cell, SqliteCursor};
use super::params::bind_value_to_sqlite;
use crate::driver::{ColumnMeta, Cursor, DriverStatement};
use crate::error::DriverError;
use crate::types::{BindValue, SqlType};

/// Prepared statement on a [`SqliteConnection`](super::SqliteConnection).
///
/// The compiled statement lives in rusqlite's per-connection cache keyed by SQL; this
/// type owns the bound parameters and queued batch entries.
///
/// A query fetches its whole result before the cursor is returned, so the cursor does
/// not hold the connection and other statements can run while it is open.
pub struct SqliteStatement {
    shared: Arc<Shared>,
    sql: String,
    params: Vec<Value>,
    batch: Vec<Vec<Value>>,
    closed: bool,
}

impl SqliteStatement {
    pub(crate) fn new(shared: Arc<Shared>, sql: &str) -> Self {
        Self {
            shared,
            sql: sql.to_string(),
            params: Vec::new(),
            batch: Vec::new(),
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.closed {
            return Err(DriverError::new("statement is closed"));
        }
        Ok(())
    }

    fn set_param(&mut self, index: usize, value: Value) -> Result<(), DriverError> {
        self.ensure_open()?;
        if index == 0 {
            return Err(DriverError::new("parameter indexes start at 1"));
        }
        if self.params.len() < index {
            self.params.resize(index, Value::Null);
        }
        self.params[index - 1] = value;
        Ok(())
    }
}

impl DriverStatement for SqliteStatement {
    fn clear_parameters(&mut self) {
        self.params.clear();
    }

    fn bind(&mut self, index: usize, value: &BindValue) -> Result<(), DriverError> {
        self.set_param(index, bind_value_to_sqlite(value))
    }

    fn bind_binary_stream(
        &mut self,
        index: usize,
        reader: &mut dyn Read,
    ) -> Result<(), DriverError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.set_param(index, Value::Blob(bytes))
    }

    fn bind_char_stream(
        &mut self,
        index: usize,
        reader: &mut dyn Read,
        length: usize,
    ) -> Result<(), DriverError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        let available = text.chars().count();
        if available < length {
            return Err(DriverError::new(format!(
                "character stream ended after {available} of {length} characters"
            )));
        }
        if available > length {
            text = text.chars().take(length).collect();
        }
        self.set_param(index, Value::Text(text))
    }

    fn add_batch(&mut self) -> Result<(), DriverError> {
        self.ensure_open()?;
        self.batch.push(self.params.clone());
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<i64>, DriverError> {
        self.ensure_open()?;
        let entries = std::mem::take(&mut self.batch);
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        self.shared.with_conn(|conn| {
            self.shared.begin_if_needed(conn)?;
            let mut stmt = conn.prepare_cached(&self.sql)?;
            let mut counts = Vec::with_capacity(entries.len());
            for entry in &entries {
                let affected = stmt.execute(params_from_iter(entry.iter()))?;
                counts.push(i64::try_from(affected).unwrap_or(-1));
            }
            Ok(counts)
        })
    }

    fn execute_query(&mut self) -> Result<Box<dyn Cursor>, DriverError> {
        self.ensure_open()?;
        let cursor = self.shared.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&self.sql)?;
            let columns: Vec<ColumnMeta> = stmt
                .columns()
                .iter()
                .map(|col| ColumnMeta::new(col.name(), SqlType::from_declared(col.decl_type())))
                .collect();
            let width = columns.len();
            // INSERT ... RETURNING and friends write through the query path.
            if !stmt.readonly() {
                self.shared.begin_if_needed(conn)?;
            }

            let mut rows = stmt.query(params_from_iter(self.params.iter()))?;
            let mut buffered = Vec::new();
            while let Some(row) = rows.next()? {
                let mut cells = Vec::with_capacity(width);
                for idx in 0..width {
                    cells.push(Cell::from(row.get_ref(idx)?));
                }
                buffered.push(cells);
            }
            Ok(SqliteCursor::new(columns, buffered))
        })?;
        Ok(Box::new(cursor))
    }

    fn execute_update(&mut self) -> Result<u64, DriverError> {
        self.ensure_open()?;
        self.shared.with_conn(|conn| {
            self.shared.begin_if_needed(conn)?;
            let mut stmt = conn.prepare_cached(&self.sql)?;
            let affected = stmt.execute(params_from_iter(self.params.iter()))?;
            Ok(affected as u64)
        })
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.closed = true;
        self.params.clear();
        self.batch.clear();
        Ok(())
    }
}
