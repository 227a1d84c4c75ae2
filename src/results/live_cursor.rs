use tracing::debug;

use super::materializer::{RecordStream, RowDecoder};
use super::record::Record;
use super::result_set::ResultSet;
use crate::driver::{ColumnMeta, Cursor, DriverStatement};
use crate::error::SqlBridgeError;

/// A query cursor handed to the caller for lazy consumption.
///
/// Owns the one-off statement that produced it. `close` releases the cursor and then
/// the statement; dropping an unclosed cursor does the same and logs any failure.
pub struct LiveCursor {
    sql: String,
    cursor: Box<dyn Cursor>,
    statement: Option<Box<dyn DriverStatement>>,
    decoder: RowDecoder,
    closed: bool,
}

impl LiveCursor {
    pub(crate) fn new(
        sql: &str,
        cursor: Box<dyn Cursor>,
        statement: Option<Box<dyn DriverStatement>>,
    ) -> Self {
        let decoder = RowDecoder::new(cursor.columns());
        Self {
            sql: sql.to_string(),
            cursor,
            statement,
            decoder,
            closed: false,
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnMeta] {
        self.cursor.columns()
    }

    /// Direct access to the driver cursor, for hosts that decode rows themselves.
    pub fn cursor_mut(&mut self) -> &mut dyn Cursor {
        &mut *self.cursor
    }

    /// Decode the next row, or `None` once the cursor is exhausted.
    ///
    /// # Errors
    /// Returns `SqlBridgeError::ExecutionError` if fetching or decoding fails.
    pub fn next_record(&mut self) -> Result<Option<Record>, SqlBridgeError> {
        let has_row = self
            .cursor
            .next_row()
            .map_err(|e| SqlBridgeError::execution(&self.sql, e))?;
        if !has_row {
            return Ok(None);
        }
        self.decoder
            .decode_row(&mut *self.cursor)
            .map(Some)
            .map_err(|e| SqlBridgeError::execution(&self.sql, e))
    }

    /// Iterate over the remaining rows.
    pub fn records(&mut self) -> impl Iterator<Item = Result<Record, SqlBridgeError>> + '_ {
        let sql = self.sql.as_str();
        RecordStream::with_decoder(&mut *self.cursor, self.decoder.clone())
            .map(move |record| record.map_err(|e| SqlBridgeError::execution(sql, e)))
    }

    /// Drain the remaining rows into a result set and close the cursor.
    ///
    /// # Errors
    /// Returns `SqlBridgeError::ExecutionError` if fetching, decoding or closing fails.
    pub fn into_result_set(mut self) -> Result<ResultSet, SqlBridgeError> {
        let mut result_set =
            ResultSet::with_capacity(std::sync::Arc::clone(self.decoder.column_names()), 16);
        while let Some(record) = self.next_record()? {
            result_set.push(record);
        }
        self.close()?;
        Ok(result_set)
    }

    /// Close the cursor, then its statement. The first failure is reported after both
    /// have been attempted.
    ///
    /// # Errors
    /// Returns `SqlBridgeError::ExecutionError` if the cursor fails to close, or
    /// `SqlBridgeError::StatementCloseError` if the statement does.
    pub fn close(mut self) -> Result<(), SqlBridgeError> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<(), SqlBridgeError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let cursor_result = self
            .cursor
            .close()
            .map_err(|e| SqlBridgeError::execution(&self.sql, e));
        let statement_result = match self.statement.as_mut() {
            Some(statement) => statement
                .close()
                .map_err(|e| SqlBridgeError::close(&self.sql, e)),
            None => Ok(()),
        };
        cursor_result.and(statement_result)
    }
}

impl Drop for LiveCursor {
    fn drop(&mut self) {
        if let Err(err) = self.close_inner() {
            debug!(%err, "error closing cursor on drop");
        }
    }
}

impl std::fmt::Debug for LiveCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveCursor")
            .field("sql", &self.sql)
            .field("columns", &self.cursor.columns())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
