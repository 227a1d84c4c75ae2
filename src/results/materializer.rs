use std::sync::Arc;

use tracing::warn;

use super::record::Record;
use super::result_set::ResultSet;
use crate::driver::{ColumnMeta, Cursor};
use crate::error::{DriverError, FieldDecodeWarning, LobKind};
use crate::lob::{read_binary_field, read_char_field};
use crate::types::{SqlType, TypeFamily, Value};

/// Decodes cursor rows into [`Record`]s.
///
/// Column names and declared types are read once from the cursor metadata and reused
/// for every row.
#[derive(Debug, Clone)]
pub struct RowDecoder {
    column_names: Arc<Vec<String>>,
    types: Vec<SqlType>,
}

impl RowDecoder {
    #[must_use]
    pub fn new(columns: &[ColumnMeta]) -> Self {
        Self {
            column_names: Arc::new(columns.iter().map(|c| c.name.clone()).collect()),
            types: columns.iter().map(|c| c.sql_type.clone()).collect(),
        }
    }

    #[must_use]
    pub fn column_names(&self) -> &Arc<Vec<String>> {
        &self.column_names
    }

    /// Decode the cursor's current row.
    ///
    /// LOB fields never fail the row: an unreadable LOB is logged and becomes
    /// `Value::Null`.
    ///
    /// # Errors
    /// Returns `DriverError` when a non-LOB field cannot be fetched, or a numeric field
    /// holds something that is not a number.
    pub fn decode_row(&self, cursor: &mut dyn Cursor) -> Result<Record, DriverError> {
        let mut values = Vec::with_capacity(self.types.len());
        for (index, sql_type) in self.types.iter().enumerate() {
            let value = decode_field(cursor, index, sql_type, &self.column_names[index])?;
            values.push(value);
        }
        Ok(Record::new(Arc::clone(&self.column_names), values))
    }
}

fn decode_field(
    cursor: &mut dyn Cursor,
    index: usize,
    sql_type: &SqlType,
    column: &str,
) -> Result<Value, DriverError> {
    match sql_type.family() {
        TypeFamily::Number => match cursor.get_string(index)? {
            Some(text) => parse_number(&text).map(Value::Number),
            None => Ok(Value::Null),
        },
        TypeFamily::CharacterLob => Ok(fail_soft(
            read_char_field(cursor, index).map(|text| text.map(Value::Text)),
            column,
            LobKind::Character,
        )),
        TypeFamily::BinaryLob => Ok(fail_soft(
            read_binary_field(cursor, index).map(|bytes| bytes.map(Value::Bytes)),
            column,
            LobKind::Binary,
        )),
        TypeFamily::Plain => Ok(cursor.get_string(index)?.map_or(Value::Null, Value::Text)),
    }
}

fn fail_soft(outcome: Result<Option<Value>, DriverError>, column: &str, kind: LobKind) -> Value {
    match outcome {
        Ok(value) => value.unwrap_or(Value::Null),
        Err(source) => {
            let warning = FieldDecodeWarning {
                column: column.to_string(),
                kind,
                source,
            };
            warn!(%warning, "LOB field replaced with null");
            Value::Null
        }
    }
}

fn parse_number(text: &str) -> Result<f64, DriverError> {
    text.trim()
        .parse::<f64>()
        .map_err(|e| DriverError::new(format!("cannot convert `{text}` to a number: {e}")))
}

/// Lazily decode the remaining rows of a cursor.
pub struct RecordStream<'c> {
    cursor: &'c mut dyn Cursor,
    decoder: RowDecoder,
    finished: bool,
}

impl<'c> RecordStream<'c> {
    pub fn new(cursor: &'c mut dyn Cursor) -> Self {
        let decoder = RowDecoder::new(cursor.columns());
        Self {
            cursor,
            decoder,
            finished: false,
        }
    }

    pub(crate) fn with_decoder(cursor: &'c mut dyn Cursor, decoder: RowDecoder) -> Self {
        Self {
            cursor,
            decoder,
            finished: false,
        }
    }
}

impl Iterator for RecordStream<'_> {
    type Item = Result<Record, DriverError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.cursor.next_row() {
            Ok(true) => {
                let record = self.decoder.decode_row(&mut *self.cursor);
                if record.is_err() {
                    self.finished = true;
                }
                Some(record)
            }
            Ok(false) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Drain a cursor into a [`ResultSet`]. The cursor is left open; closing it is the
/// caller's job.
///
/// # Errors
/// Returns `DriverError` if fetching a row or decoding a non-LOB field fails.
pub fn materialize(cursor: &mut dyn Cursor) -> Result<ResultSet, DriverError> {
    let decoder = RowDecoder::new(cursor.columns());
    let mut result_set = ResultSet::with_capacity(Arc::clone(decoder.column_names()), 16);
    for record in RecordStream::with_decoder(cursor, decoder) {
        result_set.push(record?);
    }
    Ok(result_set)
}
