//! Large object reads and writes.
//!
//! Reads fully materialize a LOB into a `String` or `Vec<u8>`; writes bind a string or
//! byte payload as a character or binary stream.

use std::io::{self, Read};

use tracing::warn;

use crate::driver::{Cursor, DriverStatement};
use crate::error::{DriverError, FieldDecodeWarning, LobKind};
use crate::types::{LobValue, SqlType};

fn drain_text(reader: &mut dyn Read) -> Result<String, DriverError> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    String::from_utf8(buf)
        .map_err(|e| DriverError::new(format!("character stream is not valid UTF-8: {e}")))
}

fn drain_bytes(reader: &mut dyn Read) -> Result<Vec<u8>, DriverError> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Read a whole character field of the current row; `None` for SQL NULL.
pub(crate) fn read_char_field(
    cursor: &mut dyn Cursor,
    index: usize,
) -> Result<Option<String>, DriverError> {
    match cursor.char_stream(index)? {
        Some(mut reader) => drain_text(&mut reader).map(Some),
        None => Ok(None),
    }
}

/// Read a whole binary field of the current row; `None` for SQL NULL.
pub(crate) fn read_binary_field(
    cursor: &mut dyn Cursor,
    index: usize,
) -> Result<Option<Vec<u8>>, DriverError> {
    match cursor.binary_stream(index)? {
        Some(mut reader) => drain_bytes(&mut reader).map(Some),
        None => Ok(None),
    }
}

/// Read the first column of the first row as a LOB.
///
/// A character LOB yields text and a binary LOB yields bytes; any other column type,
/// an empty cursor, or SQL NULL yields `None`. Failures that happen before any data is
/// read (fetching the row, opening the stream) are returned; failures while draining
/// the stream are logged and yield `None`.
///
/// # Errors
/// Returns `DriverError` if the row cannot be fetched or the stream cannot be opened.
pub fn read_scalar_lob(cursor: &mut dyn Cursor) -> Result<Option<LobValue>, DriverError> {
    let Some(first) = cursor.columns().first() else {
        return Ok(None);
    };
    let column = first.name.clone();
    let kind = match first.sql_type {
        SqlType::Clob => LobKind::Character,
        SqlType::Blob => LobKind::Binary,
        _ => return Ok(None),
    };
    if !cursor.next_row()? {
        return Ok(None);
    }

    let drained = match kind {
        LobKind::Character => match cursor.char_stream(0)? {
            Some(mut reader) => drain_text(&mut reader).map(LobValue::Text),
            None => return Ok(None),
        },
        LobKind::Binary => match cursor.binary_stream(0)? {
            Some(mut reader) => drain_bytes(&mut reader).map(LobValue::Bytes),
            None => return Ok(None),
        },
    };

    match drained {
        Ok(value) => Ok(Some(value)),
        Err(source) => {
            let warning = FieldDecodeWarning {
                column,
                kind,
                source,
            };
            warn!(%warning, "scalar LOB read yielded nothing");
            Ok(None)
        }
    }
}

/// Bind `value` at the 1-based `index`: bytes as a binary stream, text as a character
/// stream of the string's exact character length.
///
/// # Errors
/// Returns `DriverError` if the driver rejects the stream.
pub fn write_lob(
    statement: &mut dyn DriverStatement,
    index: usize,
    value: &LobValue,
) -> Result<(), DriverError> {
    match value {
        LobValue::Bytes(bytes) => {
            let mut reader = io::Cursor::new(bytes.as_slice());
            statement.bind_binary_stream(index, &mut reader)
        }
        LobValue::Text(text) => {
            let mut reader = io::Cursor::new(text.as_bytes());
            statement.bind_char_stream(index, &mut reader, text.chars().count())
        }
    }
}
