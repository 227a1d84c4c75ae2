use std::io::{self, Read};

use rusqlite::types::ValueRef;

use crate::driver::{ColumnMeta, Cursor};
use crate::error::DriverError;

/// One fetched field. Text is kept as the raw bytes `SQLite` stored, which are not
/// guaranteed to be valid UTF-8.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(Vec<u8>),
    Blob(Vec<u8>),
}

impl From<ValueRef<'_>> for Cell {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Cell::Null,
            ValueRef::Integer(i) => Cell::Integer(i),
            ValueRef::Real(f) => Cell::Real(f),
            ValueRef::Text(bytes) => Cell::Text(bytes.to_vec()),
            ValueRef::Blob(bytes) => Cell::Blob(bytes.to_vec()),
        }
    }
}

/// Cursor over a fully fetched `SQLite` result.
pub struct SqliteCursor {
    columns: Vec<ColumnMeta>,
    rows: std::vec::IntoIter<Vec<Cell>>,
    current: Option<Vec<Cell>>,
    closed: bool,
}

impl SqliteCursor {
    pub(crate) fn new(columns: Vec<ColumnMeta>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
            current: None,
            closed: false,
        }
    }

    fn cell(&self, index: usize) -> Result<&Cell, DriverError> {
        if self.closed {
            return Err(DriverError::new("cursor is closed"));
        }
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| DriverError::new("cursor is not positioned on a row"))?;
        row.get(index)
            .ok_or_else(|| DriverError::new(format!("column index {index} out of range")))
    }
}

fn stream(cell: &Cell) -> Option<Box<dyn Read + '_>> {
    match cell {
        Cell::Null => None,
        Cell::Text(bytes) | Cell::Blob(bytes) => Some(Box::new(io::Cursor::new(bytes.as_slice()))),
        Cell::Integer(i) => Some(Box::new(io::Cursor::new(i.to_string().into_bytes()))),
        Cell::Real(f) => Some(Box::new(io::Cursor::new(f.to_string().into_bytes()))),
    }
}

impl Cursor for SqliteCursor {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<bool, DriverError> {
        if self.closed {
            return Err(DriverError::new("cursor is closed"));
        }
        self.current = self.rows.next();
        Ok(self.current.is_some())
    }

    fn get_string(&mut self, index: usize) -> Result<Option<String>, DriverError> {
        Ok(match self.cell(index)? {
            Cell::Null => None,
            Cell::Integer(i) => Some(i.to_string()),
            Cell::Real(f) => Some(f.to_string()),
            Cell::Text(bytes) => Some(String::from_utf8(bytes.clone()).map_err(|e| {
                DriverError::new(format!("text in column {index} is not valid UTF-8: {e}"))
            })?),
            Cell::Blob(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        })
    }

    fn char_stream(&mut self, index: usize) -> Result<Option<Box<dyn Read + '_>>, DriverError> {
        Ok(stream(self.cell(index)?))
    }

    fn binary_stream(
        &mut self,
        index: usize,
    ) -> Result<Option<Box<dyn Read + '_>>, DriverError> {
        Ok(stream(self.cell(index)?))
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.closed = true;
        self.current = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SqlType;

    fn cursor() -> SqliteCursor {
        SqliteCursor::new(
            vec![
                ColumnMeta::new("n", SqlType::Integer),
                ColumnMeta::new("b", SqlType::Blob),
            ],
            vec![
                vec![Cell::Integer(7), Cell::Blob(vec![1, 2])],
                vec![Cell::Real(2.5), Cell::Null],
                vec![Cell::Text(vec![0xff, 0xfe, b'A']), Cell::Null],
            ],
        )
    }

    #[test]
    fn walks_rows_and_converts_values() {
        let mut cur = cursor();
        assert!(cur.get_string(0).is_err());
        assert!(cur.next_row().unwrap());
        assert_eq!(cur.get_string(0).unwrap().as_deref(), Some("7"));
        let mut bytes = Vec::new();
        cur.binary_stream(1)
            .unwrap()
            .unwrap()
            .read_to_end(&mut bytes)
            .unwrap();
        assert_eq!(bytes, vec![1, 2]);
        assert!(cur.next_row().unwrap());
        assert_eq!(cur.get_string(0).unwrap().as_deref(), Some("2.5"));
        assert!(cur.binary_stream(1).unwrap().is_none());
        assert!(cur.get_string(5).is_err());
    }

    #[test]
    fn invalid_utf8_text_is_an_error_not_a_panic() {
        let mut cur = cursor();
        for _ in 0..3 {
            assert!(cur.next_row().unwrap());
        }
        assert!(cur.get_string(0).is_err());
        let mut raw = Vec::new();
        cur.char_stream(0)
            .unwrap()
            .unwrap()
            .read_to_end(&mut raw)
            .unwrap();
        assert_eq!(raw, vec![0xff, 0xfe, b'A']);
        assert!(!cur.next_row().unwrap());
    }

    #[test]
    fn closed_cursor_rejects_reads() {
        let mut cur = cursor();
        cur.close().unwrap();
        assert!(cur.next_row().is_err());
    }
}
