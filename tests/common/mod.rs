#![allow(dead_code)]

//! A scripted in-memory driver for exercising the engine without a database.
//!
//! Each test registers the driver under its own id so tests running in parallel do not
//! share state through the global registry.

use std::collections::HashSet;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sql_bridge::driver::{
    ColumnMeta, Cursor, Driver, DriverConnection, DriverStatement, register_driver,
};
use sql_bridge::{BindValue, DriverError, Session};

/// One field of a scripted row.
#[derive(Debug, Clone)]
pub enum Field {
    Null,
    Text(String),
    Bytes(Vec<u8>),
    /// A stream that fails part way through reading
    Broken,
}

/// What the scripted driver returns, and what it saw.
#[derive(Debug, Default)]
pub struct Script {
    pub columns: Mutex<Vec<ColumnMeta>>,
    pub rows: Mutex<Vec<Vec<Field>>>,
    /// Row count reported for every batch entry
    pub batch_entry_count: Mutex<i64>,
    pub update_count: Mutex<u64>,
    /// SQL texts whose statements fail to close
    pub failing_close: Mutex<HashSet<String>>,
    pub fail_connection_close: AtomicBool,
    pub fail_commit: AtomicBool,
    /// 1-based number of the batch flush that fails
    pub fail_flush: Mutex<Option<usize>>,

    pub prepared: AtomicUsize,
    pub fetched: Arc<AtomicUsize>,
    pub closed_statements: AtomicUsize,
    pub flushes: Mutex<Vec<usize>>,
    pub bound: Mutex<Vec<(usize, BindValue)>>,
    pub streamed: Mutex<Vec<(usize, Vec<u8>)>>,
    /// Batch entries flushed and not yet rolled back
    pub applied: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub connection_closed: AtomicBool,
    pub auto_commit: Mutex<Option<bool>>,
}

impl Script {
    pub fn set_result(&self, columns: Vec<ColumnMeta>, rows: Vec<Vec<Field>>) {
        *self.columns.lock().unwrap() = columns;
        *self.rows.lock().unwrap() = rows;
    }

    pub fn fail_close_of(&self, sql: &str) {
        self.failing_close.lock().unwrap().insert(sql.to_string());
    }

    pub fn flush_sizes(&self) -> Vec<usize> {
        self.flushes.lock().unwrap().clone()
    }
}

struct ScriptedDriver {
    id: String,
    script: Arc<Script>,
}

impl Driver for ScriptedDriver {
    fn id(&self) -> &str {
        &self.id
    }

    fn connect(
        &self,
        url: &str,
        _login: &str,
        password: &str,
    ) -> Result<Box<dyn DriverConnection>, DriverError> {
        if password == "wrong" {
            return Err(DriverError::with_code(1017, format!("login denied for {url}")));
        }
        Ok(Box::new(ScriptedConnection {
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedConnection {
    script: Arc<Script>,
}

impl DriverConnection for ScriptedConnection {
    fn set_auto_commit(&self, enabled: bool) -> Result<(), DriverError> {
        *self.script.auto_commit.lock().unwrap() = Some(enabled);
        Ok(())
    }

    fn prepare(&self, sql: &str) -> Result<Box<dyn DriverStatement>, DriverError> {
        if sql.contains("SYNTAX ERROR") {
            return Err(DriverError::with_code(900, "invalid SQL statement"));
        }
        self.script.prepared.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedStatement {
            sql: sql.to_string(),
            script: Arc::clone(&self.script),
            pending: 0,
        }))
    }

    fn execute_update(&self, _sql: &str) -> Result<u64, DriverError> {
        Ok(*self.script.update_count.lock().unwrap())
    }

    fn commit(&self) -> Result<(), DriverError> {
        if self.script.fail_commit.load(Ordering::SeqCst) {
            return Err(DriverError::new("commit refused"));
        }
        self.script.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self) -> Result<(), DriverError> {
        self.script.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.script.applied.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<(), DriverError> {
        self.script.connection_closed.store(true, Ordering::SeqCst);
        if self.script.fail_connection_close.load(Ordering::SeqCst) {
            return Err(DriverError::new("connection close failed"));
        }
        Ok(())
    }
}

struct ScriptedStatement {
    sql: String,
    script: Arc<Script>,
    pending: usize,
}

impl DriverStatement for ScriptedStatement {
    fn clear_parameters(&mut self) {}

    fn bind(&mut self, index: usize, value: &BindValue) -> Result<(), DriverError> {
        self.script.bound.lock().unwrap().push((index, value.clone()));
        Ok(())
    }

    fn bind_binary_stream(
        &mut self,
        index: usize,
        reader: &mut dyn Read,
    ) -> Result<(), DriverError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        self.script.streamed.lock().unwrap().push((index, buf));
        Ok(())
    }

    fn bind_char_stream(
        &mut self,
        index: usize,
        reader: &mut dyn Read,
        _length: usize,
    ) -> Result<(), DriverError> {
        self.bind_binary_stream(index, reader)
    }

    fn add_batch(&mut self) -> Result<(), DriverError> {
        self.pending += 1;
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<i64>, DriverError> {
        let entries = std::mem::take(&mut self.pending);
        let mut flushes = self.script.flushes.lock().unwrap();
        flushes.push(entries);
        if *self.script.fail_flush.lock().unwrap() == Some(flushes.len()) {
            return Err(DriverError::with_code(1, "unique constraint violated"));
        }
        drop(flushes);
        self.script.applied.fetch_add(entries, Ordering::SeqCst);
        let count = *self.script.batch_entry_count.lock().unwrap();
        Ok(vec![count; entries])
    }

    fn execute_query(&mut self) -> Result<Box<dyn Cursor>, DriverError> {
        Ok(Box::new(ScriptedCursor {
            fetched: Arc::clone(&self.script.fetched),
            columns: self.script.columns.lock().unwrap().clone(),
            rows: self.script.rows.lock().unwrap().clone().into_iter(),
            current: None,
        }))
    }

    fn execute_update(&mut self) -> Result<u64, DriverError> {
        Ok(*self.script.update_count.lock().unwrap())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.script.closed_statements.fetch_add(1, Ordering::SeqCst);
        if self.script.failing_close.lock().unwrap().contains(&self.sql) {
            return Err(DriverError::with_code(17008, "statement close failed"));
        }
        Ok(())
    }
}

struct ScriptedCursor {
    fetched: Arc<AtomicUsize>,
    columns: Vec<ColumnMeta>,
    rows: std::vec::IntoIter<Vec<Field>>,
    current: Option<Vec<Field>>,
}

impl ScriptedCursor {
    fn field(&self, index: usize) -> Result<&Field, DriverError> {
        self.current
            .as_ref()
            .and_then(|row| row.get(index))
            .ok_or_else(|| DriverError::new(format!("no field at {index}")))
    }
}

/// Reader that yields a few bytes and then fails.
struct BrokenReader {
    served: bool,
}

impl Read for BrokenReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.served {
            return Err(io::Error::other("connection reset while streaming"));
        }
        self.served = true;
        let n = buf.len().min(3);
        buf[..n].copy_from_slice(&b"abc"[..n]);
        Ok(n)
    }
}

fn stream(field: &Field) -> Option<Box<dyn Read + '_>> {
    match field {
        Field::Null => None,
        Field::Text(text) => Some(Box::new(io::Cursor::new(text.as_bytes()))),
        Field::Bytes(bytes) => Some(Box::new(io::Cursor::new(bytes.as_slice()))),
        Field::Broken => Some(Box::new(BrokenReader { served: false })),
    }
}

impl Cursor for ScriptedCursor {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<bool, DriverError> {
        self.current = self.rows.next();
        if self.current.is_some() {
            self.fetched.fetch_add(1, Ordering::SeqCst);
        }
        Ok(self.current.is_some())
    }

    fn get_string(&mut self, index: usize) -> Result<Option<String>, DriverError> {
        match self.field(index)? {
            Field::Null => Ok(None),
            Field::Text(text) => Ok(Some(text.clone())),
            Field::Bytes(bytes) => Ok(Some(String::from_utf8_lossy(bytes).into_owned())),
            Field::Broken => Err(DriverError::new("field cannot be read as a string")),
        }
    }

    fn char_stream(&mut self, index: usize) -> Result<Option<Box<dyn Read + '_>>, DriverError> {
        Ok(stream(self.field(index)?))
    }

    fn binary_stream(
        &mut self,
        index: usize,
    ) -> Result<Option<Box<dyn Read + '_>>, DriverError> {
        Ok(stream(self.field(index)?))
    }

    fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Register a scripted driver under `id` and hand back its script.
pub fn install(id: &str) -> Arc<Script> {
    let script = Arc::new(Script::default());
    register_driver(Arc::new(ScriptedDriver {
        id: id.to_string(),
        script: Arc::clone(&script),
    }));
    script
}

/// Register a scripted driver under `id` and open a session on it.
pub fn scripted_session(id: &str) -> (Session, Arc<Script>) {
    let script = install(id);
    let session = Session::open(id, &format!("scripted://{id}"), "tester", "secret")
        .expect("scripted driver connects");
    (session, script)
}

/// Route engine logs to the test harness output. Safe to call from every test.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
