use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::debug;

use super::statement::SqliteStatement;
use crate::driver::{DriverConnection, DriverStatement};
use crate::error::DriverError;

const ROLLBACK_BUSY_RETRIES: &[Duration] = &[
    Duration::from_millis(10),
    Duration::from_millis(25),
    Duration::from_millis(50),
];

/// State shared by a connection and every statement prepared on it.
pub(crate) struct Shared {
    conn: Mutex<Option<rusqlite::Connection>>,
    auto_commit: AtomicBool,
}

impl Shared {
    /// Run `func` against the open connection.
    pub(crate) fn with_conn<R>(
        &self,
        func: impl FnOnce(&rusqlite::Connection) -> Result<R, DriverError>,
    ) -> Result<R, DriverError> {
        let guard = match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_ref() {
            Some(conn) => func(conn),
            None => Err(DriverError::new("connection is closed")),
        }
    }

    /// Open a transaction unless auto-commit is on or one is already open.
    pub(crate) fn begin_if_needed(&self, conn: &rusqlite::Connection) -> Result<(), DriverError> {
        if !self.auto_commit.load(Ordering::Acquire) && conn.is_autocommit() {
            conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }
}

/// A `SQLite` connection behind the driver seam.
///
/// With auto-commit off, a transaction is opened before the first write and stays open
/// until `commit` or `rollback`. Reads outside a transaction do not open one.
pub struct SqliteConnection {
    shared: Arc<Shared>,
}

impl SqliteConnection {
    pub(crate) fn new(conn: rusqlite::Connection) -> Self {
        Self {
            shared: Arc::new(Shared {
                conn: Mutex::new(Some(conn)),
                auto_commit: AtomicBool::new(true),
            }),
        }
    }

    fn finish_transaction(&self, command: &str) -> Result<(), DriverError> {
        self.shared.with_conn(|conn| {
            if conn.is_autocommit() {
                return Ok(());
            }
            conn.execute_batch(command)?;
            Ok(())
        })
    }
}

fn is_busy(err: &DriverError) -> bool {
    err.code
        .is_some_and(|code| code & 0xff == rusqlite::ffi::SQLITE_BUSY as i64)
}

impl DriverConnection for SqliteConnection {
    fn set_auto_commit(&self, enabled: bool) -> Result<(), DriverError> {
        let was_enabled = self.shared.auto_commit.swap(enabled, Ordering::AcqRel);
        if enabled && !was_enabled {
            // Turning auto-commit back on commits whatever is pending.
            self.finish_transaction("COMMIT")?;
        }
        Ok(())
    }

    fn prepare(&self, sql: &str) -> Result<Box<dyn DriverStatement>, DriverError> {
        // warm the cache so repeated executions don't re-prepare.
        self.shared.with_conn(|conn| {
            conn.prepare_cached(sql)?;
            Ok(())
        })?;
        Ok(Box::new(SqliteStatement::new(Arc::clone(&self.shared), sql)))
    }

    fn execute_update(&self, sql: &str) -> Result<u64, DriverError> {
        self.shared.with_conn(|conn| {
            self.shared.begin_if_needed(conn)?;
            let affected = conn.execute(sql, [])?;
            Ok(affected as u64)
        })
    }

    fn commit(&self) -> Result<(), DriverError> {
        self.finish_transaction("COMMIT")
    }

    fn rollback(&self) -> Result<(), DriverError> {
        for (idx, delay) in ROLLBACK_BUSY_RETRIES.iter().copied().enumerate() {
            match self.finish_transaction("ROLLBACK") {
                Err(err) if is_busy(&err) && idx + 1 < ROLLBACK_BUSY_RETRIES.len() => {
                    debug!(attempt = idx + 1, "rollback busy, retrying");
                    thread::sleep(delay);
                }
                result => return result,
            }
        }
        Err(DriverError::new("rollback retries exhausted"))
    }

    fn close(&self) -> Result<(), DriverError> {
        let mut guard = match self.shared.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.take() {
            Some(conn) => conn.close().map_err(|(_, err)| DriverError::from(err)),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("auto_commit", &self.shared.auto_commit.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
