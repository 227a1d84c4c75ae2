//! The connection session: one live connection in manual-commit mode, plus its
//! statement cache.
//!
//! Operations on a session that was never connected are no-ops returning `None`, so
//! host code can run before it knows whether a connection exists. Operations on a
//! session that has been closed fail with `ConnectionError`.
//!
//! A session may be shared between threads, but the connection underneath executes
//! one statement at a time, and a cached statement serves one caller at a time:
//! callers sharing a session must take turns.

use std::slice;

use tracing::{debug, error};

use crate::batch::BatchJob;
use crate::config::ConnectOptions;
use crate::driver::{DriverConnection, DriverStatement, lookup_driver};
use crate::error::{DriverError, SqlBridgeError};
use crate::lob::{read_scalar_lob, write_lob};
use crate::results::{LiveCursor, ResultSet, materialize};
use crate::statement::StatementCache;
use crate::types::{BindValue, LobValue};

enum State {
    Unconnected,
    Open(Box<dyn DriverConnection>),
    Closed,
}

/// One database connection and its prepared-statement cache.
pub struct Session {
    state: State,
    driver_id: Option<String>,
    url: Option<String>,
    statements: StatementCache,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// An unconnected session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::Unconnected,
            driver_id: None,
            url: None,
            statements: StatementCache::new(),
        }
    }

    /// Connect a new session.
    ///
    /// # Errors
    /// Returns `SqlBridgeError::ConnectionError` if the driver id is unknown or the
    /// driver cannot open the connection.
    pub fn open(
        driver_id: &str,
        url: &str,
        login: &str,
        password: &str,
    ) -> Result<Self, SqlBridgeError> {
        let mut session = Self::new();
        session.connect(driver_id, url, login, password)?;
        Ok(session)
    }

    /// Open the connection with automatic commit disabled.
    ///
    /// # Errors
    /// Returns `SqlBridgeError::ConnectionError` if the driver id is unknown, the driver
    /// cannot open the connection, or this session is already connected or closed.
    pub fn connect(
        &mut self,
        driver_id: &str,
        url: &str,
        login: &str,
        password: &str,
    ) -> Result<(), SqlBridgeError> {
        match self.state {
            State::Unconnected => {}
            State::Open(_) => {
                return Err(SqlBridgeError::connection(url, "session is already connected"));
            }
            State::Closed => return Err(SqlBridgeError::connection(url, "session is closed")),
        }

        let driver = lookup_driver(driver_id).ok_or_else(|| {
            SqlBridgeError::connection(url, format!("unknown driver id `{driver_id}`"))
        })?;
        debug!(driver = driver_id, url, login, "opening connection");
        let conn = driver
            .connect(url, login, password)
            .map_err(|e| SqlBridgeError::connection(url, e.to_string()))?;
        if let Err(e) = conn.set_auto_commit(false) {
            let _ = conn.close();
            return Err(SqlBridgeError::connection(
                url,
                format!("cannot disable auto-commit: {e}"),
            ));
        }

        self.state = State::Open(conn);
        self.driver_id = Some(driver_id.to_string());
        self.url = Some(url.to_string());
        Ok(())
    }

    /// [`Session::connect`] from a [`ConnectOptions`] value.
    ///
    /// # Errors
    /// Returns `SqlBridgeError::ConfigError` for incomplete options; otherwise see
    /// [`Session::connect`].
    pub fn connect_with(&mut self, options: &ConnectOptions) -> Result<(), SqlBridgeError> {
        options.validate()?;
        self.connect(
            &options.driver_id,
            &options.url,
            &options.login,
            &options.password,
        )
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    /// URL of the current (or last) connection, empty when never connected.
    #[must_use]
    pub fn url(&self) -> &str {
        self.url.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn driver_id(&self) -> Option<&str> {
        self.driver_id.as_deref()
    }

    /// The raw driver connection, for hosts that need driver-level access.
    #[must_use]
    pub fn connection(&self) -> Option<&dyn DriverConnection> {
        match &self.state {
            State::Open(conn) => Some(conn.as_ref()),
            State::Unconnected | State::Closed => None,
        }
    }

    #[must_use]
    pub fn statements(&self) -> &StatementCache {
        &self.statements
    }

    fn live_connection(&self) -> Result<Option<&dyn DriverConnection>, SqlBridgeError> {
        match &self.state {
            State::Unconnected => Ok(None),
            State::Open(conn) => Ok(Some(conn.as_ref())),
            State::Closed => Err(SqlBridgeError::connection(self.url(), "session is closed")),
        }
    }

    /// Run `op` on the statement for `sql`, taken from (or added to) the cache.
    fn with_statement<T>(
        &self,
        conn: &dyn DriverConnection,
        sql: &str,
        keep: bool,
        op: impl FnOnce(&mut dyn DriverStatement) -> Result<T, SqlBridgeError>,
    ) -> Result<T, SqlBridgeError> {
        let lease = self.statements.acquire(sql, keep, |s| conn.prepare(s))?;
        let outcome = lease
            .handle()
            .lock()
            .and_then(|mut guard| op(&mut **guard));
        let released = self.statements.release(lease);
        let value = outcome?;
        released?;
        Ok(value)
    }

    /// Run `op` on a statement prepared for this call only, closing it afterwards.
    fn with_one_off_statement<T>(
        conn: &dyn DriverConnection,
        sql: &str,
        op: impl FnOnce(&mut dyn DriverStatement) -> Result<T, SqlBridgeError>,
    ) -> Result<T, SqlBridgeError> {
        let mut statement = conn
            .prepare(sql)
            .map_err(|e| SqlBridgeError::prepare(sql, e))?;
        let outcome = op(statement.as_mut());
        let closed = statement
            .close()
            .map_err(|e| SqlBridgeError::close(sql, e));
        let value = outcome?;
        closed?;
        Ok(value)
    }

    /// Run `sql` and materialize every row.
    ///
    /// # Errors
    /// Returns `StatementPrepareError` or `ExecutionError` if the query fails, and
    /// `ConnectionError` on a closed session.
    pub fn query(&self, sql: &str) -> Result<Option<ResultSet>, SqlBridgeError> {
        let Some(conn) = self.live_connection()? else {
            return Ok(None);
        };
        Self::with_one_off_statement(conn, sql, |statement| query_statement(statement, sql))
            .map(Some)
    }

    /// Run `sql` with `binds` and hand back the live cursor. The caller consumes it
    /// lazily and must close it (dropping it closes it too).
    ///
    /// Rows are decoded one at a time as the caller asks for them; whether they are
    /// also fetched on demand is up to the driver. The bundled `SQLite` driver fetches
    /// the whole result when the query runs.
    ///
    /// # Errors
    /// Returns `StatementPrepareError` or `ExecutionError` if the query fails, and
    /// `ConnectionError` on a closed session.
    pub fn raw_query(
        &self,
        sql: &str,
        binds: &[BindValue],
    ) -> Result<Option<LiveCursor>, SqlBridgeError> {
        let Some(conn) = self.live_connection()? else {
            return Ok(None);
        };
        let mut statement = conn
            .prepare(sql)
            .map_err(|e| SqlBridgeError::prepare(sql, e))?;
        let executed = bind_all(statement.as_mut(), binds).and_then(|()| statement.execute_query());
        match executed {
            Ok(cursor) => Ok(Some(LiveCursor::new(sql, cursor, Some(statement)))),
            Err(e) => {
                if let Err(close_err) = statement.close() {
                    debug!(%close_err, sql, "closing statement after failed query");
                }
                Err(SqlBridgeError::execution(sql, e))
            }
        }
    }

    /// Run `sql` with positional `binds` and materialize every row. With `keep` the
    /// prepared statement stays cached for reuse until closed through
    /// [`Session::close_statement`] or [`Session::close_all_statements`].
    ///
    /// # Errors
    /// Returns `StatementPrepareError` or `ExecutionError` if the query fails, and
    /// `ConnectionError` on a closed session.
    pub fn parameterized_query(
        &self,
        sql: &str,
        binds: &[BindValue],
        keep: bool,
    ) -> Result<Option<ResultSet>, SqlBridgeError> {
        let Some(conn) = self.live_connection()? else {
            return Ok(None);
        };
        self.with_statement(conn, sql, keep, |statement| {
            bind_all(statement, binds).map_err(|e| SqlBridgeError::execution(sql, e))?;
            query_statement(statement, sql)
        })
        .map(Some)
    }

    /// Read the first column of the first row of `sql` as a LOB.
    ///
    /// # Errors
    /// Returns `StatementPrepareError` or `ExecutionError` if the query fails before any
    /// LOB data is read, and `ConnectionError` on a closed session.
    pub fn scalar_lob_query(&self, sql: &str) -> Result<Option<LobValue>, SqlBridgeError> {
        let Some(conn) = self.live_connection()? else {
            return Ok(None);
        };
        Self::with_one_off_statement(conn, sql, |statement| {
            let mut cursor = statement
                .execute_query()
                .map_err(|e| SqlBridgeError::execution(sql, e))?;
            let read = read_scalar_lob(cursor.as_mut());
            let closed = cursor.close();
            let value = read.map_err(|e| SqlBridgeError::execution(sql, e))?;
            closed.map_err(|e| SqlBridgeError::execution(sql, e))?;
            Ok(value)
        })
    }

    /// Execute `sql` and return the rows affected.
    ///
    /// # Errors
    /// Returns `ExecutionError` if execution fails, and `ConnectionError` on a closed
    /// session.
    pub fn update(&self, sql: &str) -> Result<Option<u64>, SqlBridgeError> {
        let Some(conn) = self.live_connection()? else {
            return Ok(None);
        };
        conn.execute_update(sql)
            .map(Some)
            .map_err(|e| SqlBridgeError::execution(sql, e))
    }

    /// Execute `sql` with positional `binds` and return the rows affected.
    ///
    /// # Errors
    /// Returns `StatementPrepareError` or `ExecutionError` if execution fails, and
    /// `ConnectionError` on a closed session.
    pub fn parameterized_update(
        &self,
        sql: &str,
        binds: &[BindValue],
        keep: bool,
    ) -> Result<Option<u64>, SqlBridgeError> {
        let Some(conn) = self.live_connection()? else {
            return Ok(None);
        };
        self.with_statement(conn, sql, keep, |statement| {
            bind_all(statement, binds)
                .and_then(|()| statement.execute_update())
                .map_err(|e| SqlBridgeError::execution(sql, e))
        })
        .map(Some)
    }

    /// Execute `sql` once per tuple, flushing every `chunk_size` tuples (zero means
    /// 1000). Nothing is committed; a failed flush leaves earlier chunks applied in the
    /// open transaction for the caller to commit or roll back.
    ///
    /// # Errors
    /// Returns `StatementPrepareError` or `ExecutionError` if any chunk fails, and
    /// `ConnectionError` on a closed session.
    pub fn batch_update(
        &self,
        sql: &str,
        tuples: &[Vec<BindValue>],
        chunk_size: usize,
        keep: bool,
    ) -> Result<Option<u64>, SqlBridgeError> {
        let Some(conn) = self.live_connection()? else {
            return Ok(None);
        };
        self.with_statement(conn, sql, keep, |statement| {
            BatchJob::new(tuples, chunk_size)
                .execute(statement)
                .map_err(|e| SqlBridgeError::execution(sql, e))
        })
        .map(Some)
    }

    /// Execute `sql` with one LOB bound at position 1.
    ///
    /// # Errors
    /// Returns `StatementPrepareError` or `ExecutionError` if execution fails, and
    /// `ConnectionError` on a closed session.
    pub fn lob_update(&self, sql: &str, lob: &LobValue) -> Result<Option<u64>, SqlBridgeError> {
        self.multi_lob_update(sql, slice::from_ref(lob))
    }

    /// Execute `sql` with each LOB bound at its position.
    ///
    /// # Errors
    /// Returns `StatementPrepareError` or `ExecutionError` if execution fails, and
    /// `ConnectionError` on a closed session.
    pub fn multi_lob_update(
        &self,
        sql: &str,
        lobs: &[LobValue],
    ) -> Result<Option<u64>, SqlBridgeError> {
        let Some(conn) = self.live_connection()? else {
            return Ok(None);
        };
        Self::with_one_off_statement(conn, sql, |statement| {
            lobs.iter()
                .enumerate()
                .try_for_each(|(offset, lob)| write_lob(statement, offset + 1, lob))
                .and_then(|()| statement.execute_update())
                .map_err(|e| SqlBridgeError::execution(sql, e))
        })
        .map(Some)
    }

    /// # Errors
    /// Returns `ExecutionError` if the commit fails or the session is closed.
    pub fn commit(&self) -> Result<(), SqlBridgeError> {
        match &self.state {
            State::Unconnected => Ok(()),
            State::Closed => Err(SqlBridgeError::execution(
                "COMMIT",
                DriverError::new("connection is closed"),
            )),
            State::Open(conn) => conn.commit().map_err(|e| {
                debug!(url = self.url(), error = %e, "error while committing");
                SqlBridgeError::execution("COMMIT", e)
            }),
        }
    }

    /// # Errors
    /// Returns `ExecutionError` if the rollback fails or the session is closed.
    pub fn rollback(&self) -> Result<(), SqlBridgeError> {
        match &self.state {
            State::Unconnected => Ok(()),
            State::Closed => Err(SqlBridgeError::execution(
                "ROLLBACK",
                DriverError::new("connection is closed"),
            )),
            State::Open(conn) => conn.rollback().map_err(|e| {
                error!(url = self.url(), error = %e, "error while rolling back");
                SqlBridgeError::execution("ROLLBACK", e)
            }),
        }
    }

    /// SQL text of every cached statement.
    #[must_use]
    pub fn list_cached_statements(&self) -> Vec<String> {
        self.statements.list_keys()
    }

    /// Close and evict the cached statement for exactly `sql`.
    ///
    /// # Errors
    /// Returns `StatementCloseError` if the driver fails to close it.
    pub fn close_statement(&self, sql: &str) -> Result<(), SqlBridgeError> {
        self.statements.close_statement(sql)
    }

    /// Close and evict every cached statement.
    ///
    /// # Errors
    /// Returns the first `StatementCloseError`; every statement is still attempted.
    pub fn close_all_statements(&self) -> Result<(), SqlBridgeError> {
        self.statements.close_all()
    }

    /// Close every cached statement, then the connection. Safe to call on a session
    /// that is unconnected or already closed.
    ///
    /// # Errors
    /// Returns the first `StatementCloseError`, or `ConnectionError` if the connection
    /// fails to close. The session is closed either way.
    pub fn close(&mut self) -> Result<(), SqlBridgeError> {
        let conn = match std::mem::replace(&mut self.state, State::Closed) {
            State::Open(conn) => conn,
            State::Unconnected => {
                self.state = State::Unconnected;
                return Ok(());
            }
            State::Closed => return Ok(()),
        };
        let statements = self.statements.close_all();
        let connection = conn
            .close()
            .map_err(|e| SqlBridgeError::connection(self.url(), e.to_string()));
        debug!(url = self.url(), "session closed");
        statements.and(connection)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_connected() {
            if let Err(err) = self.close() {
                debug!(%err, "error closing session on drop");
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            State::Unconnected => "unconnected",
            State::Open(_) => "open",
            State::Closed => "closed",
        };
        f.debug_struct("Session")
            .field("state", &state)
            .field("driver_id", &self.driver_id)
            .field("url", &self.url)
            .field("statements", &self.statements.list_keys())
            .finish()
    }
}

fn bind_all(statement: &mut dyn DriverStatement, binds: &[BindValue]) -> Result<(), DriverError> {
    statement.clear_parameters();
    for (offset, value) in binds.iter().enumerate() {
        statement.bind(offset + 1, value)?;
    }
    Ok(())
}

fn query_statement(
    statement: &mut dyn DriverStatement,
    sql: &str,
) -> Result<ResultSet, SqlBridgeError> {
    let mut cursor = statement
        .execute_query()
        .map_err(|e| SqlBridgeError::execution(sql, e))?;
    let materialized = materialize(cursor.as_mut());
    let closed = cursor.close();
    let result_set = materialized.map_err(|e| SqlBridgeError::execution(sql, e))?;
    closed.map_err(|e| SqlBridgeError::execution(sql, e))?;
    Ok(result_set)
}
