//! Prepared-statement handles and the per-session statement cache.
//!
//! The cache maps exact SQL text to one live handle. It is the only structure in a
//! session meant to be used from several threads at once. A handle itself is not
//! reentrant: while one caller executes it, another caller trying to execute it gets
//! an error instead of waiting.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use tracing::debug;

use crate::driver::DriverStatement;
use crate::error::{DriverError, SqlBridgeError};

/// One live prepared statement, keyed by the SQL text used to prepare it.
pub struct StatementHandle {
    sql: String,
    statement: Mutex<Box<dyn DriverStatement>>,
}

impl StatementHandle {
    #[must_use]
    pub fn new(sql: impl Into<String>, statement: Box<dyn DriverStatement>) -> Self {
        Self {
            sql: sql.into(),
            statement: Mutex::new(statement),
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Take exclusive use of the statement for one execution.
    ///
    /// # Errors
    /// Returns `SqlBridgeError::ExecutionError` if another caller is executing this
    /// statement right now.
    pub fn lock(&self) -> Result<MutexGuard<'_, Box<dyn DriverStatement>>, SqlBridgeError> {
        match self.statement.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => Err(SqlBridgeError::execution(
                &self.sql,
                DriverError::new("statement is busy; a prepared statement serves one caller at a time"),
            )),
        }
    }

    /// Close the underlying statement.
    ///
    /// # Errors
    /// Returns `SqlBridgeError::StatementCloseError` if the driver fails to close it.
    pub fn close(&self) -> Result<(), SqlBridgeError> {
        let mut guard = match self.statement.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .close()
            .map_err(|e| SqlBridgeError::close(&self.sql, e))
    }
}

impl std::fmt::Debug for StatementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementHandle")
            .field("sql", &self.sql)
            .finish_non_exhaustive()
    }
}

/// A handle obtained from [`StatementCache::acquire`], to be given back through
/// [`StatementCache::release`].
#[derive(Debug)]
pub struct StatementLease {
    handle: Arc<StatementHandle>,
    cached: bool,
}

impl StatementLease {
    #[must_use]
    pub fn handle(&self) -> &Arc<StatementHandle> {
        &self.handle
    }

    /// Whether the handle lives in the cache (and so outlives this lease).
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cached
    }
}

/// Concurrency-safe map from exact SQL text to a cached statement handle.
#[derive(Debug, Default)]
pub struct StatementCache {
    entries: Mutex<HashMap<String, Arc<StatementHandle>>>,
}

impl StatementCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Arc<StatementHandle>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Return the cached handle for `sql`, or prepare a new one with `prepare`.
    ///
    /// A new handle is inserted into the cache when `keep` is set. If another caller
    /// cached the same SQL while this one was preparing, the cached handle wins and the
    /// freshly prepared statement is closed.
    ///
    /// # Errors
    /// Returns `SqlBridgeError::StatementPrepareError` if `prepare` fails.
    pub fn acquire<F>(&self, sql: &str, keep: bool, prepare: F) -> Result<StatementLease, SqlBridgeError>
    where
        F: FnOnce(&str) -> Result<Box<dyn DriverStatement>, DriverError>,
    {
        if let Some(handle) = self.entries().get(sql) {
            return Ok(StatementLease {
                handle: Arc::clone(handle),
                cached: true,
            });
        }

        let statement = prepare(sql).map_err(|e| SqlBridgeError::prepare(sql, e))?;
        let handle = Arc::new(StatementHandle::new(sql, statement));
        if !keep {
            return Ok(StatementLease {
                handle,
                cached: false,
            });
        }

        let mut entries = self.entries();
        match entries.entry(sql.to_string()) {
            Entry::Occupied(existing) => {
                let winner = Arc::clone(existing.get());
                drop(entries);
                if let Err(err) = handle.close() {
                    debug!(%err, "closing duplicate prepared statement");
                }
                Ok(StatementLease {
                    handle: winner,
                    cached: true,
                })
            }
            Entry::Vacant(slot) => {
                debug!(sql, "caching prepared statement");
                slot.insert(Arc::clone(&handle));
                Ok(StatementLease {
                    handle,
                    cached: true,
                })
            }
        }
    }

    /// Give a lease back. Handles that are not cached are closed here; cached ones stay
    /// open until closed through the cache.
    ///
    /// # Errors
    /// Returns `SqlBridgeError::StatementCloseError` if closing an uncached handle fails.
    pub fn release(&self, lease: StatementLease) -> Result<(), SqlBridgeError> {
        if lease.cached {
            Ok(())
        } else {
            lease.handle.close()
        }
    }

    /// Close and evict the handle cached for exactly `sql`. Unknown SQL is a no-op.
    ///
    /// # Errors
    /// Returns `SqlBridgeError::StatementCloseError` if the driver fails to close it. The
    /// entry is evicted either way.
    pub fn close_statement(&self, sql: &str) -> Result<(), SqlBridgeError> {
        let removed = self.entries().remove(sql);
        match removed {
            Some(handle) => {
                debug!(sql, "closing cached statement");
                handle.close()
            }
            None => Ok(()),
        }
    }

    /// Close and evict every cached handle. Every handle is attempted; the first
    /// failure is returned afterwards.
    ///
    /// # Errors
    /// Returns the first `SqlBridgeError::StatementCloseError` encountered.
    pub fn close_all(&self) -> Result<(), SqlBridgeError> {
        let drained: Vec<Arc<StatementHandle>> =
            self.entries().drain().map(|(_, handle)| handle).collect();
        let mut first_error = None;
        for handle in drained {
            if let Err(err) = handle.close() {
                debug!(%err, "cached statement failed to close");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// The SQL text of every cached handle, sorted.
    #[must_use]
    pub fn list_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries().keys().cloned().collect();
        keys.sort();
        keys
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::driver::Cursor;
    use crate::types::BindValue;

    struct CountingStatement {
        closes: Arc<AtomicUsize>,
    }

    impl DriverStatement for CountingStatement {
        fn clear_parameters(&mut self) {}
        fn bind(&mut self, _: usize, _: &BindValue) -> Result<(), DriverError> {
            Ok(())
        }
        fn bind_binary_stream(&mut self, _: usize, _: &mut dyn Read) -> Result<(), DriverError> {
            Ok(())
        }
        fn bind_char_stream(
            &mut self,
            _: usize,
            _: &mut dyn Read,
            _: usize,
        ) -> Result<(), DriverError> {
            Ok(())
        }
        fn add_batch(&mut self) -> Result<(), DriverError> {
            Ok(())
        }
        fn execute_batch(&mut self) -> Result<Vec<i64>, DriverError> {
            Ok(Vec::new())
        }
        fn execute_query(&mut self) -> Result<Box<dyn Cursor>, DriverError> {
            Err(DriverError::new("not a query"))
        }
        fn execute_update(&mut self) -> Result<u64, DriverError> {
            Ok(0)
        }
        fn close(&mut self) -> Result<(), DriverError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn preparer(
        closes: &Arc<AtomicUsize>,
    ) -> impl FnOnce(&str) -> Result<Box<dyn DriverStatement>, DriverError> + '_ {
        move |_| {
            Ok(Box::new(CountingStatement {
                closes: Arc::clone(closes),
            }) as Box<dyn DriverStatement>)
        }
    }

    #[test]
    fn kept_statement_is_shared() {
        let cache = StatementCache::new();
        let closes = Arc::new(AtomicUsize::new(0));
        let first = cache.acquire("SELECT 1", true, preparer(&closes)).unwrap();
        let second = cache
            .acquire("SELECT 1", true, |_| panic!("must not prepare again"))
            .unwrap();
        assert!(Arc::ptr_eq(first.handle(), second.handle()));
        assert!(second.is_cached());
        cache.release(first).unwrap();
        cache.release(second).unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 0);
        assert_eq!(cache.list_keys(), vec!["SELECT 1".to_string()]);
    }

    #[test]
    fn uncached_lease_is_closed_on_release() {
        let cache = StatementCache::new();
        let closes = Arc::new(AtomicUsize::new(0));
        let lease = cache.acquire("SELECT 2", false, preparer(&closes)).unwrap();
        assert!(!lease.is_cached());
        cache.release(lease).unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn cached_handle_survives_a_keep_false_release() {
        let cache = StatementCache::new();
        let closes = Arc::new(AtomicUsize::new(0));
        cache
            .acquire("SELECT 3", true, preparer(&closes))
            .and_then(|lease| cache.release(lease))
            .unwrap();
        let lease = cache.acquire("SELECT 3", false, preparer(&closes)).unwrap();
        assert!(lease.is_cached());
        cache.release(lease).unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn racing_acquirers_share_one_cached_handle() {
        const THREADS: usize = 8;
        let cache = StatementCache::new();
        let closes = Arc::new(AtomicUsize::new(0));
        // every thread misses the cache before any of them inserts
        let barrier = std::sync::Barrier::new(THREADS);

        let leases: Vec<StatementLease> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        cache
                            .acquire("SELECT 5", true, |_| {
                                barrier.wait();
                                Ok(Box::new(CountingStatement {
                                    closes: Arc::clone(&closes),
                                }) as Box<dyn DriverStatement>)
                            })
                            .unwrap()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(cache.list_keys(), vec!["SELECT 5".to_string()]);
        assert_eq!(closes.load(Ordering::SeqCst), THREADS - 1);
        let survivor = Arc::clone(leases[0].handle());
        for lease in leases {
            assert!(lease.is_cached());
            assert!(Arc::ptr_eq(lease.handle(), &survivor));
            cache.release(lease).unwrap();
        }
        assert_eq!(closes.load(Ordering::SeqCst), THREADS - 1);

        std::thread::scope(|scope| {
            scope.spawn(|| cache.list_keys());
            scope.spawn(|| cache.close_statement("SELECT 5"));
            scope.spawn(|| cache.close_all());
        });
        assert!(cache.is_empty());
        assert_eq!(closes.load(Ordering::SeqCst), THREADS);
    }

    #[test]
    fn busy_handle_fails_fast() {
        let closes = Arc::new(AtomicUsize::new(0));
        let handle = StatementHandle::new(
            "SELECT 4",
            Box::new(CountingStatement {
                closes: Arc::clone(&closes),
            }),
        );
        let _guard = handle.lock().unwrap();
        assert!(matches!(
            handle.lock(),
            Err(SqlBridgeError::ExecutionError { .. })
        ));
    }
}
