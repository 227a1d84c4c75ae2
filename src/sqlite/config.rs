use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use rusqlite::OpenFlags;

use crate::error::DriverError;

static SQLITE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:jdbc:)?sqlite:(?P<path>[^?]*)(?:\?(?P<query>.*))?$")
        .expect("sqlite url pattern is valid")
});

/// How the database file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
    /// Read-write, creating the file if it does not exist
    #[default]
    ReadWriteCreate,
}

impl OpenMode {
    fn flags(self) -> OpenFlags {
        let base = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        match self {
            OpenMode::ReadOnly => base | OpenFlags::SQLITE_OPEN_READ_ONLY,
            OpenMode::ReadWrite => base | OpenFlags::SQLITE_OPEN_READ_WRITE,
            OpenMode::ReadWriteCreate => {
                base | OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            }
        }
    }
}

/// Options for opening a `SQLite` connection.
///
/// Parsed from URLs of the form `sqlite:<path>[?key=value&...]` (a `jdbc:` prefix is
/// accepted). An empty path or `:memory:` opens an in-memory database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteOptions {
    /// `None` for an in-memory database
    pub db_path: Option<String>,
    pub mode: OpenMode,
    pub busy_timeout: Option<Duration>,
    /// Capacity of rusqlite's prepared-statement cache
    pub cache_capacity: Option<usize>,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: Some(db_path.into()),
            mode: OpenMode::default(),
            busy_timeout: None,
            cache_capacity: None,
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            db_path: None,
            ..Self::new(String::new())
        }
    }

    #[must_use]
    pub fn builder(db_path: impl Into<String>) -> SqliteOptionsBuilder {
        SqliteOptionsBuilder::new(db_path)
    }

    /// Parse a connection URL.
    ///
    /// # Errors
    /// Returns `DriverError` if the URL is not a `SQLite` URL or carries an unknown or
    /// malformed option.
    pub fn from_url(url: &str) -> Result<Self, DriverError> {
        let caps = SQLITE_URL
            .captures(url.trim())
            .ok_or_else(|| DriverError::new(format!("not a sqlite url: `{url}`")))?;
        let path = caps.name("path").map_or("", |m| m.as_str());
        let mut opts = if path.is_empty() || path == ":memory:" {
            Self::in_memory()
        } else {
            Self::new(path)
        };

        let query = caps.name("query").map_or("", |m| m.as_str());
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| DriverError::new(format!("option `{pair}` has no value")))?;
            opts.apply(key, value)?;
        }
        Ok(opts)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), DriverError> {
        match key {
            "mode" => {
                self.mode = match value {
                    "ro" => OpenMode::ReadOnly,
                    "rw" => OpenMode::ReadWrite,
                    "rwc" => OpenMode::ReadWriteCreate,
                    other => {
                        return Err(DriverError::new(format!("unknown open mode `{other}`")));
                    }
                };
            }
            "busy_timeout" => {
                let millis: u64 = value.parse().map_err(|_| {
                    DriverError::new(format!("busy_timeout must be milliseconds, got `{value}`"))
                })?;
                self.busy_timeout = Some(Duration::from_millis(millis));
            }
            "cache_capacity" => {
                let capacity: usize = value.parse().map_err(|_| {
                    DriverError::new(format!("cache_capacity must be a count, got `{value}`"))
                })?;
                self.cache_capacity = Some(capacity);
            }
            other => return Err(DriverError::new(format!("unknown sqlite option `{other}`"))),
        }
        Ok(())
    }

    /// Open a connection with these options.
    ///
    /// # Errors
    /// Returns `DriverError` if the database cannot be opened or configured.
    pub(crate) fn open(&self) -> Result<rusqlite::Connection, DriverError> {
        let conn = match &self.db_path {
            Some(path) => rusqlite::Connection::open_with_flags(path, self.mode.flags())?,
            None => rusqlite::Connection::open_in_memory()?,
        };
        if let Some(timeout) = self.busy_timeout {
            conn.busy_timeout(timeout)?;
        }
        if let Some(capacity) = self.cache_capacity {
            conn.set_prepared_statement_cache_capacity(capacity);
        }
        Ok(conn)
    }
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.opts.mode = mode;
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.opts.busy_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.opts.cache_capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }

    /// Render the options as a connection URL accepted by [`SqliteOptions::from_url`].
    #[must_use]
    pub fn to_url(&self) -> String {
        let opts = &self.opts;
        let mut url = format!("sqlite:{}", opts.db_path.as_deref().unwrap_or(":memory:"));
        let mut query = Vec::new();
        match opts.mode {
            OpenMode::ReadOnly => query.push("mode=ro".to_string()),
            OpenMode::ReadWrite => query.push("mode=rw".to_string()),
            OpenMode::ReadWriteCreate => {}
        }
        if let Some(timeout) = opts.busy_timeout {
            query.push(format!("busy_timeout={}", timeout.as_millis()));
        }
        if let Some(capacity) = opts.cache_capacity {
            query.push(format!("cache_capacity={capacity}"));
        }
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.join("&"));
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_url_with_options() {
        let opts =
            SqliteOptions::from_url("jdbc:sqlite:/tmp/app.db?mode=ro&busy_timeout=250").unwrap();
        assert_eq!(opts.db_path.as_deref(), Some("/tmp/app.db"));
        assert_eq!(opts.mode, OpenMode::ReadOnly);
        assert_eq!(opts.busy_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn memory_urls() {
        assert_eq!(SqliteOptions::from_url("sqlite::memory:").unwrap().db_path, None);
        assert_eq!(SqliteOptions::from_url("sqlite:").unwrap().db_path, None);
    }

    #[test]
    fn rejects_foreign_urls_and_bad_options() {
        assert!(SqliteOptions::from_url("postgres://localhost/db").is_err());
        assert!(SqliteOptions::from_url("sqlite:a.db?mode=wx").is_err());
        assert!(SqliteOptions::from_url("sqlite:a.db?busy_timeout=soon").is_err());
        assert!(SqliteOptions::from_url("sqlite:a.db?colour=blue").is_err());
    }

    #[test]
    fn builder_round_trips_through_url() {
        let builder = SqliteOptions::builder("data.db")
            .mode(OpenMode::ReadWrite)
            .busy_timeout(Duration::from_millis(100))
            .cache_capacity(32);
        let url = builder.to_url();
        assert_eq!(url, "sqlite:data.db?mode=rw&busy_timeout=100&cache_capacity=32");
        assert_eq!(SqliteOptions::from_url(&url).unwrap(), builder.finish());
    }
}
