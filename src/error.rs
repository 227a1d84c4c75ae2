use std::fmt;

use thiserror::Error;

/// Failure reported by a driver, carrying its native code (when it has one) and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub code: Option<i64>,
    pub message: String,
}

impl DriverError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for DriverError {}

impl From<std::io::Error> for DriverError {
    fn from(err: std::io::Error) -> Self {
        DriverError::new(format!("stream error: {err}"))
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DriverError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(ffi_err, _) => {
                DriverError::with_code(i64::from(ffi_err.extended_code), err.to_string())
            }
            _ => DriverError::new(err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum SqlBridgeError {
    #[error("Connection error ({url}): {message}")]
    ConnectionError { url: String, message: String },

    #[error("Statement prepare error in `{sql}`: {source}")]
    StatementPrepareError {
        sql: String,
        #[source]
        source: DriverError,
    },

    #[error("SQL execution error in `{sql}`: {source}")]
    ExecutionError {
        sql: String,
        #[source]
        source: DriverError,
    },

    #[error("Statement close error for `{sql}`: {source}")]
    StatementCloseError {
        sql: String,
        #[source]
        source: DriverError,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl SqlBridgeError {
    pub(crate) fn connection(url: &str, message: impl Into<String>) -> Self {
        SqlBridgeError::ConnectionError {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn prepare(sql: &str, source: DriverError) -> Self {
        SqlBridgeError::StatementPrepareError {
            sql: sql.to_string(),
            source,
        }
    }

    pub(crate) fn execution(sql: &str, source: DriverError) -> Self {
        SqlBridgeError::ExecutionError {
            sql: sql.to_string(),
            source,
        }
    }

    pub(crate) fn close(sql: &str, source: DriverError) -> Self {
        SqlBridgeError::StatementCloseError {
            sql: sql.to_string(),
            source,
        }
    }

    /// The underlying driver error, when this failure came from the driver.
    #[must_use]
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            SqlBridgeError::StatementPrepareError { source, .. }
            | SqlBridgeError::ExecutionError { source, .. }
            | SqlBridgeError::StatementCloseError { source, .. } => Some(source),
            SqlBridgeError::ConnectionError { .. } | SqlBridgeError::ConfigError(_) => None,
        }
    }
}

/// Which kind of large object failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobKind {
    Character,
    Binary,
}

impl fmt::Display for LobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LobKind::Character => f.write_str("character"),
            LobKind::Binary => f.write_str("binary"),
        }
    }
}

/// A single LOB field that could not be read.
///
/// Never returned to callers: the materializer logs it and stores `Value::Null`.
#[derive(Debug, Error)]
#[error("problem reading {kind} LOB in column `{column}`: {source}")]
pub struct FieldDecodeWarning {
    pub column: String,
    pub kind: LobKind,
    #[source]
    pub source: DriverError,
}
