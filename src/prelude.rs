//! Convenient imports for common functionality.
//!
//! This module re-exports the types most hosts need to open a session, run statements
//! and read results.

pub use crate::config::{ConnectOptions, ConnectOptionsBuilder};
pub use crate::error::{DriverError, SqlBridgeError};
pub use crate::results::{LiveCursor, Record, ResultSet};
pub use crate::session::Session;
pub use crate::types::{BindValue, LobValue, SqlType, Value};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SQLITE_DRIVER_ID, SqliteOptions};
