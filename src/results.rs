//! Query results: records, result sets, and the materializer that builds them from a
//! driver cursor.

mod live_cursor;
mod materializer;
mod record;
mod result_set;

pub use live_cursor::LiveCursor;
pub use materializer::{RecordStream, RowDecoder, materialize};
pub use record::Record;
pub use result_set::ResultSet;
