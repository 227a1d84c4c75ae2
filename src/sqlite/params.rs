use std::cell::RefCell;
use std::fmt::Write;

use rusqlite::types::Value;

use crate::types::BindValue;

// Thread-local buffer for efficient timestamp formatting
thread_local! {
    static TIMESTAMP_BUF: RefCell<String> = RefCell::new(String::with_capacity(32));
}

/// Convert a bind value into a rusqlite `Value`.
#[must_use]
pub fn bind_value_to_sqlite(value: &BindValue) -> Value {
    match value {
        BindValue::Int(i) => Value::Integer(*i),
        BindValue::Float(f) => Value::Real(*f),
        BindValue::Text(s) => Value::Text(s.clone()),
        BindValue::Bool(b) => Value::Integer(i64::from(*b)),
        BindValue::Timestamp(dt) => TIMESTAMP_BUF.with(|buf| {
            let mut borrow = buf.borrow_mut();
            borrow.clear();
            // Writing into a String cannot fail.
            let _ = write!(borrow, "{}", dt.format("%F %T%.f"));
            Value::Text(borrow.clone())
        }),
        BindValue::Null => Value::Null,
        BindValue::Json(jval) => Value::Text(jval.to_string()),
        BindValue::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}
