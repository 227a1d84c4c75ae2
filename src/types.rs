use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// A single column value as handed to the host.
///
/// The variant set is closed: every column of every record resolves to exactly one of
/// these, whatever the driver reported.
/// ```rust
/// use sql_bridge::prelude::*;
///
/// let v = Value::Number(1.5);
/// assert_eq!(serde_json::to_string(&v).unwrap(), "1.5");
/// assert_eq!(serde_json::to_string(&Value::Null).unwrap(), "null");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL, or a LOB field that could not be read
    Null,
    /// Numeric family (numeric, decimal, double, float)
    Number(f64),
    /// Character data and the string form of every other type
    Text(String),
    /// Binary large objects and binary columns
    Bytes(Vec<u8>),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        if let Value::Number(n) = self {
            Some(*n)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(s) = self {
            Some(s)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        if let Value::Bytes(b) = self {
            Some(b)
        } else {
            None
        }
    }
}

/// Positional bind value for parameterized statements.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value, bound as its text form
    Json(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl BindValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Host values usually arrive as JSON; scalars map onto their natural bind type and
/// containers are bound as JSON text.
impl From<JsonValue> for BindValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => BindValue::Null,
            JsonValue::Bool(b) => BindValue::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => BindValue::Int(i),
                None => n.as_f64().map_or(BindValue::Null, BindValue::Float),
            },
            JsonValue::String(s) => BindValue::Text(s),
            other @ (JsonValue::Array(_) | JsonValue::Object(_)) => BindValue::Json(other),
        }
    }
}

impl From<i64> for BindValue {
    fn from(value: i64) -> Self {
        BindValue::Int(value)
    }
}

impl From<f64> for BindValue {
    fn from(value: f64) -> Self {
        BindValue::Float(value)
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        BindValue::Text(value.to_string())
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        BindValue::Text(value)
    }
}

impl From<Vec<u8>> for BindValue {
    fn from(value: Vec<u8>) -> Self {
        BindValue::Blob(value)
    }
}

/// Payload for a LOB write, and the result of a scalar LOB read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LobValue {
    Text(String),
    Bytes(Vec<u8>),
}

impl From<String> for LobValue {
    fn from(value: String) -> Self {
        LobValue::Text(value)
    }
}

impl From<&str> for LobValue {
    fn from(value: &str) -> Self {
        LobValue::Text(value.to_string())
    }
}

impl From<Vec<u8>> for LobValue {
    fn from(value: Vec<u8>) -> Self {
        LobValue::Bytes(value)
    }
}

static INTEGER_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:BIG|SMALL|TINY|MEDIUM)?INT(?:EGER|[248])?\b")
        .expect("integer type pattern is valid")
});

/// Declared SQL type of a result column, as reported by cursor metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlType {
    Numeric,
    Decimal,
    Double,
    Float,
    Integer,
    Boolean,
    Varchar,
    Clob,
    LongVarchar,
    Blob,
    Binary,
    LongVarbinary,
    /// A declared type this crate has no family for
    Other(String),
    /// No declared type (expressions, aggregates)
    Unknown,
}

/// How a column is decoded into a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Number,
    CharacterLob,
    BinaryLob,
    Plain,
}

impl SqlType {
    #[must_use]
    pub fn family(&self) -> TypeFamily {
        match self {
            SqlType::Numeric | SqlType::Decimal | SqlType::Double | SqlType::Float => {
                TypeFamily::Number
            }
            SqlType::Clob | SqlType::LongVarchar => TypeFamily::CharacterLob,
            SqlType::Blob | SqlType::Binary | SqlType::LongVarbinary => TypeFamily::BinaryLob,
            SqlType::Integer
            | SqlType::Boolean
            | SqlType::Varchar
            | SqlType::Other(_)
            | SqlType::Unknown => TypeFamily::Plain,
        }
    }

    /// Map a declared column type name onto a type family.
    ///
    /// Matching is case-insensitive and substring based, in the same spirit as SQLite's
    /// affinity rules; the more specific names are checked first.
    #[must_use]
    pub fn from_declared(declared: Option<&str>) -> SqlType {
        let Some(declared) = declared.map(str::trim).filter(|d| !d.is_empty()) else {
            return SqlType::Unknown;
        };
        let upper = declared.to_ascii_uppercase();
        let name = upper.as_str();

        if name.contains("LONGVARBINARY") || name.contains("LONG VARBINARY") {
            SqlType::LongVarbinary
        } else if name.contains("LONGVARCHAR") || name.contains("LONG VARCHAR") {
            SqlType::LongVarchar
        } else if name.contains("CLOB") {
            SqlType::Clob
        } else if name.contains("BLOB") {
            SqlType::Blob
        } else if name.contains("BINARY") {
            SqlType::Binary
        } else if name.contains("NUMERIC") {
            SqlType::Numeric
        } else if name.contains("DECIMAL") {
            SqlType::Decimal
        } else if name.contains("DOUBLE") || name.contains("REAL") {
            SqlType::Double
        } else if name.contains("FLOAT") {
            SqlType::Float
        } else if INTEGER_TYPE.is_match(name) {
            SqlType::Integer
        } else if name.contains("BOOL") {
            SqlType::Boolean
        } else if name.contains("CHAR") || name.contains("TEXT") {
            SqlType::Varchar
        } else {
            SqlType::Other(declared.to_string())
        }
    }
}
