use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::Value as JsonValue;
use sql_bridge::{BindValue, LobValue};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run SQL through sql-bridge and print JSON results")]
pub(crate) struct Args {
    /// Registered driver id
    #[arg(long, default_value = "sqlite")]
    pub(crate) driver: String,
    /// Connection URL, e.g. `sqlite:app.db` or `sqlite::memory:`
    #[arg(long)]
    pub(crate) url: String,
    #[arg(long, default_value = "")]
    pub(crate) login: String,
    #[arg(long, env = "SQL_BRIDGE_PASSWORD", default_value = "", hide_env_values = true)]
    pub(crate) password: String,
    /// Mirror log output into this file
    #[arg(long)]
    pub(crate) log: Option<PathBuf>,
    #[arg(short, long)]
    pub(crate) verbose: bool,
    /// Roll back instead of committing after a write
    #[arg(long)]
    pub(crate) no_commit: bool,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Run a query and print every row
    Query {
        sql: String,
        /// Positional parameters as JSON values, in order
        #[arg(long = "bind", value_parser = parse_json)]
        binds: Vec<JsonValue>,
    },
    /// Run a statement and print the rows affected
    Update {
        sql: String,
        #[arg(long = "bind", value_parser = parse_json)]
        binds: Vec<JsonValue>,
    },
    /// Run a statement once per tuple read from a JSON file holding an array of arrays
    Batch {
        sql: String,
        #[arg(long)]
        tuples: PathBuf,
        /// Tuples per flush; 0 uses the default
        #[arg(long, default_value_t = 0)]
        chunk_size: usize,
    },
    /// Read the first column of the first row as a LOB
    LobRead { sql: String },
    /// Bind the contents of a file as a LOB at position 1
    LobWrite {
        sql: String,
        #[arg(long)]
        file: PathBuf,
        /// Bind as text instead of bytes
        #[arg(long)]
        text: bool,
    },
}

fn parse_json(raw: &str) -> Result<JsonValue, String> {
    serde_json::from_str(raw).or_else(|_| Ok(JsonValue::String(raw.to_string())))
}

pub(crate) fn to_binds(values: &[JsonValue]) -> Vec<BindValue> {
    values.iter().cloned().map(BindValue::from).collect()
}

pub(crate) fn read_tuples(path: &Path) -> Result<Vec<Vec<BindValue>>, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let rows: Vec<Vec<JsonValue>> =
        serde_json::from_str(&raw).map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(rows.iter().map(|row| to_binds(row)).collect())
}

pub(crate) fn read_lob(path: &Path, text: bool) -> Result<LobValue, String> {
    if text {
        std::fs::read_to_string(path)
            .map(LobValue::Text)
            .map_err(|e| format!("{}: {e}", path.display()))
    } else {
        std::fs::read(path)
            .map(LobValue::Bytes)
            .map_err(|e| format!("{}: {e}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_arguments_fall_back_to_text() {
        assert_eq!(parse_json("42").unwrap(), serde_json::json!(42));
        assert_eq!(parse_json("hello").unwrap(), serde_json::json!("hello"));
        assert_eq!(
            to_binds(&[serde_json::json!(1), serde_json::json!(null)]),
            vec![BindValue::Int(1), BindValue::Null]
        );
    }

    #[test]
    fn parses_subcommands() {
        let args = Args::parse_from([
            "sql-bridge",
            "--url",
            "sqlite::memory:",
            "query",
            "SELECT ?",
            "--bind",
            "7",
        ]);
        assert_eq!(args.driver, "sqlite");
        match args.command {
            Command::Query { sql, binds } => {
                assert_eq!(sql, "SELECT ?");
                assert_eq!(binds, vec![serde_json::json!(7)]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
