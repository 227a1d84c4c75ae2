mod args;
mod logging;

use clap::Parser;
use serde_json::json;
use sql_bridge::{ConnectOptions, LobValue, Session};
use tracing::Level;

use crate::args::{Args, Command, read_lob, read_tuples, to_binds};
use crate::logging::log_writer;

fn main() {
    let args = Args::parse();
    let writer = log_writer(args.log.as_deref()).unwrap_or_else(|err| {
        eprintln!("failed to open log file: {err}");
        std::process::exit(1);
    });

    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_target(false)
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    match run(args) {
        Ok(output) => println!("{output}"),
        Err(err) => {
            tracing::error!("{err}");
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<serde_json::Value, String> {
    let options = ConnectOptions::builder(&args.driver, &args.url)
        .login(&args.login)
        .password(&args.password)
        .finish();
    let mut session = Session::new();
    session.connect_with(&options).map_err(|e| e.to_string())?;

    let outcome = execute(&session, args.command);
    let finished = match (&outcome, args.no_commit) {
        (Ok(_), false) => session.commit(),
        _ => session.rollback(),
    };
    let closed = session.close();

    let output = outcome?;
    finished.map_err(|e| e.to_string())?;
    closed.map_err(|e| e.to_string())?;
    Ok(output)
}

fn execute(session: &Session, command: Command) -> Result<serde_json::Value, String> {
    match command {
        Command::Query { sql, binds } => {
            let rows = session
                .parameterized_query(&sql, &to_binds(&binds), false)
                .map_err(|e| e.to_string())?;
            serde_json::to_value(rows).map_err(|e| e.to_string())
        }
        Command::Update { sql, binds } => {
            let affected = session
                .parameterized_update(&sql, &to_binds(&binds), false)
                .map_err(|e| e.to_string())?;
            Ok(json!({ "affected": affected }))
        }
        Command::Batch {
            sql,
            tuples,
            chunk_size,
        } => {
            let tuples = read_tuples(&tuples)?;
            let affected = session
                .batch_update(&sql, &tuples, chunk_size, false)
                .map_err(|e| e.to_string())?;
            Ok(json!({ "affected": affected, "tuples": tuples.len() }))
        }
        Command::LobRead { sql } => {
            let lob = session.scalar_lob_query(&sql).map_err(|e| e.to_string())?;
            Ok(match lob {
                Some(LobValue::Text(text)) => json!({ "text": text }),
                Some(LobValue::Bytes(bytes)) => json!({ "bytes": bytes }),
                None => serde_json::Value::Null,
            })
        }
        Command::LobWrite { sql, file, text } => {
            let lob = read_lob(&file, text)?;
            let affected = session
                .lob_update(&sql, &lob)
                .map_err(|e| e.to_string())?;
            Ok(json!({ "affected": affected }))
        }
    }
}
