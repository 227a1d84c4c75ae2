use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

/// Log output goes to stderr, leaving stdout to the command result. With a path, every
/// line is also appended to that file.
pub(crate) fn log_writer(path: Option<&Path>) -> io::Result<BoxMakeWriter> {
    Ok(match path {
        Some(path) => {
            let file = File::options().create(true).append(true).open(path)?;
            BoxMakeWriter::new(io::stderr.and(Mutex::new(file)))
        }
        None => BoxMakeWriter::new(io::stderr),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tracing_subscriber::fmt::writer::MakeWriter;

    use super::*;

    #[test]
    fn mirrors_lines_into_the_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.log");
        let writer = log_writer(Some(&path)).unwrap();
        writer.make_writer().write_all(b"connected\n").unwrap();
        writer.make_writer().write_all(b"closed\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "connected\nclosed\n");
    }

    #[test]
    fn unwritable_log_path_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(log_writer(Some(&dir.path().join("missing").join("x.log"))).is_err());
    }
}
