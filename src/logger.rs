//! Process wide logging setup.
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::Arc;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::FmtSubscriber;

use crate::{Result, WhosonError};

/// Where log lines go
#[derive(Debug, Clone)]
pub enum LogSink {
    /// standard output
    Stdout,
    /// standard error
    Stderr,
    /// nowhere
    Discard,
    /// a file opened for appending
    File(Arc<File>),
}

impl LogSink {
    /// `stdout`, `stderr` and `discard` name the sinks of the same name; anything else is a file
    /// path, created if missing and appended to.
    pub fn open(output: &str) -> Result<Self> {
        let sink = match output {
            "stdout" => LogSink::Stdout,
            "stderr" => LogSink::Stderr,
            "discard" => LogSink::Discard,
            path => LogSink::File(Arc::new(OpenOptions::new().create(true).append(true).open(path)?)),
        };
        Ok(sink)
    }

    fn is_terminal(&self) -> bool {
        matches!(self, LogSink::Stdout | LogSink::Stderr)
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogSink::Stdout => io::stdout().write(buf),
            LogSink::Stderr => io::stderr().write(buf),
            LogSink::Discard => Ok(buf.len()),
            LogSink::File(file) => (&**file).write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogSink::Stdout => io::stdout().flush(),
            LogSink::Stderr => io::stderr().flush(),
            LogSink::Discard => Ok(()),
            LogSink::File(file) => (&**file).flush(),
        }
    }
}

/// maps a configured level name to a filter. `dpanic`, `panic` and `fatal` only let errors
/// through.
///
/// # Errors
/// `WhosonError::Config` for an unknown level
pub fn level_filter(level: &str) -> Result<LevelFilter> {
    let filter = match level {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" | "dpanic" | "panic" | "fatal" => LevelFilter::ERROR,
        other => return Err(WhosonError::Config(format!("\"--loglevel {}\" not support loglevel", other))),
    };
    Ok(filter)
}

/// installs the global tracing subscriber writing to `output` at `level`
///
/// # Errors
/// an unknown level, an output file that cannot be opened, or a subscriber already installed
pub fn init(output: &str, level: &str) -> Result<()> {
    let filter = level_filter(level)?;
    let sink = LogSink::open(output)?;
    let subscriber = FmtSubscriber::builder()
        .with_max_level(filter)
        .with_ansi(sink.is_terminal())
        .with_writer(move || sink.clone())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| WhosonError::StringErr(format!("setting tracing default subscriber failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn levels() {
        assert_eq!(level_filter("debug").unwrap(), LevelFilter::DEBUG);
        assert_eq!(level_filter("fatal").unwrap(), LevelFilter::ERROR);
        assert!(level_filter("chatty").is_err());
    }

    #[test]
    fn file_sink_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("whoson.log");
        let path = path.to_str().unwrap();

        let mut sink = LogSink::open(path).unwrap();
        sink.write_all(b"one\n").unwrap();
        let mut sink = LogSink::open(path).unwrap();
        sink.write_all(b"two\n").unwrap();
        sink.flush().unwrap();

        assert_eq!(fs::read_to_string(path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn discard_swallows_everything() {
        let mut sink = LogSink::open("discard").unwrap();
        assert_eq!(sink.write(b"gone").unwrap(), 4);
    }
}
