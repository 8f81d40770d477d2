use std::io::{self, Write};

use serde::Serialize;

/// Result of writing to an output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputStatus {
    /// Write completed.
    Written,
    /// Stream was closed by the reader.
    BrokenPipe,
}

fn map_result(result: io::Result<()>) -> io::Result<OutputStatus> {
    match result {
        Ok(()) => Ok(OutputStatus::Written),
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(OutputStatus::BrokenPipe),
        Err(error) => Err(error),
    }
}

fn write_line(mut handle: impl Write, text: &str) -> io::Result<OutputStatus> {
    map_result(
        handle
            .write_all(text.as_bytes())
            .and_then(|_| handle.write_all(b"\n"))
            .and_then(|_| handle.flush()),
    )
}

/// Writes text and a newline to stdout.
pub(crate) fn stdout_line(text: &str) -> io::Result<OutputStatus> {
    write_line(io::stdout().lock(), text)
}

/// Writes pretty JSON and a newline to stdout.
pub(crate) fn stdout_json<T: Serialize>(value: &T) -> io::Result<OutputStatus> {
    let encoded = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    stdout_line(&encoded)
}

/// Writes text and a newline to stderr.
pub(crate) fn stderr_line(text: &str) -> io::Result<OutputStatus> {
    write_line(io::stderr().lock(), text)
}
