use std::io::{self, Write};

/// Result of writing to an output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputStatus {
    /// Write completed.
    Written,
    /// Stream was closed by the reader (`colab-gcp-auth secret get ... | head -c 0`).
    BrokenPipe,
}

fn map_result(result: io::Result<()>) -> io::Result<OutputStatus> {
    match result {
        Ok(()) => Ok(OutputStatus::Written),
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(OutputStatus::BrokenPipe),
        Err(error) => Err(error),
    }
}

/// Writes a secret payload to stdout unchanged and flushes.
pub(crate) fn stdout_bytes(bytes: &[u8]) -> io::Result<OutputStatus> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    map_result(handle.write_all(bytes).and_then(|_| handle.flush()))
}

/// Writes one result line (key path, plan, JSON) to stdout.
pub(crate) fn stdout_line(text: &str) -> io::Result<OutputStatus> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    map_result(
        handle
            .write_all(text.as_bytes())
            .and_then(|_| handle.write_all(b"\n"))
            .and_then(|_| handle.flush()),
    )
}

/// Writes a rendered diagnostic to stderr. A closed stderr is not an error.
pub(crate) fn stderr_diagnostic(text: &str) -> io::Result<()> {
    let stderr = io::stderr();
    let mut handle = stderr.lock();
    match map_result(
        handle
            .write_all(text.as_bytes())
            .and_then(|_| handle.write_all(b"\n"))
            .and_then(|_| handle.flush()),
    ) {
        Ok(OutputStatus::Written | OutputStatus::BrokenPipe) => Ok(()),
        Err(error) => Err(error),
    }
}
