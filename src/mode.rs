//! Redirection intents for the three stdio streams.

use std::os::fd::OwnedFd;

/// How one stdio stream of a stage is wired.
///
/// Exactly one mode applies per stream per command. `Pipe` is only
/// meaningful on the boundary between two chained stages; `Handle` binds a
/// caller-supplied descriptor verbatim and is deliberately a separate case
/// rather than a sentinel sharing the others' representation.
#[derive(Debug, Default)]
pub enum StreamMode {
    /// Use the calling process's own matching stream.
    #[default]
    Inherit,
    /// Discard (`/dev/null`).
    Ignore,
    /// Buffer fully in memory; readable from the completion record after
    /// `wait`.
    Capture,
    /// Keep a live handle open for incremental read or write while the
    /// process runs.
    Interact,
    /// Feed the adjacent stage of a pipeline.
    Pipe,
    /// Attach to the calling process's real stdout.
    ToStdout,
    /// Attach to the calling process's real stderr.
    ToStderr,
    /// Read from the calling process's real stdin.
    FromStdin,
    /// Use this descriptor verbatim.
    Handle(OwnedFd),
}
