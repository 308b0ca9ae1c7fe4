//! Immutable result of a finished stage or pipeline.

use crate::errors::{SpawnError, SpawnResult};
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

/// Completion record: resolved argv, exit status, captured buffers.
///
/// The capture buffers are `Some` only for streams that were in capture
/// mode, and are fully populated by the time `wait` hands this out.
#[derive(Debug, Clone)]
pub struct Completed {
    pub argv: Vec<String>,
    pub status: ExitStatus,
    pub stdout: Option<Vec<u8>>,
    pub stderr: Option<Vec<u8>>,
}

impl Completed {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    /// Raise unless the process exited cleanly.
    ///
    /// Signal deaths get their own variant so callers can branch on
    /// "killed" versus "exited nonzero". Both carry the argv and any
    /// captured output.
    pub fn check(&self) -> SpawnResult<()> {
        if self.status.success() {
            return Ok(());
        }
        if let Some(signal) = self.status.signal() {
            return Err(SpawnError::Signaled {
                argv: self.argv.clone(),
                signal,
                stdout: self.stdout.clone(),
                stderr: self.stderr.clone(),
            });
        }
        Err(SpawnError::Failed {
            argv: self.argv.clone(),
            code: self.status.code().unwrap_or(-1),
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        })
    }
}
