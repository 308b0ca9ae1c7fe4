//! Error taxonomy for pipespawn.
//!
//! Construction and resolution problems are typed variants surfaced
//! immediately; nonzero exits are reported through the completion record
//! and only become errors via `Completed::check` or `iterate`.

use std::io;
use std::time::Duration;
use thiserror::Error;

pub type SpawnResult<T> = Result<T, SpawnError>;

#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("empty command template")]
    EmptyTemplate,

    #[error("template {template:?} expects more arguments than the {supplied} supplied")]
    MissingArgs { template: String, supplied: usize },

    #[error("unsupported placeholder {found:?} in template {template:?}")]
    BadPlaceholder { template: String, found: String },

    #[error("{mode} is not a valid mode for {stream}")]
    InvalidMode { stream: &'static str, mode: String },

    #[error("stdout and stderr cannot both feed the next stage")]
    DoublePipe,

    #[error("more than one interactive stream would deadlock")]
    MultipleInteractive,

    #[error("stdout is already redirected and cannot be chained into another command")]
    PipeCollision,

    #[error("stream set to pipe mode but never wired to an adjacent command")]
    UnwiredPipe,

    #[error("a chained command's stdin belongs to the preceding stage")]
    ChainedStdin,

    #[error("template {0:?} contains no '|' separator")]
    NotAPipeline(String),

    #[error("preceding stage exposed no pipe end")]
    MissingPipeEnd,

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("command failed: {argv:?} (exit={code})")]
    Failed {
        argv: Vec<String>,
        code: i32,
        stdout: Option<Vec<u8>>,
        stderr: Option<Vec<u8>>,
    },

    #[error("command killed by signal {signal}: {argv:?}")]
    Signaled {
        argv: Vec<String>,
        signal: i32,
        stdout: Option<Vec<u8>>,
        stderr: Option<Vec<u8>>,
    },

    #[error("stdio worker thread panicked")]
    WorkerPanic,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("signal delivery failed: {0}")]
    Nix(#[from] nix::errno::Errno),
}
