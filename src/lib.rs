//! Shell-style process pipelines with explicit stream redirection.
//!
//! A [`Command`] describes one external process built from a
//! whitespace-tokenized template; [`Pipeline`] chains two or more of
//! them stdout-to-stdin. Each stdio stream resolves to exactly one
//! [`StreamMode`]; captured output and eager input run on background
//! threads so the foreground can block on exit without deadlocking on a
//! full pipe buffer.
//!
//! Dropping a started stage does not kill the process; terminate or
//! kill explicitly first if cleanup on drop is wanted.

pub mod argv;
pub mod cli;
pub mod command;
pub mod completed;
pub mod errors;
pub mod logging;
pub mod mode;
pub mod pipeline;
pub mod runnable;

pub use command::Command;
pub use completed::Completed;
pub use errors::{SpawnError, SpawnResult};
pub use mode::StreamMode;
pub use pipeline::Pipeline;
pub use runnable::{OutputLines, Runnable, Stage};

pub use nix::sys::signal::Signal;
