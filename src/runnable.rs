//! Shared contract between a single command and a pipeline.

use crate::command::Command;
use crate::completed::Completed;
use crate::errors::{SpawnError, SpawnResult};
use crate::pipeline::Pipeline;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Write};
use std::os::fd::OwnedFd;
use std::process::ExitStatus;
use std::time::Duration;

/// Common capability set of a runnable stage.
///
/// Implemented by exactly two concrete shapes, [`Command`] and
/// [`Pipeline`], plus the [`Stage`] composite holding either, so a
/// pipeline can be built from either side without runtime type
/// inspection.
pub trait Runnable {
    /// Spawn the underlying process(es) and background I/O threads.
    /// Callable exactly once; eager `input` is written by a background
    /// thread and the write side closed when it is done.
    fn start(&mut self, input: Option<&[u8]>) -> SpawnResult<()>;

    /// Non-blocking status check. `None` while still running. Does not
    /// join background threads, so capture buffers may be incomplete.
    fn poll(&mut self) -> SpawnResult<Option<ExitStatus>>;

    /// Block until exit (bounded by `timeout` if given), join the
    /// background I/O threads, and return the completion record. A
    /// timeout is an error and leaves the process running.
    fn wait(&mut self, timeout: Option<Duration>) -> SpawnResult<Completed>;

    /// Number of streams in interact mode. At most one is allowed across
    /// an entire pipeline; two caller-driven live handles deadlock as
    /// soon as each side blocks on the other.
    fn interactive_streams(&self) -> usize;

    /// Mark this stage's stdout as feeding the next stage.
    fn prepare_pipe(&mut self) -> SpawnResult<()>;

    /// Take the read end connecting this stage to the next. Present only
    /// after `start` on a stage that was chained.
    fn take_pipe_end(&mut self) -> Option<OwnedFd>;

    /// Borrow the live interact-mode stdin handle, if any.
    fn input_handle(&mut self) -> Option<&mut File>;

    /// Take the interact-mode stdin handle. Dropping it closes the
    /// stream, which is how a caller signals end of input.
    fn take_input(&mut self) -> Option<File>;

    /// Take the live interact-mode output handle, if any.
    fn take_output(&mut self) -> Option<File>;

    /// Wrap into the closed composite used as a pipeline's preceding
    /// side.
    fn into_stage(self) -> Stage
    where
        Self: Sized;

    /// Write to the interact-mode stdin and flush immediately.
    fn send(&mut self, data: &[u8]) -> SpawnResult<()> {
        let input = self
            .input_handle()
            .expect("send requires stdin in interact mode");
        input.write_all(data)?;
        input.flush()?;
        Ok(())
    }

    /// `start` followed by `wait`.
    fn run(&mut self, input: Option<&[u8]>, timeout: Option<Duration>) -> SpawnResult<Completed> {
        self.start(input)?;
        self.wait(timeout)
    }

    /// Chain into a pre-configured terminal command, returning a new
    /// pipeline that owns both sides. The receiver's stdout is forced
    /// into pipe mode; the terminal's stdin must be left at its default
    /// since the boundary pipe takes it over.
    fn pipe_command(self, command: Command) -> SpawnResult<Pipeline>
    where
        Self: Sized,
    {
        Pipeline::chain(self.into_stage(), command)
    }

    /// Chain into a new terminal command built from `template`.
    fn pipe(self, template: &str, args: &[&str]) -> SpawnResult<Pipeline>
    where
        Self: Sized,
    {
        self.pipe_command(Command::new(template, args))
    }

    /// `start`, then lazily yield output lines from the interact output
    /// handle; at end of stream, wait and fail on a bad exit. Single
    /// pass, no timeout.
    fn iterate(mut self, input: Option<&[u8]>) -> SpawnResult<OutputLines<Self>>
    where
        Self: Sized,
    {
        self.start(input)?;
        let output = self
            .take_output()
            .expect("iterate requires an output stream in interact mode");
        Ok(OutputLines {
            lines: BufReader::new(output).lines(),
            runner: self,
            finished: false,
        })
    }
}

/// Closed composite of the two runnable shapes.
#[derive(Debug)]
pub enum Stage {
    Command(Command),
    Pipeline(Box<Pipeline>),
}

impl Stage {
    /// First command of the chain; the whole pipeline's stdin lives
    /// there.
    pub(crate) fn first_command_mut(&mut self) -> &mut Command {
        match self {
            Stage::Command(command) => command,
            Stage::Pipeline(pipeline) => pipeline.first_command_mut(),
        }
    }

    /// Visit every command of the chain, first stage onward.
    pub(crate) fn for_each_command(&mut self, f: &mut dyn FnMut(&mut Command)) {
        match self {
            Stage::Command(command) => f(command),
            Stage::Pipeline(pipeline) => pipeline.for_each_command(f),
        }
    }
}

impl Runnable for Stage {
    fn start(&mut self, input: Option<&[u8]>) -> SpawnResult<()> {
        match self {
            Stage::Command(command) => command.start(input),
            Stage::Pipeline(pipeline) => pipeline.start(input),
        }
    }

    fn poll(&mut self) -> SpawnResult<Option<ExitStatus>> {
        match self {
            Stage::Command(command) => command.poll(),
            Stage::Pipeline(pipeline) => pipeline.poll(),
        }
    }

    fn wait(&mut self, timeout: Option<Duration>) -> SpawnResult<Completed> {
        match self {
            Stage::Command(command) => command.wait(timeout),
            Stage::Pipeline(pipeline) => pipeline.wait(timeout),
        }
    }

    fn interactive_streams(&self) -> usize {
        match self {
            Stage::Command(command) => command.interactive_streams(),
            Stage::Pipeline(pipeline) => pipeline.interactive_streams(),
        }
    }

    fn prepare_pipe(&mut self) -> SpawnResult<()> {
        match self {
            Stage::Command(command) => command.prepare_pipe(),
            Stage::Pipeline(pipeline) => pipeline.prepare_pipe(),
        }
    }

    fn take_pipe_end(&mut self) -> Option<OwnedFd> {
        match self {
            Stage::Command(command) => command.take_pipe_end(),
            Stage::Pipeline(pipeline) => pipeline.take_pipe_end(),
        }
    }

    fn input_handle(&mut self) -> Option<&mut File> {
        match self {
            Stage::Command(command) => command.input_handle(),
            Stage::Pipeline(pipeline) => pipeline.input_handle(),
        }
    }

    fn take_input(&mut self) -> Option<File> {
        match self {
            Stage::Command(command) => command.take_input(),
            Stage::Pipeline(pipeline) => pipeline.take_input(),
        }
    }

    fn take_output(&mut self) -> Option<File> {
        match self {
            Stage::Command(command) => command.take_output(),
            Stage::Pipeline(pipeline) => pipeline.take_output(),
        }
    }

    fn into_stage(self) -> Stage {
        self
    }
}

/// Single-pass line iterator produced by [`Runnable::iterate`].
pub struct OutputLines<R: Runnable> {
    runner: R,
    lines: Lines<BufReader<File>>,
    finished: bool,
}

impl<R: Runnable> Iterator for OutputLines<R> {
    type Item = SpawnResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.lines.next() {
            Some(Ok(line)) => Some(Ok(line)),
            Some(Err(err)) => {
                // Same finalization as end of stream: reap the process
                // and join its threads so nothing outlives the error.
                // The read error stays the one surfaced.
                self.finished = true;
                let _ = self.runner.wait(None);
                Some(Err(SpawnError::Io(err)))
            }
            None => {
                // Stream closed: reap the process and fail fast on a bad
                // exit, so a truncated stream is never mistaken for
                // success.
                self.finished = true;
                match self.runner.wait(None).and_then(|done| done.check()) {
                    Ok(()) => None,
                    Err(err) => Some(Err(err)),
                }
            }
        }
    }
}
