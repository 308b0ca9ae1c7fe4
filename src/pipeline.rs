//! Chained stages connected stdout-to-stdin.
//!
//! `a | b | c` groups as `(a | b) | c`: the template splits at the last
//! separator and the preceding side recurses. The exit status of the
//! whole chain is the terminal command's, matching shell semantics.

use crate::argv;
use crate::command::Command;
use crate::completed::Completed;
use crate::errors::{SpawnError, SpawnResult};
use crate::mode::StreamMode;
use crate::runnable::{Runnable, Stage};
use std::ffi::OsString;
use std::fs::File;
use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

/// A preceding stage feeding a terminal command.
///
/// Built either from a template containing `|` separators or by chaining
/// any runnable via [`Runnable::pipe`] / [`Runnable::pipe_command`].
/// Each chain step returns a new owning value; stages already handed
/// over are never mutated again from the outside.
#[derive(Debug)]
pub struct Pipeline {
    preceding: Stage,
    terminal: Command,
}

impl Pipeline {
    /// Build from a template containing at least one `|`. Positional
    /// args are allocated to the preceding side first, in template
    /// order.
    pub fn new(template: &str, args: &[&str]) -> SpawnResult<Pipeline> {
        let (head, tail) = template
            .rsplit_once('|')
            .ok_or_else(|| SpawnError::NotAPipeline(template.to_string()))?;
        let split = argv::placeholder_count(head).min(args.len());
        let (head_args, tail_args) = args.split_at(split);
        let preceding = if head.contains('|') {
            Stage::Pipeline(Box::new(Pipeline::new(head, head_args)?))
        } else {
            Stage::Command(Command::new(head, head_args))
        };
        Pipeline::chain(preceding, Command::new(tail, tail_args))
    }

    pub(crate) fn chain(mut preceding: Stage, terminal: Command) -> SpawnResult<Pipeline> {
        // The terminal command may arrive fully configured (env, cwd,
        // output modes), but its stdin is taken over by the boundary
        // pipe and must still be at its default.
        if !terminal.stdin_is_default() {
            return Err(SpawnError::ChainedStdin);
        }
        preceding.prepare_pipe()?;
        let pipeline = Pipeline { preceding, terminal };
        // The one-interactive-stream invariant is re-validated on every
        // chain step.
        if pipeline.interactive_streams() > 1 {
            return Err(SpawnError::MultipleInteractive);
        }
        Ok(pipeline)
    }

    /// Stdin mode for the whole chain, i.e. its first command.
    pub fn stdin(mut self, mode: StreamMode) -> SpawnResult<Self> {
        self.preceding.first_command_mut().set_stdin(mode)?;
        if self.interactive_streams() > 1 {
            return Err(SpawnError::MultipleInteractive);
        }
        Ok(self)
    }

    /// Stdout mode for the terminal command.
    pub fn stdout(mut self, mode: StreamMode) -> SpawnResult<Self> {
        self.terminal.set_stdout(mode)?;
        if self.interactive_streams() > 1 {
            return Err(SpawnError::MultipleInteractive);
        }
        Ok(self)
    }

    /// Stderr mode for the terminal command. Stderr of earlier stages is
    /// set on each command before chaining.
    pub fn stderr(mut self, mode: StreamMode) -> SpawnResult<Self> {
        self.terminal.set_stderr(mode)?;
        if self.interactive_streams() > 1 {
            return Err(SpawnError::MultipleInteractive);
        }
        Ok(self)
    }

    /// Extra environment variable for every stage of the chain.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        let (key, value) = (key.into(), value.into());
        self.for_each_command(&mut |command| command.push_env(key.clone(), value.clone()));
        self
    }

    /// Working directory for every stage of the chain.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.for_each_command(&mut |command| command.set_current_dir(dir.clone()));
        self
    }

    pub(crate) fn first_command_mut(&mut self) -> &mut Command {
        self.preceding.first_command_mut()
    }

    pub(crate) fn for_each_command(&mut self, f: &mut dyn FnMut(&mut Command)) {
        self.preceding.for_each_command(f);
        f(&mut self.terminal);
    }

    /// Tear down whatever already started when a later step of `start`
    /// fails, so no stage is left running behind the error.
    fn abort_started(&mut self) {
        self.preceding.for_each_command(&mut Command::abort);
    }
}

impl Runnable for Pipeline {
    fn start(&mut self, input: Option<&[u8]>) -> SpawnResult<()> {
        // The chain's stdin is the first stage's stdin, so eager input
        // goes upstream.
        self.preceding.start(input)?;
        let pipe_end = match self.preceding.take_pipe_end() {
            Some(fd) => fd,
            None => {
                self.abort_started();
                return Err(SpawnError::MissingPipeEnd);
            }
        };
        self.terminal.wire_stdin(pipe_end);
        if let Err(err) = self.terminal.start(None) {
            self.abort_started();
            return Err(err);
        }
        Ok(())
    }

    fn poll(&mut self) -> SpawnResult<Option<ExitStatus>> {
        self.terminal.poll()
    }

    // Only the terminal stage's status is authoritative.
    fn wait(&mut self, timeout: Option<Duration>) -> SpawnResult<Completed> {
        self.terminal.wait(timeout)
    }

    fn interactive_streams(&self) -> usize {
        self.preceding.interactive_streams() + self.terminal.interactive_streams()
    }

    fn prepare_pipe(&mut self) -> SpawnResult<()> {
        self.terminal.prepare_pipe()
    }

    fn take_pipe_end(&mut self) -> Option<OwnedFd> {
        self.terminal.take_pipe_end()
    }

    fn input_handle(&mut self) -> Option<&mut File> {
        self.preceding.input_handle()
    }

    fn take_input(&mut self) -> Option<File> {
        self.preceding.take_input()
    }

    fn take_output(&mut self) -> Option<File> {
        self.terminal.take_output()
    }

    fn into_stage(self) -> Stage {
        Stage::Pipeline(Box::new(self))
    }
}
