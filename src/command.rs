//! Single external process stage.
//!
//! Resolves stream modes to concrete OS handles, spawns the process, and
//! runs background threads for any I/O that could otherwise block the
//! foreground indefinitely against a full kernel pipe buffer.

use crate::argv;
use crate::completed::Completed;
use crate::errors::{SpawnError, SpawnResult};
use crate::mode::StreamMode;
use crate::runnable::{Runnable, Stage};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, OwnedFd};
use std::path::PathBuf;
use std::process::{Child, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wait_timeout::ChildExt;

/// One external command: a template, its stream modes, and (once
/// started) the live process plus its background I/O threads.
///
/// Inert until `start`. Dropping does not kill a running process; call
/// [`Command::terminate`] or [`Command::kill`] first if cleanup on drop
/// is wanted.
#[derive(Debug)]
pub struct Command {
    template: String,
    args: Vec<String>,
    argv: Vec<String>,
    stdin: StreamMode,
    stdout: StreamMode,
    stderr: StreamMode,
    envs: Vec<(OsString, OsString)>,
    cwd: Option<PathBuf>,
    pipe_wired: bool,
    child: Option<Child>,
    writer: Option<JoinHandle<io::Result<()>>>,
    drain_out: Option<JoinHandle<io::Result<Vec<u8>>>>,
    drain_err: Option<JoinHandle<io::Result<Vec<u8>>>>,
    pipe_end: Option<OwnedFd>,
    input: Option<File>,
    output: Option<File>,
    completed: Option<Completed>,
}

impl Command {
    /// Build an inert descriptor; nothing runs until `start`. All three
    /// streams default to inherit.
    pub fn new(template: &str, args: &[&str]) -> Command {
        Command {
            template: template.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            argv: Vec::new(),
            stdin: StreamMode::Inherit,
            stdout: StreamMode::Inherit,
            stderr: StreamMode::Inherit,
            envs: Vec::new(),
            cwd: None,
            pipe_wired: false,
            child: None,
            writer: None,
            drain_out: None,
            drain_err: None,
            pipe_end: None,
            input: None,
            output: None,
            completed: None,
        }
    }

    pub fn stdin(mut self, mode: StreamMode) -> SpawnResult<Self> {
        self.set_stdin(mode)?;
        Ok(self)
    }

    pub fn stdout(mut self, mode: StreamMode) -> SpawnResult<Self> {
        self.set_stdout(mode)?;
        Ok(self)
    }

    pub fn stderr(mut self, mode: StreamMode) -> SpawnResult<Self> {
        self.set_stderr(mode)?;
        Ok(self)
    }

    /// Extra environment variable for the child; passed through verbatim.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.push_env(key.into(), value.into());
        self
    }

    /// Working directory for the child; passed through verbatim.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.set_current_dir(dir.into());
        self
    }

    pub(crate) fn push_env(&mut self, key: OsString, value: OsString) {
        self.envs.push((key, value));
    }

    pub(crate) fn set_current_dir(&mut self, dir: PathBuf) {
        self.cwd = Some(dir);
    }

    pub(crate) fn stdin_is_default(&self) -> bool {
        matches!(self.stdin, StreamMode::Inherit)
    }

    /// Deliver a signal to the running process.
    pub fn send_signal(&self, signal: Signal) -> SpawnResult<()> {
        let child = self.child.as_ref().expect("send_signal before start");
        signal::kill(Pid::from_raw(child.id() as i32), signal)?;
        Ok(())
    }

    pub fn terminate(&self) -> SpawnResult<()> {
        self.send_signal(Signal::SIGTERM)
    }

    pub fn kill(&self) -> SpawnResult<()> {
        self.send_signal(Signal::SIGKILL)
    }

    pub(crate) fn set_stdin(&mut self, mode: StreamMode) -> SpawnResult<()> {
        match &mode {
            StreamMode::Inherit | StreamMode::FromStdin | StreamMode::Handle(_) => {}
            StreamMode::Interact => {
                if matches!(self.stdout, StreamMode::Interact)
                    || matches!(self.stderr, StreamMode::Interact)
                {
                    return Err(SpawnError::MultipleInteractive);
                }
            }
            other => {
                return Err(SpawnError::InvalidMode {
                    stream: "stdin",
                    mode: format!("{other:?}"),
                });
            }
        }
        self.stdin = mode;
        Ok(())
    }

    pub(crate) fn set_stdout(&mut self, mode: StreamMode) -> SpawnResult<()> {
        match &mode {
            StreamMode::FromStdin => {
                return Err(SpawnError::InvalidMode {
                    stream: "stdout",
                    mode: format!("{mode:?}"),
                });
            }
            StreamMode::Pipe if matches!(self.stderr, StreamMode::Pipe) => {
                return Err(SpawnError::DoublePipe);
            }
            StreamMode::Interact
                if matches!(self.stdin, StreamMode::Interact)
                    || matches!(self.stderr, StreamMode::Interact) =>
            {
                return Err(SpawnError::MultipleInteractive);
            }
            _ => {}
        }
        self.stdout = mode;
        Ok(())
    }

    pub(crate) fn set_stderr(&mut self, mode: StreamMode) -> SpawnResult<()> {
        match &mode {
            StreamMode::FromStdin => {
                return Err(SpawnError::InvalidMode {
                    stream: "stderr",
                    mode: format!("{mode:?}"),
                });
            }
            StreamMode::Pipe if matches!(self.stdout, StreamMode::Pipe) => {
                return Err(SpawnError::DoublePipe);
            }
            StreamMode::Interact
                if matches!(self.stdin, StreamMode::Interact)
                    || matches!(self.stdout, StreamMode::Interact) =>
            {
                return Err(SpawnError::MultipleInteractive);
            }
            _ => {}
        }
        self.stderr = mode;
        Ok(())
    }

    /// Bind stdin to the pipe end handed over by the preceding stage.
    pub(crate) fn wire_stdin(&mut self, fd: OwnedFd) {
        self.stdin = StreamMode::Handle(fd);
    }

    /// Best-effort kill and reap, used when a later pipeline stage fails
    /// to start. A no-op on a command that never started.
    pub(crate) fn abort(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
        if let Some(drain) = self.drain_out.take() {
            let _ = drain.join();
        }
        if let Some(drain) = self.drain_err.take() {
            let _ = drain.join();
        }
    }
}

fn out_stdio(mode: &StreamMode, wired: bool, stream: &'static str) -> SpawnResult<Stdio> {
    match mode {
        StreamMode::Inherit => Ok(Stdio::inherit()),
        StreamMode::Ignore => Ok(Stdio::null()),
        StreamMode::Capture | StreamMode::Interact => Ok(Stdio::piped()),
        StreamMode::Pipe => {
            if !wired {
                return Err(SpawnError::UnwiredPipe);
            }
            Ok(Stdio::piped())
        }
        StreamMode::ToStdout => Ok(Stdio::from(io::stdout().as_fd().try_clone_to_owned()?)),
        StreamMode::ToStderr => Ok(Stdio::from(io::stderr().as_fd().try_clone_to_owned()?)),
        StreamMode::Handle(_) => unreachable!("explicit handles are resolved by the caller"),
        StreamMode::FromStdin => Err(SpawnError::InvalidMode {
            stream,
            mode: "FromStdin".to_string(),
        }),
    }
}

fn join_drain(handle: Option<JoinHandle<io::Result<Vec<u8>>>>) -> SpawnResult<Option<Vec<u8>>> {
    match handle {
        None => Ok(None),
        Some(handle) => match handle.join() {
            Ok(Ok(buf)) => Ok(Some(buf)),
            Ok(Err(err)) => Err(SpawnError::Io(err)),
            Err(_) => Err(SpawnError::WorkerPanic),
        },
    }
}

impl Runnable for Command {
    fn start(&mut self, input: Option<&[u8]>) -> SpawnResult<()> {
        assert!(self.child.is_none(), "start called twice");

        let arg_refs: Vec<&str> = self.args.iter().map(String::as_str).collect();
        self.argv = argv::resolve(&self.template, &arg_refs)?;

        let stdin_interact = matches!(self.stdin, StreamMode::Interact);
        let out_capture = matches!(self.stdout, StreamMode::Capture);
        let out_interact = matches!(self.stdout, StreamMode::Interact);
        let out_pipe = matches!(self.stdout, StreamMode::Pipe);
        let err_capture = matches!(self.stderr, StreamMode::Capture);
        let err_interact = matches!(self.stderr, StreamMode::Interact);
        let err_pipe = matches!(self.stderr, StreamMode::Pipe);

        let data = input.map(<[u8]>::to_vec);
        let pstdin = if data.is_some() || stdin_interact {
            // Eager input or interact mode needs a writable pipe no
            // matter what was declared.
            match &self.stdin {
                StreamMode::Inherit | StreamMode::Interact => {}
                other => {
                    return Err(SpawnError::InvalidMode {
                        stream: "stdin",
                        mode: format!("{other:?}"),
                    });
                }
            }
            Stdio::piped()
        } else {
            // Handles are taken (the fd moves into the child); every
            // other mode is put back so the declared modes stay
            // observable after start.
            match std::mem::take(&mut self.stdin) {
                StreamMode::Handle(fd) => Stdio::from(fd),
                mode @ (StreamMode::Inherit | StreamMode::FromStdin) => {
                    self.stdin = mode;
                    Stdio::inherit()
                }
                other => unreachable!("stdin mode {other:?} rejected at construction"),
            }
        };
        let pstdout = match std::mem::take(&mut self.stdout) {
            StreamMode::Handle(fd) => Stdio::from(fd),
            mode => {
                self.stdout = mode;
                out_stdio(&self.stdout, self.pipe_wired, "stdout")?
            }
        };
        let pstderr = match std::mem::take(&mut self.stderr) {
            StreamMode::Handle(fd) => Stdio::from(fd),
            mode => {
                self.stderr = mode;
                out_stdio(&self.stderr, self.pipe_wired, "stderr")?
            }
        };

        log::debug!("spawning {:?}", self.argv);
        let mut cmd = std::process::Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..])
            .stdin(pstdin)
            .stdout(pstdout)
            .stderr(pstderr);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        let mut child = cmd.spawn().map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                SpawnError::CommandNotFound(self.argv[0].clone())
            } else {
                SpawnError::Io(err)
            }
        })?;

        if data.is_some() || stdin_interact {
            let stdin = File::from(OwnedFd::from(child.stdin.take().expect("piped stdin")));
            let writer_stdin = if stdin_interact {
                // Eager input goes through a clone so the exposed handle
                // stays usable for send() afterwards.
                let clone = if data.is_some() {
                    Some(stdin.try_clone()?)
                } else {
                    None
                };
                self.input = Some(stdin);
                clone
            } else {
                Some(stdin)
            };
            if let (Some(mut stdin), Some(data)) = (writer_stdin, data) {
                self.writer = Some(thread::spawn(move || {
                    // Write everything, then drop to close the pipe so
                    // the child sees EOF.
                    stdin.write_all(&data)?;
                    stdin.flush()?;
                    Ok(())
                }));
            }
        }

        if out_interact {
            self.output = child
                .stdout
                .take()
                .map(|out| File::from(OwnedFd::from(out)));
        } else if err_interact {
            self.output = child
                .stderr
                .take()
                .map(|err| File::from(OwnedFd::from(err)));
        }
        if self.pipe_wired {
            if out_pipe {
                self.pipe_end = child.stdout.take().map(OwnedFd::from);
            } else if err_pipe {
                self.pipe_end = child.stderr.take().map(OwnedFd::from);
            }
        }

        if out_capture {
            if let Some(mut out) = child.stdout.take() {
                self.drain_out = Some(thread::spawn(move || {
                    let mut buf = Vec::new();
                    out.read_to_end(&mut buf)?;
                    Ok(buf)
                }));
            }
        }
        if err_capture {
            if let Some(mut err) = child.stderr.take() {
                self.drain_err = Some(thread::spawn(move || {
                    let mut buf = Vec::new();
                    err.read_to_end(&mut buf)?;
                    Ok(buf)
                }));
            }
        }

        self.child = Some(child);
        Ok(())
    }

    fn poll(&mut self) -> SpawnResult<Option<ExitStatus>> {
        let child = self.child.as_mut().expect("poll before start");
        Ok(child.try_wait()?)
    }

    fn wait(&mut self, timeout: Option<Duration>) -> SpawnResult<Completed> {
        if let Some(done) = &self.completed {
            return Ok(done.clone());
        }
        let child = self.child.as_mut().expect("wait before start");
        let status = match timeout {
            Some(limit) => match child.wait_timeout(limit)? {
                Some(status) => status,
                None => {
                    // The process is deliberately left running; the
                    // caller decides whether to kill and reap.
                    return Err(SpawnError::Timeout {
                        program: self.argv[0].clone(),
                        timeout: limit,
                    });
                }
            },
            None => child.wait()?,
        };

        if let Some(writer) = self.writer.take() {
            match writer.join() {
                Ok(Ok(())) => {}
                // The process exited before reading everything; normal
                // for chains like `yes | head`.
                Ok(Err(err)) if err.kind() == io::ErrorKind::BrokenPipe => {}
                Ok(Err(err)) => return Err(SpawnError::Io(err)),
                Err(_) => return Err(SpawnError::WorkerPanic),
            }
        }
        let stdout = join_drain(self.drain_out.take())?;
        let stderr = join_drain(self.drain_err.take())?;

        log::debug!("{:?} exited with {}", self.argv, status);
        let done = Completed {
            argv: self.argv.clone(),
            status,
            stdout,
            stderr,
        };
        self.completed = Some(done.clone());
        Ok(done)
    }

    fn interactive_streams(&self) -> usize {
        [&self.stdin, &self.stdout, &self.stderr]
            .iter()
            .filter(|mode| matches!(mode, StreamMode::Interact))
            .count()
    }

    fn prepare_pipe(&mut self) -> SpawnResult<()> {
        self.pipe_wired = true;
        if !matches!(self.stdout, StreamMode::Pipe) && !matches!(self.stderr, StreamMode::Pipe) {
            if !matches!(self.stdout, StreamMode::Inherit) {
                return Err(SpawnError::PipeCollision);
            }
            self.stdout = StreamMode::Pipe;
        }
        Ok(())
    }

    fn take_pipe_end(&mut self) -> Option<OwnedFd> {
        self.pipe_end.take()
    }

    fn input_handle(&mut self) -> Option<&mut File> {
        self.input.as_mut()
    }

    fn take_input(&mut self) -> Option<File> {
        self.input.take()
    }

    fn take_output(&mut self) -> Option<File> {
        self.output.take()
    }

    fn into_stage(self) -> Stage {
        Stage::Command(self)
    }
}
