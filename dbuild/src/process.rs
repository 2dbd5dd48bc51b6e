use std::{
    ffi::OsStr,
    fmt,
    io::{self, BufRead, BufReader, Read},
    num::NonZeroI32,
    process,
    sync::mpsc,
    thread,
};

use log::debug;

pub struct Command(process::Command);

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Command {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self(process::Command::new(program))
    }

    pub fn args<'a, I>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = &'a OsStr>,
    {
        self.0.args(args);
        self
    }

    pub fn env<K: AsRef<OsStr>, V: AsRef<OsStr>>(mut self, key: K, value: V) -> Self {
        self.0.env(key, value);
        self
    }

    pub fn try_output(mut self) -> Result<Output, Error> {
        if log::log_enabled!(log::Level::Debug) {
            debug!("capturing `{command:?}`...", command = &self.0);
        }

        match self.0.output() {
            Ok(output) => Ok(Output {
                command: self,
                output,
            }),
            Err(error) => Err(Error {
                command: self,
                kind: error.into(),
            }),
        }
    }

    pub fn output(self) -> Result<Output, Error> {
        self.try_output().and_then(Output::require_success)
    }

    /// Spawns the command with stdout and stderr piped. Lines are read on two background threads and can be received,
    /// in the order they were written per stream, from the returned [`Lines`].
    pub fn spawn_lines(mut self) -> Result<Lines, Error> {
        if log::log_enabled!(log::Level::Debug) {
            debug!("streaming `{command:?}`...", command = &self.0);
        }

        self.0
            .stdin(process::Stdio::null())
            .stdout(process::Stdio::piped())
            .stderr(process::Stdio::piped());
        let mut child = match self.0.spawn() {
            Ok(child) => child,
            Err(error) => return Err(self.error(error)),
        };

        let (sender, receiver) = mpsc::channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, Stream::Stdout, sender.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, Stream::Stderr, sender));
        }

        Ok(Lines {
            command: self,
            child,
            receiver,
            readers,
        })
    }

    /// Spawns the command with stdout and stderr connected to the same pipe. Every line is received exactly in the
    /// order the child wrote it, tagged [`Stream::Combined`].
    pub fn spawn_combined_lines(mut self) -> Result<Lines, Error> {
        if log::log_enabled!(log::Level::Debug) {
            debug!("streaming `{command:?}`...", command = &self.0);
        }

        let (reader, writer) = match io::pipe() {
            Ok(pipe) => pipe,
            Err(error) => return Err(self.error(error)),
        };
        let stderr_writer = match writer.try_clone() {
            Ok(writer) => writer,
            Err(error) => return Err(self.error(error)),
        };

        self.0
            .stdin(process::Stdio::null())
            .stdout(writer)
            .stderr(stderr_writer);
        let spawned = self.0.spawn();
        // The command holds on to the write ends until they are replaced, the reader only sees the end of the output
        // once every write end is closed.
        self.0
            .stdout(process::Stdio::null())
            .stderr(process::Stdio::null());
        let child = match spawned {
            Ok(child) => child,
            Err(error) => return Err(self.error(error)),
        };

        let (sender, receiver) = mpsc::channel();
        let readers = vec![forward_lines(reader, Stream::Combined, sender)];

        Ok(Lines {
            command: self,
            child,
            receiver,
            readers,
        })
    }

    fn error(self, error: io::Error) -> Error {
        Error {
            command: self,
            kind: error.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stream {
    Stdout,
    Stderr,
    /// Stdout and stderr written to one pipe.
    Combined,
}

fn forward_lines<R: Read + Send + 'static>(
    reader: R,
    stream: Stream,
    sender: mpsc::Sender<(Stream, String)>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(reader).split(b'\n') {
            let Ok(mut line) = line else {
                break;
            };
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();
            if sender.send((stream, line)).is_err() {
                // The receiving end was dropped, nobody is interested in the rest of the output.
                break;
            }
        }
    })
}

/// Output lines of a running child process. Iteration ends once both stdout and stderr are closed. Call
/// [`Lines::finish`] afterwards to obtain the exit status. Dropping an unfinished [`Lines`] kills the child.
pub struct Lines {
    command: Command,
    child: process::Child,
    receiver: mpsc::Receiver<(Stream, String)>,
    readers: Vec<thread::JoinHandle<()>>,
}

impl fmt::Debug for Lines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lines")
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

impl Iterator for Lines {
    type Item = (Stream, String);

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}

impl Lines {
    /// Drains any remaining output and waits for the child to exit.
    pub fn finish(mut self) -> Result<ExitStatus, Error> {
        for _ in self.by_ref() {}
        for reader in self.readers.drain(..) {
            let _ = reader.join();
        }
        let status = self.child.wait();
        let command = self.take_command();
        match status {
            Ok(status) => Ok(ExitStatus { command, status }),
            Err(error) => Err(Error {
                command,
                kind: error.into(),
            }),
        }
    }

    fn take_command(&mut self) -> Command {
        let program = self.command.0.get_program().to_owned();
        std::mem::replace(&mut self.command, Command::new(program))
    }
}

impl Drop for Lines {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[derive(Debug)]
pub struct ExitStatus {
    pub command: Command,
    pub status: process::ExitStatus,
}

impl ExitStatus {
    pub fn require_success(self) -> Result<(), Error> {
        let ExitStatus { command, status } = self;
        if status.success() {
            Ok(())
        } else {
            Err(Error {
                command,
                kind: ErrorKind::NonZeroExitStatus {
                    code: status.code().and_then(NonZeroI32::new),
                    stderr: String::new(),
                },
            })
        }
    }
}

#[derive(Debug)]
pub struct Output {
    pub command: Command,
    pub output: process::Output,
}

impl Output {
    pub fn require_success(self) -> Result<Output, Error> {
        let Output { command, output } = self;
        if output.status.success() {
            Ok(Output { command, output })
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            Err(Error {
                command,
                kind: ErrorKind::NonZeroExitStatus {
                    code: output.status.code().and_then(NonZeroI32::new),
                    stderr,
                },
            })
        }
    }

    /// Returns stdout as UTF-8 with surrounding whitespace removed.
    pub fn stdout_trimmed(&self) -> Result<&str, std::str::Utf8Error> {
        Ok(std::str::from_utf8(&self.output.stdout)?.trim())
    }
}

impl std::ops::Deref for Output {
    type Target = process::Output;

    fn deref(&self) -> &Self::Target {
        &self.output
    }
}

#[derive(Debug)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    NonZeroExitStatus {
        code: Option<NonZeroI32>,
        /// Trimmed stderr of the command, empty when it was not captured.
        stderr: String,
    },
    Io(io::ErrorKind),
}

impl From<io::Error> for ErrorKind {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            kind => ErrorKind::Io(kind),
        }
    }
}

#[derive(Debug)]
pub struct Error {
    pub command: Command,
    pub kind: ErrorKind,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to run `{command:?}`: ",
            command = &self.command.0
        )?;
        match &self.kind {
            ErrorKind::NotFound => {
                let program = self.command.0.get_program().to_string_lossy();
                write!(f, "the `{program}` command is required but not available on your system, please install it")
            }
            ErrorKind::PermissionDenied => {
                let program = self.command.0.get_program().to_string_lossy();
                write!(f, "the `{program}` command is available but does not have the right permissions, please make sure the binary is executable")
            }
            ErrorKind::NonZeroExitStatus { code, stderr } => {
                if let Some(code) = code {
                    write!(f, "exited with non-zero exit code `{code}`")?;
                } else {
                    write!(f, "did not run succesfully")?;
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
            ErrorKind::Io(kind) => write!(f, "{kind}"),
        }
    }
}

impl std::error::Error for Error {}

/// Creates a new [`Command`] and supplies the provided arguments, if any, while calling
/// [`std::convert::AsRef::as_ref`] on each.
macro_rules! command {
    ($program:expr, $($arg:expr),* $(,)?) => {
        $crate::process::args!($crate::process::Command::new($program), $($arg,)*)
    };
}

/// Calls [`Command::args`] on the provided [`Command`] while calling [`std::convert::AsRef::as_ref`]
/// on each argument.
macro_rules! args {
    ($program:expr, $($arg:expr),+ $(,)?) => {
        $program.args([
            $(($arg).as_ref(),)*
        ])
    }
}

pub(crate) use args;
pub(crate) use command;
