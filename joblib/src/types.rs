use bytes::Bytes;
use std::borrow::Cow;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

pub type Program = OsString;
pub type Args = Vec<OsString>;
pub type Envs = Vec<(OsString, OsString)>;
pub type JobId = Uuid;

/// One external command invocation. Arguments are passed to the child as
/// discrete tokens; nothing is ever handed to a shell.
#[derive(Clone, Debug)]
pub struct JobSpec {
    pub program: Program,
    pub args: Args,
    pub dir: Option<PathBuf>,
    pub envs: Envs,
    pub timeout: Option<Duration>,
}

impl JobSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
            envs: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, val: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), val.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Render the command for logs and user feedback. Never executed.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|token| {
                let token = token.to_string_lossy();
                if token.is_empty() || token.contains(char::is_whitespace) {
                    format!("{:?}", token)
                } else {
                    token.into_owned()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => f.write_str("stdout"),
            Stream::Stderr => f.write_str("stderr"),
        }
    }
}

/// A single line of child output, without its line terminator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: Stream,
    pub line: Bytes,
}

impl OutputLine {
    pub fn new(stream: Stream, line: impl Into<Bytes>) -> Self {
        Self {
            stream,
            line: line.into(),
        }
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.line)
    }
}
