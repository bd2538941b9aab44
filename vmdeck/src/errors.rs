use joblib::{JobError, OutputLine, Termination};
use std::{io, path::PathBuf, result};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed user input, caught before any process was spawned.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("could not start {program}: {reason}")]
    LaunchFailed { program: String, reason: String },

    /// The tool ran and did not succeed. `output` is everything it printed.
    #[error("{command} {termination}")]
    RuntimeFailure {
        command: String,
        termination: Termination,
        output: Vec<OutputLine>,
        hint: Option<String>,
    },

    #[error("{0} was cancelled")]
    Cancelled(String),

    #[error("container engine unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("container {0} no longer exists")]
    ContainerNotFound(String),

    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),

    #[error("config error: {0}")]
    Config(String),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Job(JobError),
}

impl From<JobError> for Error {
    fn from(e: JobError) -> Self {
        match e {
            JobError::NotFound { program } => Error::LaunchFailed {
                program,
                reason: "executable not found".to_string(),
            },
            JobError::LaunchFailed { program, source } => Error::LaunchFailed {
                program: program.display().to_string(),
                reason: source.to_string(),
            },
            other => Error::Job(other),
        }
    }
}

impl Error {
    /// The text the failed tool printed, both streams in arrival order.
    pub fn diagnostics(&self) -> Option<String> {
        match self {
            Error::RuntimeFailure { output, hint, .. } => {
                let mut text = output
                    .iter()
                    .map(|line| line.text().into_owned())
                    .collect::<Vec<_>>()
                    .join("\n");
                if let Some(hint) = hint {
                    text.push_str("\n\nTIP: ");
                    text.push_str(hint);
                }
                Some(text)
            }
            _ => None,
        }
    }
}

pub type Result<T> = result::Result<T, Error>;
