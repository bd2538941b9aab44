use crate::types::JobId;
use std::{io, path::PathBuf, result};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    /// The executable could not be located; no process was started.
    #[error("executable not found: {program}")]
    NotFound { program: String },
    /// The executable was located but the OS refused to start it.
    #[error("failed to launch {}: {source}", .program.display())]
    LaunchFailed {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no such job: {0}")]
    UnknownJob(JobId),
    #[error("job {0} has been released")]
    Released(JobId),
    #[error("supervisor is shutting down")]
    ShuttingDown,
    #[error("supervisor exited")]
    SupervisorGone,
}

impl JobError {
    /// True when the job never reached `Running`.
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, JobError::NotFound { .. } | JobError::LaunchFailed { .. })
    }
}

pub type Result<T> = result::Result<T, JobError>;
