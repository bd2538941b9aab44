use crate::types::{OutputLine, Stream};
use std::fmt;

/// How a finished job's process ended, when it did not succeed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The tool ran and reported an error through its exit code.
    Exited(i32),
    /// The tool was killed by a signal (crashed or was killed externally).
    Signaled(i32),
    /// The caller-supplied timeout elapsed and the process was stopped.
    TimedOut,
    /// Waiting on the child failed; its real exit status is unknown.
    Lost(String),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "exited with code {}", code),
            Termination::Signaled(signal) => write!(f, "terminated by signal {}", signal),
            Termination::TimedOut => f.write_str("timed out"),
            Termination::Lost(reason) => write!(f, "lost track of process: {}", reason),
        }
    }
}

/// The exit information of a job that ran to an end on its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Exit {
    Success,
    Failure(Termination),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed(Termination),
    Cancelled,
}

impl JobStatus {
    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Running => 1,
            JobStatus::Succeeded | JobStatus::Failed(_) | JobStatus::Cancelled => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }

    /// Populated if and only if the job succeeded or failed.
    pub fn exit(&self) -> Option<Exit> {
        match self {
            JobStatus::Succeeded => Some(Exit::Success),
            JobStatus::Failed(termination) => Some(Exit::Failure(termination.clone())),
            _ => None,
        }
    }

    /// Move forward to `next`. Returns false, leaving the status untouched,
    /// for any backward or sideways transition.
    pub fn advance(&mut self, next: JobStatus) -> bool {
        if next.rank() <= self.rank() {
            return false;
        }
        *self = next;
        true
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => f.write_str("pending"),
            JobStatus::Running => f.write_str("running"),
            JobStatus::Succeeded => f.write_str("succeeded"),
            JobStatus::Failed(termination) => write!(f, "failed ({})", termination),
            JobStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobEvent {
    Output(OutputLine),
    Succeeded,
    Failed(Termination),
    Cancelled,
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Output(_))
    }

    /// The final status a terminal event stands for.
    pub fn status(&self) -> Option<JobStatus> {
        match self {
            JobEvent::Output(_) => None,
            JobEvent::Succeeded => Some(JobStatus::Succeeded),
            JobEvent::Failed(termination) => Some(JobStatus::Failed(termination.clone())),
            JobEvent::Cancelled => Some(JobStatus::Cancelled),
        }
    }

    pub(crate) fn terminal_for(status: &JobStatus) -> Option<Self> {
        match status {
            JobStatus::Succeeded => Some(JobEvent::Succeeded),
            JobStatus::Failed(termination) => Some(JobEvent::Failed(termination.clone())),
            JobStatus::Cancelled => Some(JobEvent::Cancelled),
            JobStatus::Pending | JobStatus::Running => None,
        }
    }
}

/// Everything a job produced, collected by `Supervisor::run`.
#[derive(Clone, Debug)]
pub struct JobReport {
    pub status: JobStatus,
    pub output: Vec<OutputLine>,
}

impl JobReport {
    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Succeeded
    }

    pub fn lines(&self, stream: Stream) -> impl Iterator<Item = &OutputLine> {
        self.output.iter().filter(move |line| line.stream == stream)
    }

    /// The text of one stream, lines joined with `\n`.
    pub fn text(&self, stream: Stream) -> String {
        self.lines(stream)
            .map(|line| line.text().into_owned())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Both streams interleaved in arrival order.
    pub fn combined_text(&self) -> String {
        self.output
            .iter()
            .map(|line| line.text().into_owned())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
