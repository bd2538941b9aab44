use crate::errors::Result;
use crate::events::{JobEvent, JobStatus};
use crate::types::OutputLine;
use tokio::sync::oneshot;

pub enum WorkerMessage {
    Poll {
        response: oneshot::Sender<Result<Vec<JobEvent>>>,
    },
    NextEvents {
        response: oneshot::Sender<Result<Vec<JobEvent>>>,
    },
    GetStatus {
        response: oneshot::Sender<Result<JobStatus>>,
    },
    /// Status for listings; `None` once the job has been drained.
    Describe {
        response: oneshot::Sender<Option<JobStatus>>,
    },
    GetTranscript {
        response: oneshot::Sender<Result<Vec<OutputLine>>>,
    },
    Cancel {
        response: oneshot::Sender<Result<()>>,
    },
}
