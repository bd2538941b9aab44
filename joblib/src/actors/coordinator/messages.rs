use crate::errors::Result;
use crate::events::{JobEvent, JobStatus};
use crate::types::{JobId, JobSpec, OutputLine};
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum CoordinatorMessage {
    StartJob {
        spec: JobSpec,
        response: oneshot::Sender<Result<JobId>>,
    },
    CancelJob {
        job_id: JobId,
        response: oneshot::Sender<Result<()>>,
    },
    Poll {
        job_id: JobId,
        response: oneshot::Sender<Result<Vec<JobEvent>>>,
    },
    NextEvents {
        job_id: JobId,
        response: oneshot::Sender<Result<Vec<JobEvent>>>,
    },
    GetStatus {
        job_id: JobId,
        response: oneshot::Sender<Result<JobStatus>>,
    },
    GetTranscript {
        job_id: JobId,
        response: oneshot::Sender<Result<Vec<OutputLine>>>,
    },
    ListJobs {
        response: oneshot::Sender<Result<Vec<(JobId, JobStatus)>>>,
    },
    Shutdown {
        response: oneshot::Sender<Result<()>>,
    },
}

/// Sent by a worker once its terminal event has been handed to a consumer.
#[derive(Debug)]
pub struct Retirement {
    pub job_id: JobId,
    pub status: JobStatus,
}
