mod actor;
pub(crate) mod messages;

use self::{actor::JobCoordinator, messages::CoordinatorMessage};
use crate::config::SupervisorConfig;
use crate::errors::{JobError, Result};
use crate::events::{JobEvent, JobReport, JobStatus};
use crate::types::{JobId, JobSpec, OutputLine};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// A `Supervisor` which runs external commands as jobs and relays their output.
///
/// This struct is actually an actor handle, the real work is done in the actor spawned by `SupervisorHandle::spawn`,
/// but from the user perspective all that matters is that this struct provides methods for managing jobs.
/// The actor-handle abstraction allows this struct to be cloned freely in a multi-thread async context,
/// without requiring an `Arc<Mutex>` or any other means of synchronization.
#[derive(Clone, Debug)]
pub struct SupervisorHandle {
    sender: mpsc::Sender<CoordinatorMessage>,
}

impl SupervisorHandle {
    /// Spawn a new supervisor. Must be called from within a tokio runtime.
    pub fn spawn(config: SupervisorConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.message_capacity.max(1));
        JobCoordinator::spawn(receiver, config);
        Self { sender }
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<Result<T>>) -> CoordinatorMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(message(tx))
            .await
            .map_err(|_| JobError::SupervisorGone)?;
        rx.await.map_err(|_| JobError::SupervisorGone)?
    }

    /// Start a new job. Returns once the process is running.
    pub async fn start(&self, spec: JobSpec) -> Result<JobId> {
        self.request(|response| CoordinatorMessage::StartJob { spec, response })
            .await
    }

    /// Take whatever events the job has buffered since the last delivery, without waiting.
    pub async fn poll(&self, job_id: JobId) -> Result<Vec<JobEvent>> {
        self.request(|response| CoordinatorMessage::Poll { job_id, response })
            .await
    }

    /// Like `poll`, but waits until at least one event is available.
    /// Returns an empty batch once the job has been fully drained.
    pub async fn next_events(&self, job_id: JobId) -> Result<Vec<JobEvent>> {
        self.request(|response| CoordinatorMessage::NextEvents { job_id, response })
            .await
    }

    /// Stop a job and wait for its process to be reaped.
    pub async fn cancel(&self, job_id: JobId) -> Result<()> {
        self.request(|response| CoordinatorMessage::CancelJob { job_id, response })
            .await
    }

    pub async fn status(&self, job_id: JobId) -> Result<JobStatus> {
        self.request(|response| CoordinatorMessage::GetStatus { job_id, response })
            .await
    }

    /// The retained output history of a job that has not been released yet.
    pub async fn transcript(&self, job_id: JobId) -> Result<Vec<OutputLine>> {
        self.request(|response| CoordinatorMessage::GetTranscript { job_id, response })
            .await
    }

    /// Jobs that are still registered, with their current status.
    pub async fn list(&self) -> Result<Vec<(JobId, JobStatus)>> {
        self.request(|response| CoordinatorMessage::ListJobs { response })
            .await
    }

    /// Cancel every live job, wait until all of them are reaped and refuse further starts.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|response| CoordinatorMessage::Shutdown { response })
            .await
    }

    /// Run a job to its end and collect everything it printed.
    pub async fn run(&self, spec: JobSpec) -> Result<JobReport> {
        let job_id = self.start(spec).await?;
        self.follow(job_id, |_| {}).await
    }

    /// Wait for a started job to end, handing each output line to `on_line`
    /// as it arrives. Returns the collected report.
    pub async fn follow<F>(&self, job_id: JobId, mut on_line: F) -> Result<JobReport>
    where
        F: FnMut(&OutputLine),
    {
        let mut output = Vec::new();
        loop {
            let events = self.next_events(job_id).await?;
            if events.is_empty() {
                // drained by someone else; the tombstone still knows how it ended
                let status = self.status(job_id).await?;
                return Ok(JobReport { status, output });
            }
            for event in events {
                let status = match event {
                    JobEvent::Output(line) => {
                        on_line(&line);
                        output.push(line);
                        continue;
                    }
                    JobEvent::Succeeded => JobStatus::Succeeded,
                    JobEvent::Failed(termination) => JobStatus::Failed(termination),
                    JobEvent::Cancelled => JobStatus::Cancelled,
                };
                debug!(%job_id, %status, lines = output.len(), "job followed to its end");
                return Ok(JobReport { status, output });
            }
        }
    }
}
