mod actor;
mod messages;
mod outbox;
mod process;

use crate::actors::coordinator::messages::Retirement;
use crate::config::SupervisorConfig;
use crate::errors::{JobError, Result};
use crate::events::{JobEvent, JobStatus};
use crate::types::{JobId, JobSpec, OutputLine};
use actor::Actor;
use messages::WorkerMessage;
use std::{path::PathBuf, process::Stdio};
use tokio::{
    process::Command,
    sync::{mpsc, oneshot},
};
use tracing::info;

#[derive(Clone)]
pub struct WorkerHandle {
    sender: mpsc::UnboundedSender<WorkerMessage>,
}

impl WorkerHandle {
    /// Spawn the job's process and the actor that supervises it.
    ///
    /// Fails with `LaunchFailed` if the OS refuses to start the process, in
    /// which case the job never leaves `Pending`.
    pub fn spawn(
        job_id: JobId,
        spec: JobSpec,
        program: PathBuf,
        config: &SupervisorConfig,
        retire_tx: mpsc::UnboundedSender<Retirement>,
    ) -> Result<Self> {
        let mut status = JobStatus::Pending;
        let mut command = Command::new(&program);
        command
            .args(&spec.args)
            .envs(spec.envs.iter().map(|(key, val)| (key, val)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.dir {
            command.current_dir(dir);
        }
        let child = command
            .spawn()
            .map_err(|source| JobError::LaunchFailed {
                program: program.clone(),
                source,
            })?;
        status.advance(JobStatus::Running);
        info!(
            %job_id,
            program = %program.display(),
            pid = ?child.id(),
            command = %spec.display(),
            "job started"
        );

        let (sender, inbox) = mpsc::unbounded_channel();
        Actor::spawn(job_id, inbox, retire_tx, child, status, spec.timeout, config);
        Ok(Self { sender })
    }

    pub fn poll(&self, response: oneshot::Sender<Result<Vec<JobEvent>>>) {
        let _ = self.sender.send(WorkerMessage::Poll { response });
    }

    pub fn next_events(&self, response: oneshot::Sender<Result<Vec<JobEvent>>>) {
        let _ = self.sender.send(WorkerMessage::NextEvents { response });
    }

    pub fn get_status(&self, response: oneshot::Sender<Result<JobStatus>>) {
        let _ = self.sender.send(WorkerMessage::GetStatus { response });
    }

    pub fn describe(&self, response: oneshot::Sender<Option<JobStatus>>) {
        let _ = self.sender.send(WorkerMessage::Describe { response });
    }

    pub fn get_transcript(&self, response: oneshot::Sender<Result<Vec<OutputLine>>>) {
        let _ = self.sender.send(WorkerMessage::GetTranscript { response });
    }

    pub fn cancel(&self, response: oneshot::Sender<Result<()>>) {
        let _ = self.sender.send(WorkerMessage::Cancel { response });
    }
}
