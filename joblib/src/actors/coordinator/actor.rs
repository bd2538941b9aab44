use super::messages::{CoordinatorMessage, Retirement};
use crate::actors::worker::WorkerHandle;
use crate::config::SupervisorConfig;
use crate::errors::{JobError, Result};
use crate::events::{JobEvent, JobStatus};
use crate::resolve::resolve_program;
use crate::types::{JobId, JobSpec, OutputLine};
use futures::future;
use std::collections::HashMap;
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Owns the job registry. Every mutation of the registry happens on this
/// actor's task, so no locking is needed.
pub struct JobCoordinator {
    inbox: mpsc::Receiver<CoordinatorMessage>,
    retire_tx: mpsc::UnboundedSender<Retirement>,
    retire_rx: mpsc::UnboundedReceiver<Retirement>,
    workers: HashMap<JobId, WorkerHandle>,
    // tombstones: final status of jobs whose events have been fully delivered
    released: HashMap<JobId, JobStatus>,
    config: SupervisorConfig,
    shutting_down: bool,
}

impl JobCoordinator {
    pub fn spawn(inbox: mpsc::Receiver<CoordinatorMessage>, config: SupervisorConfig) {
        let (retire_tx, retire_rx) = mpsc::unbounded_channel();
        let actor = Self {
            inbox,
            retire_tx,
            retire_rx,
            workers: HashMap::new(),
            released: HashMap::new(),
            config,
            shutting_down: false,
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        use self::CoordinatorMessage::*;
        loop {
            select! {
                biased;
                // settle retirements first so requests never see a drained job as live
                Some(retirement) = self.retire_rx.recv() => {
                    self.retire(retirement);
                }
                maybe_msg = self.inbox.recv() => {
                    let msg = match maybe_msg {
                        Some(msg) => msg,
                        // every handle dropped; dropping the workers stops their processes
                        None => break,
                    };
                    match msg {
                        StartJob { spec, response } => self.start_job(spec, response),
                        CancelJob { job_id, response } => self.cancel_job(job_id, response),
                        Poll { job_id, response } => self.poll(job_id, response),
                        NextEvents { job_id, response } => self.next_events(job_id, response),
                        GetStatus { job_id, response } => self.get_status(job_id, response),
                        GetTranscript { job_id, response } => self.get_transcript(job_id, response),
                        ListJobs { response } => self.list_jobs(response),
                        Shutdown { response } => self.shutdown(response),
                    }
                }
            }
        }
        debug!(live_jobs = self.workers.len(), "job coordinator exiting");
    }

    fn start_job(&mut self, spec: JobSpec, response: oneshot::Sender<Result<JobId>>) {
        if self.shutting_down {
            let _ = response.send(Err(JobError::ShuttingDown));
            return;
        }
        let program = match resolve_program(&spec.program) {
            Some(program) => program,
            None => {
                warn!(program = ?spec.program, "executable not found");
                let _ = response.send(Err(JobError::NotFound {
                    program: spec.program.to_string_lossy().into_owned(),
                }));
                return;
            }
        };
        let job_id = uuid::Uuid::new_v4();
        match WorkerHandle::spawn(job_id, spec, program, &self.config, self.retire_tx.clone()) {
            Ok(worker) => {
                self.workers.insert(job_id, worker);
                let _ = response.send(Ok(job_id));
            }
            Err(e) => {
                let _ = response.send(Err(e));
            }
        }
    }

    fn cancel_job(&mut self, job_id: JobId, response: oneshot::Sender<Result<()>>) {
        if let Some(worker) = self.workers.get(&job_id) {
            worker.cancel(response);
        } else if self.released.contains_key(&job_id) {
            let _ = response.send(Ok(()));
        } else {
            let _ = response.send(Err(JobError::UnknownJob(job_id)));
        }
    }

    fn poll(&mut self, job_id: JobId, response: oneshot::Sender<Result<Vec<JobEvent>>>) {
        if let Some(worker) = self.workers.get(&job_id) {
            worker.poll(response);
        } else {
            let _ = response.send(self.released_events(job_id));
        }
    }

    fn next_events(&mut self, job_id: JobId, response: oneshot::Sender<Result<Vec<JobEvent>>>) {
        if let Some(worker) = self.workers.get(&job_id) {
            worker.next_events(response);
        } else {
            let _ = response.send(self.released_events(job_id));
        }
    }

    fn released_events(&self, job_id: JobId) -> Result<Vec<JobEvent>> {
        if self.released.contains_key(&job_id) {
            Ok(Vec::new())
        } else {
            Err(JobError::UnknownJob(job_id))
        }
    }

    fn get_status(&mut self, job_id: JobId, response: oneshot::Sender<Result<JobStatus>>) {
        if let Some(worker) = self.workers.get(&job_id) {
            worker.get_status(response);
        } else if let Some(status) = self.released.get(&job_id) {
            let _ = response.send(Ok(status.clone()));
        } else {
            let _ = response.send(Err(JobError::UnknownJob(job_id)));
        }
    }

    fn get_transcript(
        &mut self,
        job_id: JobId,
        response: oneshot::Sender<Result<Vec<OutputLine>>>,
    ) {
        if let Some(worker) = self.workers.get(&job_id) {
            worker.get_transcript(response);
        } else if self.released.contains_key(&job_id) {
            let _ = response.send(Err(JobError::Released(job_id)));
        } else {
            let _ = response.send(Err(JobError::UnknownJob(job_id)));
        }
    }

    fn list_jobs(&mut self, response: oneshot::Sender<Result<Vec<(JobId, JobStatus)>>>) {
        // ask the workers concurrently so the registry keeps serving meanwhile
        let queries: Vec<_> = self
            .workers
            .iter()
            .map(|(job_id, worker)| {
                let (tx, rx) = oneshot::channel();
                worker.describe(tx);
                (*job_id, rx)
            })
            .collect();
        tokio::spawn(async move {
            let statuses = future::join_all(queries.into_iter().map(|(job_id, rx)| async move {
                rx.await.ok().flatten().map(|status| (job_id, status))
            }))
            .await;
            let _ = response.send(Ok(statuses.into_iter().flatten().collect()));
        });
    }

    fn shutdown(&mut self, response: oneshot::Sender<Result<()>>) {
        self.shutting_down = true;
        info!(live_jobs = self.workers.len(), "supervisor shutting down");
        let cancellations: Vec<_> = self
            .workers
            .values()
            .map(|worker| {
                let (tx, rx) = oneshot::channel();
                worker.cancel(tx);
                rx
            })
            .collect();
        tokio::spawn(async move {
            future::join_all(cancellations).await;
            let _ = response.send(Ok(()));
        });
    }

    fn retire(&mut self, retirement: Retirement) {
        let Retirement { job_id, status } = retirement;
        if self.workers.remove(&job_id).is_some() {
            debug!(%job_id, %status, "job drained; releasing worker");
            self.released.insert(job_id, status);
        }
    }
}
