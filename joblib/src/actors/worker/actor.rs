use super::messages::WorkerMessage;
use super::outbox::Outbox;
use super::process::{self, ProcessExit};
use crate::actors::coordinator::messages::Retirement;
use crate::config::SupervisorConfig;
use crate::errors::{JobError, Result};
use crate::events::{JobEvent, JobStatus};
use crate::types::{JobId, OutputLine, Stream};

use std::time::Duration;
use tokio::{
    process::Child,
    select,
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

pub struct Actor {
    job_id: JobId,
    inbox: mpsc::UnboundedReceiver<WorkerMessage>,
    retire_tx: mpsc::UnboundedSender<Retirement>,
    status: JobStatus,
    outbox: Outbox,
    stop_tx: Option<oneshot::Sender<()>>,
    cancel_requested: bool,
    cancel_waiters: Vec<oneshot::Sender<Result<()>>>,
    readers: Vec<JoinHandle<()>>,
    drain_timeout: Duration,
    retired: bool,
}

impl Actor {
    pub fn spawn(
        job_id: JobId,
        inbox: mpsc::UnboundedReceiver<WorkerMessage>,
        retire_tx: mpsc::UnboundedSender<Retirement>,
        mut child: Child,
        status: JobStatus,
        timeout: Option<Duration>,
        config: &SupervisorConfig,
    ) {
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(process::spawn_reader(stdout, Stream::Stdout, output_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(process::spawn_reader(stderr, Stream::Stderr, output_tx));
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let grace = config.grace_period;
        let supervisor_task = tokio::spawn(process::supervise(child, stop_rx, grace, timeout));

        let actor = Self {
            job_id,
            inbox,
            retire_tx,
            status,
            outbox: Outbox::new(config.transcript_limit),
            stop_tx: Some(stop_tx),
            cancel_requested: false,
            cancel_waiters: Vec::new(),
            readers,
            drain_timeout: config.drain_timeout,
            retired: false,
        };
        tokio::spawn(async move { actor.run(output_rx, supervisor_task).await });
    }

    async fn run(
        mut self,
        mut output_rx: mpsc::UnboundedReceiver<OutputLine>,
        mut supervisor_task: JoinHandle<ProcessExit>,
    ) {
        let mut output_open = true;
        let mut exit: Option<ProcessExit> = None;
        let mut drain_deadline: Option<Instant> = None;

        loop {
            select! {
                maybe_msg = self.inbox.recv() => {
                    match maybe_msg {
                        Some(msg) => self.handle_message(msg, exit.is_some()),
                        // released by the coordinator, or the coordinator is gone
                        None => break,
                    }
                }
                maybe_line = output_rx.recv(), if output_open => {
                    match maybe_line {
                        Some(line) => self.outbox.push_output(line),
                        None => output_open = false,
                    }
                }
                joined = &mut supervisor_task, if exit.is_none() => {
                    let process_exit = joined.unwrap_or_else(|e| ProcessExit {
                        status: Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())),
                        timed_out: false,
                    });
                    exit = Some(process_exit);
                    drain_deadline = Instant::now().checked_add(self.drain_timeout);
                }
                _ = process::sleep_until(drain_deadline), if output_open && exit.is_some() => {
                    warn!(job_id = %self.job_id, "output still open after exit; abandoning readers");
                    self.readers.iter().for_each(JoinHandle::abort);
                    // lines already sent are still delivered
                    while let Ok(line) = output_rx.try_recv() {
                        self.outbox.push_output(line);
                    }
                    output_open = false;
                }
            }

            if !output_open && !self.status.is_terminal() {
                if let Some(process_exit) = &exit {
                    self.finish(process_exit);
                }
            }
            self.outbox.serve_waiters();
            self.retire_if_drained();
        }

        // never let the child outlive its supervisor
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        debug!(job_id = %self.job_id, "worker exiting");
    }

    fn handle_message(&mut self, msg: WorkerMessage, exited: bool) {
        use WorkerMessage::*;
        match msg {
            Poll { response } => {
                let events = self.outbox.take();
                if let Err(Ok(events)) = response.send(Ok(events)) {
                    self.outbox.restore(events);
                }
            }
            NextEvents { response } => self.outbox.wait(response),
            GetStatus { response } => {
                let _ = response.send(Ok(self.status.clone()));
            }
            Describe { response } => {
                let listed = (!self.outbox.is_drained()).then(|| self.status.clone());
                let _ = response.send(listed);
            }
            GetTranscript { response } => {
                let transcript = if self.outbox.is_drained() {
                    Err(JobError::Released(self.job_id))
                } else {
                    Ok(self.outbox.transcript())
                };
                let _ = response.send(transcript);
            }
            Cancel { response } => self.cancel(response, exited),
        }
    }

    fn cancel(&mut self, response: oneshot::Sender<Result<()>>, exited: bool) {
        // a process that already ended on its own keeps its own outcome
        if self.status.is_terminal() || exited {
            let _ = response.send(Ok(()));
            return;
        }
        if !self.cancel_requested {
            info!(job_id = %self.job_id, "cancelling job");
            self.cancel_requested = true;
            if let Some(stop_tx) = self.stop_tx.take() {
                let _ = stop_tx.send(());
            }
        }
        self.cancel_waiters.push(response);
    }

    /// The process is reaped and its output fully read: settle the final status.
    fn finish(&mut self, process_exit: &ProcessExit) {
        let next = if self.cancel_requested {
            JobStatus::Cancelled
        } else {
            match process_exit.termination() {
                None => JobStatus::Succeeded,
                Some(termination) => JobStatus::Failed(termination),
            }
        };
        self.status.advance(next);
        match &self.status {
            JobStatus::Failed(termination) => {
                info!(job_id = %self.job_id, %termination, "job failed")
            }
            status => info!(job_id = %self.job_id, %status, "job finished"),
        }
        if let Some(event) = JobEvent::terminal_for(&self.status) {
            self.outbox.push_terminal(event);
        }
        for waiter in self.cancel_waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
    }

    fn retire_if_drained(&mut self) {
        if self.retired || !self.outbox.is_drained() {
            return;
        }
        self.retired = true;
        let _ = self.retire_tx.send(Retirement {
            job_id: self.job_id,
            status: self.status.clone(),
        });
    }
}
