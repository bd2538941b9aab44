use crate::events::Termination;
use crate::types::{OutputLine, Stream};
use bytes::Bytes;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Child,
    select,
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{debug, warn};

/// What happened to the child, as seen by the task that owns it.
pub struct ProcessExit {
    pub status: io::Result<ExitStatus>,
    pub timed_out: bool,
}

impl ProcessExit {
    pub fn termination(&self) -> Option<Termination> {
        if self.timed_out {
            return Some(Termination::TimedOut);
        }
        match &self.status {
            Ok(status) if status.success() => None,
            Ok(status) => Some(match (status.code(), status.signal()) {
                (Some(code), _) => Termination::Exited(code),
                (None, Some(signal)) => Termination::Signaled(signal),
                (None, None) => Termination::Lost(format!("unrecognised exit status {}", status)),
            }),
            Err(e) => Some(Termination::Lost(e.to_string())),
        }
    }
}

/// Own the child until it exits. A message on `stop_rx` (or the sender
/// being dropped) or an elapsed `timeout` terminates it: SIGTERM first,
/// SIGKILL once `grace` has passed. The child is always reaped.
pub async fn supervise(
    mut child: Child,
    mut stop_rx: oneshot::Receiver<()>,
    grace: Duration,
    timeout: Option<Duration>,
) -> ProcessExit {
    // a timeout too large to represent never fires
    let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
    let timed_out = select! {
        status = child.wait() => return ProcessExit { status, timed_out: false },
        _ = &mut stop_rx => false,
        _ = sleep_until(deadline) => true,
    };
    let status = terminate(&mut child, grace).await;
    ProcessExit { status, timed_out }
}

async fn terminate(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(pid) = child.id() {
        if let Err(e) = send_sigterm(pid) {
            debug!(pid, error = %e, "SIGTERM failed");
        }
    }
    match time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(pid = ?child.id(), ?grace, "process ignored SIGTERM; killing");
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "SIGKILL failed");
            }
            child.wait().await
        }
    }
}

fn send_sigterm(pid: u32) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) takes plain integers and touches no memory of ours.
    // The child has not been reaped yet, so the pid cannot have been reused.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

pub async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => futures::future::pending().await,
    }
}

/// Pipe one output stream of the child into `output_tx`, one line at a time.
pub fn spawn_reader<R>(
    reader: R,
    stream: Stream,
    output_tx: mpsc::UnboundedSender<OutputLine>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(4096);
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = OutputLine::new(stream, Bytes::copy_from_slice(trim_line_end(&buf)));
                    if output_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(%stream, error = %e, "output read failed");
                    break;
                }
            }
        }
    })
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
