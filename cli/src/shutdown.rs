use joblib::{JobId, Supervisor};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Cancel `job_id` when SIGINT or SIGTERM arrives.
///
/// The job still runs its normal termination path, so whoever follows it
/// sees the remaining output and a `Cancelled` ending. Abort the returned
/// handle once the job is over.
pub fn cancel_on_signal(supervisor: Supervisor, job_id: JobId) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "could not install signal handlers, Ctrl-C will not stop the job");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!(%job_id, "received SIGTERM, stopping job"),
            _ = sigint.recv() => info!(%job_id, "received SIGINT, stopping job"),
        }

        if let Err(e) = supervisor.cancel(job_id).await {
            warn!(%job_id, error = %e, "failed to cancel job");
        }
    })
}
