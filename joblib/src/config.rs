use std::time::Duration;

/// Tuning knobs for a [`Supervisor`](crate::Supervisor).
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Capacity of the coordinator's message queue. Limits the build-up of inbound requests.
    pub message_capacity: usize,
    /// How long a cancelled process gets between SIGTERM and SIGKILL.
    pub grace_period: Duration,
    /// How long to keep reading output after the process exits. Grandchildren
    /// that inherited the pipes can otherwise hold a job open forever.
    pub drain_timeout: Duration,
    /// Output lines kept per job for `transcript`.
    pub transcript_limit: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            message_capacity: 64,
            grace_period: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(2),
            transcript_limit: 10_000,
        }
    }
}
