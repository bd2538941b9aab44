pub mod config;
pub mod disk;
pub mod docker;
pub mod dockerfile;
pub mod errors;
pub mod tools;
pub mod vm;

pub use config::Config;
pub use errors::{Error, Result};
pub use tools::ToolPaths;

use joblib::{
    JobEvent, JobId, JobReport, JobSpec, JobStatus, OutputLine, Supervisor, Termination,
};
use tracing::debug;

/// Everything the operations need: a running supervisor and where the tools are.
#[derive(Clone, Debug)]
pub struct Deck {
    pub supervisor: Supervisor,
    pub tools: ToolPaths,
}

impl Deck {
    pub fn new(config: &Config) -> Self {
        Self {
            supervisor: Supervisor::spawn(config.supervisor_config()),
            tools: config.tools.clone(),
        }
    }

    pub async fn create_disk(&self, request: &disk::DiskRequest) -> Result<disk::DiskCreated> {
        disk::create_disk(&self.supervisor, &self.tools, request).await
    }

    pub async fn launch_vm(&self, request: &vm::VmRequest) -> Result<JobId> {
        vm::launch_vm(&self.supervisor, &self.tools, request).await
    }

    pub fn docker(&self) -> docker::DockerEngine {
        docker::DockerEngine::new(self.supervisor.clone(), self.tools.clone())
    }

    /// Stream a long-running job to `on_line` and turn its outcome into a `Result`.
    pub async fn follow<F>(&self, job_id: JobId, command: &str, on_line: F) -> Result<JobReport>
    where
        F: FnMut(&OutputLine),
    {
        let report = self.supervisor.follow(job_id, on_line).await?;
        check(command, report)
    }

    pub async fn shutdown(&self) -> Result<()> {
        Ok(self.supervisor.shutdown().await?)
    }
}

/// Map a finished job onto the error taxonomy. Success passes through.
pub fn check(command: &str, report: JobReport) -> Result<JobReport> {
    match report.status {
        JobStatus::Succeeded => Ok(report),
        JobStatus::Failed(termination) => Err(Error::RuntimeFailure {
            command: command.to_string(),
            termination,
            output: report.output,
            hint: None,
        }),
        JobStatus::Cancelled => Err(Error::Cancelled(command.to_string())),
        other => Err(Error::RuntimeFailure {
            command: command.to_string(),
            termination: Termination::Lost(format!("job ended while {}", other)),
            output: report.output,
            hint: None,
        }),
    }
}

/// Run a short-lived command to completion and require success.
pub(crate) async fn run_checked(supervisor: &Supervisor, spec: JobSpec) -> Result<JobReport> {
    let command = spec.display();
    let report = supervisor.run(spec).await?;
    debug!(%command, status = %report.status, lines = report.output.len(), "command finished");
    check(&command, report)
}

/// Collect what a job printed so far without blocking. Used by callers that
/// poll instead of following.
pub async fn poll_output(
    supervisor: &Supervisor,
    job_id: JobId,
) -> Result<(Vec<OutputLine>, Option<JobStatus>)> {
    let mut lines = Vec::new();
    let mut finished = None;
    for event in supervisor.poll(job_id).await? {
        match event {
            JobEvent::Output(line) => lines.push(line),
            terminal => finished = terminal.status(),
        }
    }
    Ok((lines, finished))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// Write an executable `sh` script standing in for an external tool.
    pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
