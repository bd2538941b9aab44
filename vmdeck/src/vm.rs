//! Virtual machine launch through `qemu-system-x86_64`.

use crate::disk::DiskFormat;
use crate::errors::{Error, Result};
use crate::tools::ToolPaths;
use joblib::{JobId, JobSpec, Supervisor};
use std::path::PathBuf;
use tracing::info;

#[derive(Clone, Debug, PartialEq)]
pub struct VmRequest {
    pub cpus: u32,
    pub memory_mb: u64,
    pub disk: PathBuf,
    /// Taken from the disk's extension when absent.
    pub disk_format: Option<DiskFormat>,
    /// Boot medium, usually an installer.
    pub iso: Option<PathBuf>,
    pub display: String,
    pub machine: String,
}

impl VmRequest {
    pub fn new(disk: impl Into<PathBuf>) -> Self {
        Self {
            cpus: 2,
            memory_mb: 2048,
            disk: disk.into(),
            disk_format: None,
            iso: None,
            display: "gtk".to_string(),
            machine: "q35".to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cpus == 0 {
            return Err(Error::Validation("at least one CPU is required".into()));
        }
        if self.memory_mb == 0 {
            return Err(Error::Validation("memory must be greater than zero".into()));
        }
        if !self.disk.is_file() {
            return Err(Error::Validation(format!(
                "disk image {} does not exist",
                self.disk.display()
            )));
        }
        if let Some(iso) = &self.iso {
            if !iso.is_file() {
                return Err(Error::Validation(format!(
                    "ISO image {} does not exist",
                    iso.display()
                )));
            }
        }
        if self.display.trim().is_empty() || self.machine.trim().is_empty() {
            return Err(Error::Validation(
                "display and machine type cannot be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn resolved_format(&self) -> Result<DiskFormat> {
        self.disk_format
            .or_else(|| DiskFormat::from_path(&self.disk))
            .ok_or_else(|| {
                Error::Validation(format!(
                    "cannot tell the format of {}, pass it explicitly",
                    self.disk.display()
                ))
            })
    }

    pub fn command(&self, tools: &ToolPaths) -> Result<JobSpec> {
        let format = self.resolved_format()?;
        let disk = self.disk.to_str().ok_or_else(|| {
            Error::Validation(format!(
                "disk path {} is not valid UTF-8",
                self.disk.display()
            ))
        })?;
        // qemu escapes a literal comma in an option value by doubling it
        let drive = format!("file={},format={}", disk.replace(',', ",,"), format);

        let mut spec = tools
            .qemu_system()
            .arg("-smp")
            .arg(self.cpus.to_string())
            .arg("-m")
            .arg(self.memory_mb.to_string())
            .arg("-drive")
            .arg(drive);
        if let Some(iso) = &self.iso {
            spec = spec.arg("-cdrom").arg(iso);
        }
        Ok(spec.args([
            "-boot",
            "menu=on",
            "-display",
            self.display.as_str(),
            "-machine",
            &format!("type={}", self.machine),
            "-usbdevice",
            "tablet",
        ]))
    }
}

/// Start the VM as a supervised job. The caller streams its output and
/// cancels it when the user asks to stop.
pub async fn launch_vm(
    supervisor: &Supervisor,
    tools: &ToolPaths,
    request: &VmRequest,
) -> Result<JobId> {
    request.validate()?;
    let spec = request.command(tools)?;
    let command = spec.display();
    let job_id = supervisor.start(spec).await?;
    info!(%job_id, %command, "virtual machine launched");
    Ok(job_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fake_tool;
    use joblib::{JobStatus, Stream, SupervisorConfig};
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    fn args(spec: &JobSpec) -> Vec<String> {
        spec.args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn builds_the_full_command_line() {
        let mut req = VmRequest::new("/vms/ubuntu.qcow2");
        req.cpus = 4;
        req.memory_mb = 4096;
        req.iso = Some(PathBuf::from("/isos/ubuntu.iso"));

        let spec = req.command(&ToolPaths::default()).unwrap();
        assert_eq!(spec.program, "qemu-system-x86_64");
        assert_eq!(
            args(&spec),
            [
                "-smp",
                "4",
                "-m",
                "4096",
                "-drive",
                "file=/vms/ubuntu.qcow2,format=qcow2",
                "-cdrom",
                "/isos/ubuntu.iso",
                "-boot",
                "menu=on",
                "-display",
                "gtk",
                "-machine",
                "type=q35",
                "-usbdevice",
                "tablet",
            ]
        );
    }

    #[test]
    fn iso_is_optional_and_format_can_be_forced() {
        let mut req = VmRequest::new("/vms/legacy.img");
        req.disk_format = Some(DiskFormat::Raw);
        req.display = "none".to_string();
        let args = args(&req.command(&ToolPaths::default()).unwrap());
        assert!(!args.iter().any(|arg| arg == "-cdrom"));
        assert!(args.contains(&"file=/vms/legacy.img,format=raw".to_string()));
        assert!(args.contains(&"none".to_string()));
    }

    #[test]
    fn commas_in_the_disk_path_are_doubled() {
        let req = VmRequest::new("/vms/a,b/disk.vdi");
        let args = args(&req.command(&ToolPaths::default()).unwrap());
        assert!(args.contains(&"file=/vms/a,,b/disk.vdi,format=vdi".to_string()));
    }

    #[test]
    fn unknown_extension_needs_an_explicit_format() {
        let req = VmRequest::new("/vms/disk.bin");
        assert!(matches!(
            req.command(&ToolPaths::default()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn validation_checks_resources_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let disk = touch(dir.path(), "vm.qcow2");

        let mut req = VmRequest::new(&disk);
        assert!(req.validate().is_ok());

        req.cpus = 0;
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
        req.cpus = 1;
        req.memory_mb = 0;
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
        req.memory_mb = 512;
        req.iso = Some(dir.path().join("missing.iso"));
        assert!(matches!(req.validate(), Err(Error::Validation(_))));

        let req = VmRequest::new(dir.path().join("missing.qcow2"));
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn launched_vm_streams_and_cancels() {
        let dir = tempfile::tempdir().unwrap();
        let disk = touch(dir.path(), "vm.qcow2");
        let tools = ToolPaths {
            qemu_system: fake_tool(
                dir.path(),
                "qemu-system-x86_64",
                "echo \"booting with $*\"; echo 'warning: no kvm' >&2; exec sleep 30",
            ),
            ..ToolPaths::default()
        };
        let supervisor = Supervisor::spawn(SupervisorConfig {
            grace_period: Duration::from_millis(500),
            ..SupervisorConfig::default()
        });

        let job_id = launch_vm(&supervisor, &tools, &VmRequest::new(&disk))
            .await
            .unwrap();

        let mut seen = Vec::new();
        while seen.len() < 2 {
            for event in supervisor.next_events(job_id).await.unwrap() {
                if let joblib::JobEvent::Output(line) = event {
                    seen.push(line);
                }
            }
        }
        assert!(seen
            .iter()
            .any(|line| line.stream == Stream::Stdout && line.text().contains("-smp 2 -m 2048")));
        assert!(seen.iter().any(|line| line.stream == Stream::Stderr));

        supervisor.cancel(job_id).await.unwrap();
        let report = supervisor.follow(job_id, |_| {}).await.unwrap();
        assert_eq!(report.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn missing_emulator_is_a_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let disk = touch(dir.path(), "vm.qcow2");
        let tools = ToolPaths {
            qemu_system: dir.path().join("no-such-qemu"),
            ..ToolPaths::default()
        };
        let supervisor = Supervisor::spawn(SupervisorConfig::default());

        let err = launch_vm(&supervisor, &tools, &VmRequest::new(&disk))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LaunchFailed { .. }));
        assert!(supervisor.list().await.unwrap().is_empty());
    }
}
