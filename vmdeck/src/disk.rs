//! Virtual disk image creation through `qemu-img`.

use crate::errors::{Error, Result};
use crate::tools::ToolPaths;
use joblib::{JobSpec, Stream, Supervisor};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

pub const RAW_PREALLOCATION_HINT: &str =
    "Raw format doesn't support full preallocation. Use Dynamic allocation instead.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiskFormat {
    Qcow2,
    Raw,
    Vdi,
    Vmdk,
}

impl DiskFormat {
    pub const ALL: [DiskFormat; 4] = [
        DiskFormat::Qcow2,
        DiskFormat::Raw,
        DiskFormat::Vdi,
        DiskFormat::Vmdk,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DiskFormat::Qcow2 => "qcow2",
            DiskFormat::Raw => "raw",
            DiskFormat::Vdi => "vdi",
            DiskFormat::Vmdk => "vmdk",
        }
    }

    /// Guess the format from a file extension, e.g. `disk.qcow2`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        ext.parse().ok()
    }
}

impl FromStr for DiskFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        DiskFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == lowered)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "unsupported disk format '{}' (expected qcow2, raw, vdi or vmdk)",
                    s
                ))
            })
    }
}

impl fmt::Display for DiskFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Allocation {
    Dynamic,
    Fixed,
}

impl FromStr for Allocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dynamic" => Ok(Allocation::Dynamic),
            "fixed" => Ok(Allocation::Fixed),
            _ => Err(Error::Validation(format!(
                "unsupported allocation '{}' (expected dynamic or fixed)",
                s
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeUnit {
    G,
    M,
}

impl FromStr for SizeUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "G" | "g" => Ok(SizeUnit::G),
            "M" | "m" => Ok(SizeUnit::M),
            _ => Err(Error::Validation(format!(
                "unsupported size unit '{}' (expected G or M)",
                s
            ))),
        }
    }
}

impl fmt::Display for SizeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeUnit::G => f.write_str("G"),
            SizeUnit::M => f.write_str("M"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DiskRequest {
    pub path: PathBuf,
    pub size: f64,
    pub unit: SizeUnit,
    pub format: DiskFormat,
    pub allocation: Allocation,
}

impl DiskRequest {
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(Error::Validation("disk path is required".into()));
        }
        if !self.size.is_finite() || self.size <= 0.0 {
            return Err(Error::Validation(
                "disk size must be a positive number".into(),
            ));
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(Error::Validation(format!(
                    "directory {} does not exist",
                    parent.display()
                )));
            }
        }
        Ok(())
    }

    /// The `-o` option for this format/allocation pair, if any.
    ///
    /// Only qcow2 gets one. Raw images are never given `preallocation=full`;
    /// vdi and vmdk take their defaults.
    pub fn preallocation(&self) -> Option<&'static str> {
        match (self.format, self.allocation) {
            (DiskFormat::Qcow2, Allocation::Dynamic) => Some("preallocation=off"),
            (DiskFormat::Qcow2, Allocation::Fixed) => Some("preallocation=metadata"),
            (DiskFormat::Raw | DiskFormat::Vdi | DiskFormat::Vmdk, _) => None,
        }
    }

    pub fn size_arg(&self) -> String {
        format!("{}{}", self.size, self.unit)
    }

    /// `create -f <format> [-o <options>] <path> <size><unit>`
    pub fn command(&self, tools: &ToolPaths) -> JobSpec {
        let mut spec = tools.qemu_img().args(["create", "-f", self.format.as_str()]);
        if let Some(options) = self.preallocation() {
            spec = spec.arg("-o").arg(options);
        }
        spec.arg(&self.path).arg(self.size_arg())
    }
}

#[derive(Clone, Debug)]
pub struct DiskCreated {
    pub command: String,
    pub output: String,
}

/// Create a disk image, waiting for `qemu-img` to finish.
pub async fn create_disk(
    supervisor: &Supervisor,
    tools: &ToolPaths,
    request: &DiskRequest,
) -> Result<DiskCreated> {
    request.validate()?;
    let spec = request.command(tools);
    let command = spec.display();
    info!(%command, "creating disk image");

    match crate::run_checked(supervisor, spec).await {
        Ok(report) => Ok(DiskCreated {
            command,
            output: report.text(Stream::Stdout),
        }),
        Err(Error::RuntimeFailure {
            command,
            termination,
            output,
            ..
        }) => {
            let hint = failure_hint(request.format, output.iter().map(|line| line.text()));
            Err(Error::RuntimeFailure {
                command,
                termination,
                output,
                hint,
            })
        }
        Err(e) => Err(e),
    }
}

fn failure_hint<I, S>(format: DiskFormat, output: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let complains_about_preallocation = output
        .into_iter()
        .any(|line| line.as_ref().to_ascii_lowercase().contains("preallocation"));
    (format == DiskFormat::Raw && complains_about_preallocation)
        .then(|| RAW_PREALLOCATION_HINT.to_string())
}
