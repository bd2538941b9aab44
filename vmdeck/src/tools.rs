//! Where the external tools live.

use joblib::JobSpec;
use serde::Deserialize;
use std::path::PathBuf;

/// Locations of the external binaries. Bare names are looked up on `PATH`
/// when a job starts; anything with a path separator is used as is.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ToolPaths {
    pub qemu_img: PathBuf,
    pub qemu_system: PathBuf,
    pub docker: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            qemu_img: PathBuf::from("qemu-img"),
            qemu_system: PathBuf::from("qemu-system-x86_64"),
            docker: PathBuf::from("docker"),
        }
    }
}

impl ToolPaths {
    pub fn qemu_img(&self) -> JobSpec {
        JobSpec::new(&self.qemu_img)
    }

    pub fn qemu_system(&self) -> JobSpec {
        JobSpec::new(&self.qemu_system)
    }

    pub fn docker(&self) -> JobSpec {
        JobSpec::new(&self.docker)
    }
}
