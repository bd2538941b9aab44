use clap::{ArgEnum, Parser, Subcommand};
use std::path::PathBuf;
use vmdeck::disk::{Allocation, DiskFormat, SizeUnit};

/// Create disk images, boot virtual machines and manage docker images
#[derive(Debug, Parser)]
#[clap(name = "vmdeck", version)]
pub struct ArgParser {
    /// Path to vmdeck.toml (falls back to $VMDECK_CONFIG, then ./vmdeck.toml)
    #[clap(long)]
    pub config: Option<PathBuf>,
    /// Log verbosity, overrides $VMDECK_LOG
    #[clap(long, arg_enum)]
    pub log_level: Option<LogLevel>,
    /// The sub-command to use
    #[clap(subcommand)]
    pub sub_command: SubCommand,
}

#[derive(Clone, Debug, PartialEq, Subcommand)]
pub enum SubCommand {
    /// virtual disk images
    #[clap(subcommand)]
    Disk(DiskCommand),
    /// virtual machines
    #[clap(subcommand)]
    Vm(VmCommand),
    /// docker images and containers
    #[clap(subcommand)]
    Docker(DockerCommand),
    /// Dockerfile authoring
    #[clap(subcommand)]
    Dockerfile(DockerfileCommand),
}

#[derive(Clone, Debug, PartialEq, Subcommand)]
pub enum DiskCommand {
    /// create a new disk image with qemu-img
    Create {
        #[clap(long)]
        /// where to write the image
        path: PathBuf,

        #[clap(long)]
        /// image size, in --unit
        size: f64,

        #[clap(long, arg_enum, ignore_case = true, default_value = "g")]
        unit: UnitArg,

        #[clap(long, arg_enum, default_value = "qcow2")]
        format: FormatArg,

        #[clap(long, arg_enum, default_value = "dynamic")]
        allocation: AllocationArg,
    },
}

#[derive(Clone, Debug, PartialEq, Subcommand)]
pub enum VmCommand {
    /// boot a virtual machine and stream its output until it exits
    Launch {
        #[clap(long, default_value_t = 2)]
        cpus: u32,

        #[clap(long, default_value_t = 2048)]
        /// memory in MB
        memory: u64,

        #[clap(long)]
        /// disk image to boot from
        disk: PathBuf,

        #[clap(long, arg_enum)]
        /// disk format, guessed from the extension when omitted
        format: Option<FormatArg>,

        #[clap(long)]
        /// ISO image to attach as a CD-ROM
        iso: Option<PathBuf>,

        #[clap(long, default_value = "gtk")]
        display: String,

        #[clap(long, default_value = "q35")]
        machine: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
pub enum DockerCommand {
    /// search Docker Hub
    Search { query: String },
    /// pull an image, streaming progress
    Pull { image: String },
    /// build an image from a Dockerfile, streaming the build log
    Build {
        #[clap(long)]
        dockerfile: PathBuf,

        #[clap(long)]
        tag: String,
    },
    /// list local images
    Images {
        #[clap(long)]
        /// only images whose reference contains this term
        filter: Option<String>,
    },
    /// list running containers
    Ps,
    /// stop a running container
    Stop { id: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
pub enum DockerfileCommand {
    /// write a Dockerfile, from a template or an existing file
    New {
        #[clap(long)]
        dir: PathBuf,

        #[clap(long)]
        /// copy content from this file instead of the built-in template
        from: Option<PathBuf>,

        #[clap(long)]
        /// replace an existing Dockerfile
        force: bool,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ArgEnum)]
pub enum FormatArg {
    Qcow2,
    Raw,
    Vdi,
    Vmdk,
}

impl From<FormatArg> for DiskFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Qcow2 => DiskFormat::Qcow2,
            FormatArg::Raw => DiskFormat::Raw,
            FormatArg::Vdi => DiskFormat::Vdi,
            FormatArg::Vmdk => DiskFormat::Vmdk,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ArgEnum)]
pub enum AllocationArg {
    /// grow on demand
    Dynamic,
    /// reserve space up front
    Fixed,
}

impl From<AllocationArg> for Allocation {
    fn from(arg: AllocationArg) -> Self {
        match arg {
            AllocationArg::Dynamic => Allocation::Dynamic,
            AllocationArg::Fixed => Allocation::Fixed,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ArgEnum)]
pub enum UnitArg {
    G,
    M,
}

impl From<UnitArg> for SizeUnit {
    fn from(arg: UnitArg) -> Self {
        match arg {
            UnitArg::G => SizeUnit::G,
            UnitArg::M => SizeUnit::M,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ArgEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_disk_create_with_defaults() {
        let args = ArgParser::parse_from([
            "vmdeck", "disk", "create", "--path", "vm.qcow2", "--size", "20",
        ]);
        assert_eq!(
            args.sub_command,
            SubCommand::Disk(DiskCommand::Create {
                path: PathBuf::from("vm.qcow2"),
                size: 20.0,
                unit: UnitArg::G,
                format: FormatArg::Qcow2,
                allocation: AllocationArg::Dynamic,
            })
        );
    }

    #[test]
    fn parses_vm_launch() {
        let args = ArgParser::parse_from([
            "vmdeck", "--log-level", "debug", "vm", "launch", "--cpus", "4", "--memory", "8192",
            "--disk", "win.img", "--format", "raw", "--iso", "win.iso",
        ]);
        assert_eq!(args.log_level, Some(LogLevel::Debug));
        match args.sub_command {
            SubCommand::Vm(VmCommand::Launch {
                cpus,
                memory,
                format,
                iso,
                display,
                ..
            }) => {
                assert_eq!((cpus, memory), (4, 8192));
                assert_eq!(format, Some(FormatArg::Raw));
                assert_eq!(iso, Some(PathBuf::from("win.iso")));
                assert_eq!(display, "gtk");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_docker_commands() {
        let args = ArgParser::parse_from(["vmdeck", "docker", "images", "--filter", "py"]);
        assert_eq!(
            args.sub_command,
            SubCommand::Docker(DockerCommand::Images {
                filter: Some("py".into())
            })
        );
        let args =
            ArgParser::parse_from(["vmdeck", "dockerfile", "new", "--dir", "app", "--force"]);
        assert_eq!(
            args.sub_command,
            SubCommand::Dockerfile(DockerfileCommand::New {
                dir: PathBuf::from("app"),
                from: None,
                force: true,
            })
        );
    }

    #[test]
    fn rejects_unknown_formats() {
        assert!(ArgParser::try_parse_from([
            "vmdeck", "disk", "create", "--path", "a.vhd", "--size", "1", "--format", "vhd"
        ])
        .is_err());
    }
}
