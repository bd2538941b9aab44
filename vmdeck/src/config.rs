//! `vmdeck.toml` loading.
//!
//! Priority for choosing the file:
//! 1. an explicit path (`--config`)
//! 2. the `VMDECK_CONFIG` environment variable
//! 3. `vmdeck.toml` in the current directory, if present
//!
//! An explicitly named file must exist; without one, built-in defaults apply.

use crate::errors::{Error, Result};
use crate::tools::ToolPaths;
use joblib::SupervisorConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const CONFIG_ENV: &str = "VMDECK_CONFIG";

const MAX_WAIT_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub tools: ToolPaths,
    pub supervisor: SupervisorSettings,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorSettings {
    pub grace_period_ms: u64,
    pub drain_timeout_ms: u64,
    pub transcript_limit: usize,
    pub message_capacity: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        let defaults = SupervisorConfig::default();
        Self {
            grace_period_ms: defaults.grace_period.as_millis() as u64,
            drain_timeout_ms: defaults.drain_timeout.as_millis() as u64,
            transcript_limit: defaults.transcript_limit,
            message_capacity: defaults.message_capacity,
        }
    }
}

impl From<&SupervisorSettings> for SupervisorConfig {
    fn from(settings: &SupervisorSettings) -> Self {
        SupervisorConfig {
            message_capacity: settings.message_capacity,
            grace_period: Duration::from_millis(settings.grace_period_ms),
            drain_timeout: Duration::from_millis(settings.drain_timeout_ms),
            transcript_limit: settings.transcript_limit,
        }
    }
}

impl Config {
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig::from(&self.supervisor)
    }

    fn validate(self) -> Result<Self> {
        if self.supervisor.message_capacity == 0 {
            return Err(Error::Config(
                "supervisor.message_capacity must be at least 1".into(),
            ));
        }
        let waits = [
            ("grace_period_ms", self.supervisor.grace_period_ms),
            ("drain_timeout_ms", self.supervisor.drain_timeout_ms),
        ];
        for (name, ms) in waits {
            if ms > MAX_WAIT_MS {
                return Err(Error::Config(format!(
                    "supervisor.{} must be at most {} (one day)",
                    name, MAX_WAIT_MS
                )));
            }
        }
        let tools = [
            ("qemu_img", &self.tools.qemu_img),
            ("qemu_system", &self.tools.qemu_system),
            ("docker", &self.tools.docker),
        ];
        for (name, path) in tools {
            if path.as_os_str().is_empty() {
                return Err(Error::Config(format!("tools.{} must not be empty", name)));
            }
        }
        Ok(self)
    }
}

/// Parse and validate a config file.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    debug!(path = %path.display(), "loaded config");
    config.validate()
}

/// Resolve which config applies and load it.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return load_from_path(path);
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return load_from_path(PathBuf::from(path));
    }
    let default_path = default_config_path();
    if default_path.is_file() {
        load_from_path(default_path)
    } else {
        Ok(Config::default())
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("vmdeck.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [tools]
            qemu_img = "/opt/qemu/bin/qemu-img"

            [supervisor]
            grace_period_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.tools.qemu_img, PathBuf::from("/opt/qemu/bin/qemu-img"));
        assert_eq!(config.tools.docker, PathBuf::from("docker"));

        let supervisor = config.supervisor_config();
        assert_eq!(supervisor.grace_period, Duration::from_millis(250));
        assert_eq!(
            supervisor.transcript_limit,
            SupervisorConfig::default().transcript_limit
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = toml::from_str::<Config>("[tools]\nqemu = \"x\"\n").unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn explicit_file_is_loaded_and_validated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[supervisor]\nmessage_capacity = 0").unwrap();
        assert!(matches!(load(Some(file.path())), Err(Error::Config(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[tools]\ndocker = \"/usr/local/bin/docker\"").unwrap();
        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.tools.docker, PathBuf::from("/usr/local/bin/docker"));
    }

    #[test]
    fn oversized_waits_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[supervisor]\ndrain_timeout_ms = {}", i64::MAX).unwrap();
        match load(Some(file.path())) {
            Err(Error::Config(msg)) => assert!(msg.contains("drain_timeout_ms")),
            other => panic!("expected a config error, got {:?}", other),
        }

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[supervisor]\ngrace_period_ms = 86400001").unwrap();
        assert!(matches!(load(Some(file.path())), Err(Error::Config(_))));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(matches!(
            load(Some(Path::new("/nonexistent/vmdeck.toml"))),
            Err(Error::Io(_))
        ));
    }
}
