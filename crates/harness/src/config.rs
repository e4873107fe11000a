//! Harness configuration
//!
//! Defaults match the site checkout layout used in CI. A TOML file can
//! override any of them, and command-line flags override the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::build::BuildConfig;
use crate::error::HarnessResult;
use crate::readiness::ProbePolicy;
use crate::runner::RunnerConfig;
use crate::server::ServerConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Path to the tenrankai binary
    pub binary: PathBuf,

    /// Site directory the server runs in
    pub site_dir: PathBuf,

    /// Server configuration file, relative to `site_dir`
    pub config: PathBuf,

    /// Port for every suite (0 = pick a free port per suite)
    pub port: u16,

    /// Auto-quit passed to the server
    pub quit_after_secs: Option<u64>,

    /// Source checkout to build from when the binary is missing
    pub build_dir: Option<PathBuf>,
    pub build_timeout_secs: u64,

    /// SIGTERM to SIGKILL grace period
    pub grace_period_ms: u64,

    pub request_timeout_secs: u64,

    pub probe: ProbeSettings,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let server = ServerConfig::default();
        Self {
            binary: server.binary_path,
            site_dir: server.site_dir,
            config: server.config_path,
            port: server.port,
            quit_after_secs: None,
            build_dir: None,
            build_timeout_secs: 900,
            grace_period_ms: server.grace_period.as_millis() as u64,
            request_timeout_secs: 10,
            probe: ProbeSettings::default(),
        }
    }
}

/// Readiness polling schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    pub max_attempts: u32,
    pub interval_ms: u64,
    pub attempt_timeout_ms: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval_ms: 500,
            attempt_timeout_ms: 2000,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when the file
    /// does not exist
    pub fn load(path: &Path) -> HarnessResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// The binary as seen from inside `site_dir`, where the server runs
    pub fn binary_for_server(&self) -> PathBuf {
        if self.binary.is_absolute() {
            self.binary.clone()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&self.binary))
                .unwrap_or_else(|_| self.binary.clone())
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            binary_path: self.binary_for_server(),
            site_dir: self.site_dir.clone(),
            config_path: self.config.clone(),
            port: self.port,
            quit_after: self.quit_after_secs.map(Duration::from_secs),
            grace_period: Duration::from_millis(self.grace_period_ms),
            ..Default::default()
        }
    }

    pub fn probe_policy(&self) -> ProbePolicy {
        ProbePolicy {
            max_attempts: self.probe.max_attempts,
            interval: Duration::from_millis(self.probe.interval_ms),
            attempt_timeout: Duration::from_millis(self.probe.attempt_timeout_ms),
        }
    }

    pub fn runner_config(&self, keep_running: bool) -> RunnerConfig {
        RunnerConfig {
            server: self.server_config(),
            probe: self.probe_policy(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            keep_running,
        }
    }

    pub fn build_config(&self) -> Option<BuildConfig> {
        self.build_dir.as_ref().map(|dir| {
            let mut build = BuildConfig::cargo_release(dir.clone(), self.binary_for_server());
            build.timeout = Duration::from_secs(self.build_timeout_secs);
            build
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = HarnessConfig::load(Path::new("/nonexistent/harness.toml")).unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.port, 3456);
        assert_eq!(config.probe.max_attempts, 10);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.toml");
        std::fs::write(
            &path,
            r#"
port = 3460
quit_after_secs = 30

[probe]
interval_ms = 250
"#,
        )
        .unwrap();

        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.port, 3460);
        assert_eq!(config.quit_after_secs, Some(30));
        assert_eq!(config.probe.interval_ms, 250);
        assert_eq!(config.probe.max_attempts, 10);
        assert_eq!(config.site_dir, PathBuf::from("tenrankai-dot-com"));

        let server = config.server_config();
        assert_eq!(server.quit_after, Some(Duration::from_secs(30)));
        assert!(server.binary_path.is_absolute());
        assert_eq!(config.probe_policy().interval, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();
        assert!(HarnessConfig::load(&path).is_err());
    }

    #[test]
    fn test_build_config_only_with_build_dir() {
        let mut config = HarnessConfig::default();
        assert!(config.build_config().is_none());

        config.build_dir = Some(PathBuf::from("tenrankai"));
        let build = config.build_config().unwrap();
        assert_eq!(build.program, "cargo");
        assert_eq!(build.args, vec!["build", "--release"]);
        assert_eq!(build.timeout, Duration::from_secs(900));
    }
}
