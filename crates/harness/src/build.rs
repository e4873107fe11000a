//! Make sure the server binary exists before any suite runs

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::info;

use crate::error::{HarnessError, HarnessResult};

/// How to produce the binary when it is missing
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Source checkout the build runs in
    pub source_dir: PathBuf,

    /// Binary expected after a successful build
    pub binary_path: PathBuf,

    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl BuildConfig {
    /// `cargo build --release` in `source_dir`
    pub fn cargo_release(source_dir: PathBuf, binary_path: PathBuf) -> Self {
        Self {
            source_dir,
            binary_path,
            program: "cargo".to_string(),
            args: vec!["build".to_string(), "--release".to_string()],
            timeout: Duration::from_secs(900),
        }
    }
}

/// Return the binary path, building it first if it does not exist.
/// Any build problem is a `BuildFailure` carrying the tool's stderr.
pub async fn ensure_binary(config: &BuildConfig) -> HarnessResult<PathBuf> {
    if config.binary_path.is_file() {
        return Ok(config.binary_path.clone());
    }

    info!(
        "Building {} ({} {} in {})",
        config.binary_path.display(),
        config.program,
        config.args.join(" "),
        config.source_dir.display()
    );

    let output = Command::new(&config.program)
        .args(&config.args)
        .current_dir(&config.source_dir)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = match timeout(config.timeout, output).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(HarnessError::BuildFailure(format!(
                "could not run {}: {}",
                config.program, e
            )))
        }
        Err(_) => {
            return Err(HarnessError::BuildFailure(format!(
                "{} did not finish within {:?}",
                config.program, config.timeout
            )))
        }
    };

    if !output.status.success() {
        return Err(HarnessError::BuildFailure(format!(
            "{} exited with {}:\n{}",
            config.program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim_end()
        )));
    }

    require_file(&config.binary_path)?;
    info!("Build successful");
    Ok(config.binary_path.clone())
}

fn require_file(path: &Path) -> HarnessResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(HarnessError::BuildFailure(format!(
            "build succeeded but {} does not exist",
            path.display()
        )))
    }
}
