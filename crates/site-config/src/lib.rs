//! Tenrankai site configuration checks
//!
//! A quick structural check of a site's TOML configuration, independent of
//! the server itself: the file must parse, carry the `server` and `app`
//! sections, and either point `app.config_storage` at a directory or carry
//! the legacy inline `templates` and `static_files` sections.

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Sections every configuration needs
pub const REQUIRED_SECTIONS: [&str; 2] = ["server", "app"];

/// Sections needed when `app.config_storage` is not used
pub const LEGACY_SECTIONS: [&str; 2] = ["templates", "static_files"];

/// Configuration files checked when none are named
pub const DEFAULT_CONFIGS: [&str; 3] = [
    "tenrankai-dot-com/config.toml",
    "tenrankai-dot-com/config.dev.toml",
    "tenrankai-dot-com/config.production.toml",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} not found")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Outcome for one file
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub path: PathBuf,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}

impl ValidationReport {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Read and parse a configuration file
pub fn load(path: &Path) -> Result<toml::Table> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(content.parse::<toml::Table>()?)
}

/// Validate one configuration file. `config_storage` is resolved relative
/// to the file's own directory.
pub fn validate_file(path: &Path) -> ValidationReport {
    let mut report = ValidationReport::new(path);

    let table = match load(path) {
        Ok(table) => table,
        Err(e) => {
            report.errors.push(e.to_string());
            return report;
        }
    };
    report.notes.push("valid TOML".to_string());

    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
    check_table(&table, base_dir, &mut report);
    debug!(
        "{}: {} error(s), {} warning(s)",
        path.display(),
        report.errors.len(),
        report.warnings.len()
    );
    report
}

fn check_table(table: &toml::Table, base_dir: &Path, report: &mut ValidationReport) {
    for section in REQUIRED_SECTIONS {
        if !table.contains_key(section) {
            report.errors.push(format!("missing required section: {}", section));
        }
    }

    let storage = table
        .get("app")
        .and_then(|app| app.as_table())
        .and_then(|app| app.get("config_storage"));

    match storage {
        Some(toml::Value::String(storage)) => {
            let full_path = base_dir.join(storage);
            if full_path.is_dir() {
                report
                    .notes
                    .push(format!("ConfigStorage directory exists: {}", storage));
            } else {
                report.warnings.push(format!(
                    "ConfigStorage directory not found: {}",
                    full_path.display()
                ));
            }
        }
        Some(other) => {
            report.errors.push(format!(
                "app.config_storage must be a string, got {}",
                other.type_str()
            ));
        }
        None => {
            for section in LEGACY_SECTIONS {
                if !table.contains_key(section) {
                    report.errors.push(format!("missing required section: {}", section));
                }
            }
        }
    }
}

/// Validate several files; the run is valid only if every file is
pub fn validate_all<P: AsRef<Path>>(paths: &[P]) -> Vec<ValidationReport> {
    paths.iter().map(|p| validate_file(p.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_config_storage_layout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("config.d")).unwrap();
        let path = write(
            dir.path(),
            "config.toml",
            "[server]\nport = 3000\n\n[app]\nconfig_storage = \"config.d\"\n",
        );

        let report = validate_file(&path);
        assert!(report.is_valid(), "{:?}", report.errors);
        assert!(report.warnings.is_empty());
        assert!(report.notes.iter().any(|n| n.contains("config.d")));
    }

    #[test]
    fn test_missing_storage_dir_is_only_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "config.toml",
            "[server]\n[app]\nconfig_storage = \"missing.d\"\n",
        );

        let report = validate_file(&path);
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_legacy_layout_requires_inline_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "config.toml", "[server]\n[app]\n[templates]\n");

        let report = validate_file(&path);
        assert!(!report.is_valid());
        assert_eq!(
            report.errors,
            vec!["missing required section: static_files".to_string()]
        );
    }

    #[test]
    fn test_missing_required_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "config.toml", "[templates]\n[static_files]\n");

        let report = validate_file(&path);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].contains("server"));
        assert!(report.errors[1].contains("app"));
    }

    #[test]
    fn test_bad_toml_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "config.toml", "[server\n");
        let report = validate_file(&path);
        assert!(!report.is_valid());
        assert!(report.errors[0].starts_with("invalid TOML"));

        let report = validate_file(&dir.path().join("absent.toml"));
        assert!(report.errors[0].ends_with("not found"));
    }

    #[test]
    fn test_non_string_storage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "config.toml", "[server]\n[app]\nconfig_storage = 5\n");
        let reports = validate_all(&[path]);
        assert!(!reports[0].is_valid());
        assert!(reports[0].errors[0].contains("integer"));
    }
}
