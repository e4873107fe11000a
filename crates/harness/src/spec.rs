//! Endpoint expectations and suite definitions
//!
//! Suites are plain data. The built-in Tenrankai tables live in
//! [`crate::catalog`]; additional suites can be loaded from YAML files.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{HarnessError, HarnessResult};

/// A single endpoint expectation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Request path, including any query string
    pub path: String,

    /// Human-readable name used in the report
    pub name: String,

    /// Expected HTTP status code
    #[serde(default = "default_status")]
    pub expected_status: u16,

    /// Substring that must occur in the response body
    #[serde(default)]
    pub expected_content: Option<String>,

    /// Keys that must be present in the JSON body with equal values.
    /// Keys not listed here are ignored.
    #[serde(default)]
    pub expected_json: Option<Map<String, Value>>,

    /// Keys that must be present in the JSON body with the given type
    #[serde(default)]
    pub expected_json_kinds: BTreeMap<String, JsonKind>,
}

fn default_status() -> u16 {
    200
}

impl TestCase {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            expected_status: default_status(),
            expected_content: None,
            expected_json: None,
            expected_json_kinds: BTreeMap::new(),
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.expected_content = Some(content.into());
        self
    }

    pub fn json_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.expected_json
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }

    pub fn json_kind(mut self, key: impl Into<String>, kind: JsonKind) -> Self {
        self.expected_json_kinds.insert(key.into(), kind);
        self
    }

    /// Whether the body has to be parsed as JSON at all
    pub fn expects_json(&self) -> bool {
        self.expected_json.as_ref().is_some_and(|m| !m.is_empty())
            || !self.expected_json_kinds.is_empty()
    }
}

/// JSON value type used by shape expectations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonKind {
    Array,
    Object,
    String,
    Number,
    Bool,
    Null,
}

impl JsonKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Array(_) => JsonKind::Array,
            Value::Object(_) => JsonKind::Object,
            Value::String(_) => JsonKind::String,
            Value::Number(_) => JsonKind::Number,
            Value::Bool(_) => JsonKind::Bool,
            Value::Null => JsonKind::Null,
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        Self::of(value) == *self
    }
}

impl fmt::Display for JsonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JsonKind::Array => "array",
            JsonKind::Object => "object",
            JsonKind::String => "string",
            JsonKind::Number => "number",
            JsonKind::Bool => "bool",
            JsonKind::Null => "null",
        };
        f.write_str(name)
    }
}

/// A named, ordered group of cases sharing one server instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSuite {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Port override for this suite
    #[serde(default)]
    pub port: Option<u16>,

    /// Server configuration file override for this suite
    #[serde(default)]
    pub config: Option<PathBuf>,

    pub cases: Vec<TestCase>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>, cases: Vec<TestCase>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            port: None,
            config: None,
            cases,
        }
    }

    /// Parse one YAML document holding either a single suite or a list
    pub fn from_yaml(yaml: &str) -> HarnessResult<Vec<Self>> {
        let file: SuiteFile = serde_yaml::from_str(yaml)?;
        let suites = match file {
            SuiteFile::One(suite) => vec![suite],
            SuiteFile::Many { suites } => suites,
        };

        for suite in &suites {
            if suite.cases.is_empty() {
                return Err(HarnessError::SuiteParse(format!(
                    "suite '{}' has no cases",
                    suite.name
                )));
            }
            if let Some(case) = suite.cases.iter().find(|c| !c.path.starts_with('/')) {
                return Err(HarnessError::SuiteParse(format!(
                    "case '{}' in suite '{}' has a path not starting with '/': {}",
                    case.name, suite.name, case.path
                )));
            }
        }

        Ok(suites)
    }

    pub fn from_file(path: &Path) -> HarnessResult<Vec<Self>> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| HarnessError::SuiteParse(format!("{}: {}", path.display(), e)))
    }

    /// Load suites from a YAML file, or every YAML file under a directory
    /// in path order
    pub fn load(path: &Path) -> HarnessResult<Vec<Self>> {
        if path.is_file() {
            return Self::from_file(path);
        }

        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(HarnessError::SuiteParse(format!(
                "no suite files found under {}",
                path.display()
            )));
        }

        let mut suites = Vec::new();
        for file in files {
            suites.extend(Self::from_file(&file)?);
        }
        Ok(suites)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SuiteFile {
    Many { suites: Vec<TestSuite> },
    One(TestSuite),
}
