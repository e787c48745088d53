//! Pipeline definition loaded from YAML

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or querying a pipeline definition
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read pipeline definition {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse pipeline definition: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("part '{0}' not found")]
    PartNotFound(String),
}

/// A single executable step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Human-readable step name
    pub name: String,

    /// Shell command to execute
    pub run: String,

    /// Optional free-text tag (tests, deploy, setup, ...)
    #[serde(default)]
    pub category: Option<String>,
}

/// A named list of steps
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartConfig {
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A namespace holding multiple parts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupConfig {
    #[serde(default)]
    pub parts: BTreeMap<String, PartConfig>,
}

/// A rule that auto-triggers one or more parts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schedule {
    /// Target parts by qualified name; empty means all parts
    #[serde(default)]
    pub parts: Vec<String>,

    /// Target groups; each expands to every part in the group
    #[serde(default)]
    pub groups: Vec<String>,

    /// Absolute time of day, "HH:MM"
    #[serde(default)]
    pub at: Option<String>,

    /// Repeating interval, e.g. "30m", "1h30m"
    #[serde(default)]
    pub every: Option<String>,
}

/// Top-level pipeline definition
///
/// Three shapes are accepted: a legacy flat `steps` list, a `parts` map,
/// and a `groups` map of parts. Parts and groups take precedence over the
/// legacy list when both are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Legacy flat step list
    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(default)]
    pub parts: BTreeMap<String, PartConfig>,

    #[serde(default)]
    pub groups: BTreeMap<String, GroupConfig>,

    #[serde(default)]
    pub schedules: Vec<Schedule>,
}

impl PipelineConfig {
    /// Load a pipeline definition from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a pipeline definition from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Flatten the definition into qualified part name -> steps
    ///
    /// Grouped parts are qualified as `"group.part"`. A definition with
    /// only a legacy flat step list collapses to one part named
    /// `"default"`. The map is ordered, so enumeration is deterministic.
    pub fn all_parts(&self) -> BTreeMap<String, Vec<Step>> {
        let mut result = BTreeMap::new();

        for (group_name, group) in &self.groups {
            for (part_name, part) in &group.parts {
                result.insert(format!("{}.{}", group_name, part_name), part.steps.clone());
            }
        }
        for (part_name, part) in &self.parts {
            result.insert(part_name.clone(), part.steps.clone());
        }

        if result.is_empty() && !self.steps.is_empty() {
            result.insert("default".to_string(), self.steps.clone());
        }

        result
    }

    /// Get the steps of one part by qualified name
    pub fn part(&self, name: &str) -> Result<Vec<Step>, ConfigError> {
        self.all_parts()
            .remove(name)
            .ok_or_else(|| ConfigError::PartNotFound(name.to_string()))
    }
}

/// Split a qualified part name into (group, part)
///
/// `"frontend.deploy"` -> `("frontend", "deploy")`; an unqualified name
/// has an empty group.
pub fn split_part_name(name: &str) -> (&str, &str) {
    match name.split_once('.') {
        Some((group, part)) => (group, part),
        None => ("", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_steps_become_default_part() {
        let yaml = r#"
steps:
  - name: "compile"
    run: "make build"
  - name: "test"
    run: "make test"
    category: "tests"
"#;

        let config = PipelineConfig::from_yaml(yaml).unwrap();
        let parts = config.all_parts();

        assert_eq!(parts.len(), 1);
        let steps = parts.get("default").expect("default part should exist");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].name, "compile");
        assert_eq!(steps[1].category.as_deref(), Some("tests"));
    }

    #[test]
    fn test_groups_flatten_to_qualified_names() {
        let yaml = r#"
groups:
  frontend:
    parts:
      build:
        steps:
          - name: "bundle"
            run: "npm run build"
      deploy:
        steps:
          - name: "push"
            run: "npm run deploy"
  backend:
    parts:
      build:
        steps:
          - name: "compile"
            run: "cargo build"
"#;

        let config = PipelineConfig::from_yaml(yaml).unwrap();
        let parts = config.all_parts();

        let names: Vec<_> = parts.keys().cloned().collect();
        assert_eq!(
            names,
            vec!["backend.build", "frontend.build", "frontend.deploy"]
        );
    }

    #[test]
    fn test_parts_take_precedence_over_legacy_steps() {
        let yaml = r#"
steps:
  - name: "old"
    run: "echo old"
parts:
  build:
    steps:
      - name: "new"
        run: "echo new"
"#;

        let config = PipelineConfig::from_yaml(yaml).unwrap();
        let parts = config.all_parts();

        assert_eq!(parts.len(), 1);
        assert!(parts.contains_key("build"));
        assert!(!parts.contains_key("default"));
    }

    #[test]
    fn test_load_is_idempotent() {
        let yaml = r#"
parts:
  build:
    steps:
      - name: "compile"
        run: "make"
  test:
    steps:
      - name: "check"
        run: "make test"
"#;

        let first = PipelineConfig::from_yaml(yaml).unwrap().all_parts();
        let second = PipelineConfig::from_yaml(yaml).unwrap().all_parts();

        let first_names: Vec<_> = first.keys().collect();
        let second_names: Vec<_> = second.keys().collect();
        assert_eq!(first_names, second_names);
        for (name, steps) in &first {
            let other = &second[name];
            assert_eq!(steps.len(), other.len());
            for (a, b) in steps.iter().zip(other) {
                assert_eq!(a.name, b.name);
                assert_eq!(a.run, b.run);
            }
        }
    }

    #[test]
    fn test_part_not_found() {
        let yaml = r#"
parts:
  build:
    steps: []
"#;

        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert!(config.part("build").is_ok());
        let err = config.part("deploy").unwrap_err();
        assert!(matches!(err, ConfigError::PartNotFound(name) if name == "deploy"));
    }

    #[test]
    fn test_parse_schedules() {
        let yaml = r#"
parts:
  build:
    steps: []
schedules:
  - parts: ["build"]
    at: "09:00"
  - groups: ["frontend"]
    every: "1h30m"
"#;

        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.schedules.len(), 2);
        assert_eq!(config.schedules[0].at.as_deref(), Some("09:00"));
        assert_eq!(config.schedules[1].groups, vec!["frontend"]);
        assert_eq!(config.schedules[1].every.as_deref(), Some("1h30m"));
    }

    #[test]
    fn test_malformed_yaml_is_fatal() {
        assert!(PipelineConfig::from_yaml("steps: [broken").is_err());
    }

    #[test]
    fn test_split_part_name() {
        assert_eq!(split_part_name("frontend.deploy"), ("frontend", "deploy"));
        assert_eq!(split_part_name("build"), ("", "build"));
    }
}
