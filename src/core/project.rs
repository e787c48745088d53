//! Project registry: named directories that each carry a pipeline definition

use crate::core::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the pipeline definition inside a project directory
pub const PIPELINE_FILE: &str = "pipewright.yml";

/// A registered project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,

    /// Project directory, absolute or relative to the registry base dir
    pub path: String,

    #[serde(default)]
    pub description: Option<String>,
}

/// The list of all registered projects
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectsConfig {
    #[serde(default)]
    pub projects: Vec<Project>,
}

impl ProjectsConfig {
    /// Load the registry from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Look up a project by name
    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }
}

impl Project {
    /// Absolute project directory
    pub fn dir(&self, base_dir: &Path) -> PathBuf {
        let path = Path::new(&self.path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Path to the project's pipeline definition
    pub fn pipeline_path(&self, base_dir: &Path) -> PathBuf {
        self.dir(base_dir).join(PIPELINE_FILE)
    }

    /// Check the project directory and its pipeline definition exist
    pub fn validate(&self, base_dir: &Path) -> Result<(), String> {
        let dir = self.dir(base_dir);
        if !dir.is_dir() {
            return Err(format!("project path does not exist: {}", dir.display()));
        }
        let pipeline = dir.join(PIPELINE_FILE);
        if !pipeline.is_file() {
            return Err(format!(
                "{} not found in project directory {}",
                PIPELINE_FILE,
                dir.display()
            ));
        }
        Ok(())
    }
}
