//! Configuration file support for Lattice.
//!
//! Lattice reads two configuration file locations:
//! - Global: `<home>/config.toml` - User-wide defaults
//! - Project: `.lattice/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config. Both are separate
//! from `Lattice.toml`, which describes the project itself.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::configuration::Value;

/// Lattice tool configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Evaluation settings
    pub eval: EvalConfig,

    /// Output settings
    pub output: OutputConfig,
}

/// Evaluation-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Output root override (relative paths are taken from the project root)
    pub outroot: Option<PathBuf>,

    /// Values layered over the manifest's `[env]`
    pub env: BTreeMap<String, Value>,
}

/// Output-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Print reports as JSON by default; unset means no preference
    pub json: Option<bool>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.eval.outroot.is_some() {
            self.eval.outroot = other.eval.outroot;
        }
        // env merges key by key
        self.eval.env.extend(other.eval.env);

        if other.output.json.is_some() {
            self.output.json = other.output.json;
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.lattice/config.toml)
/// 2. Global config (<home>/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        config.merge(Config::load_or_default(global_path));
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_config() {
        let config: Config = toml::from_str(
            r#"
            [eval]
            outroot = "/tmp/out"

            [eval.env]
            cc = "gcc"

            [output]
            json = true
            "#,
        )
        .unwrap();

        assert_eq!(config.eval.outroot, Some(PathBuf::from("/tmp/out")));
        assert_eq!(config.eval.env["cc"], Value::from("gcc"));
        assert_eq!(config.output.json, Some(true));
    }

    #[test]
    fn test_project_overrides_global() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("global.toml");
        let project = tmp.path().join("project.toml");

        std::fs::write(
            &global,
            "[eval]\noutroot = \"global-out\"\n[eval.env]\ncc = \"gcc\"\nopt = \"-O1\"\n",
        )
        .unwrap();
        std::fs::write(&project, "[eval.env]\nopt = \"-O3\"\n").unwrap();

        let config = load_config(&global, &project);
        assert_eq!(config.eval.outroot, Some(PathBuf::from("global-out")));
        assert_eq!(config.eval.env["cc"], Value::from("gcc"));
        assert_eq!(config.eval.env["opt"], Value::from("-O3"));
        assert_eq!(config.output.json, None);
    }

    #[test]
    fn test_project_can_turn_json_off() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("global.toml");
        let project = tmp.path().join("project.toml");

        std::fs::write(&global, "[output]\njson = true\n").unwrap();
        std::fs::write(&project, "[output]\njson = false\n").unwrap();
        assert_eq!(load_config(&global, &project).output.json, Some(false));

        std::fs::write(&project, "[eval]\n").unwrap();
        assert_eq!(load_config(&global, &project).output.json, Some(true));
    }

    #[test]
    fn test_missing_files_give_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("a.toml"), &tmp.path().join("b.toml"));
        assert!(config.eval.outroot.is_none());
        assert!(config.eval.env.is_empty());
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[eval\n").unwrap();

        assert!(Config::load(&path).is_err());
        assert!(Config::load_or_default(&path).eval.env.is_empty());
    }
}
