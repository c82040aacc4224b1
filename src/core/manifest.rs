//! Declaration files: the `Lattice.toml` project manifest and per-package
//! `BUILD.toml` files.
//!
//! The manifest marks the project root and holds project-wide settings. Every
//! directory below the root that contains a `BUILD.toml` is a package, and the
//! file lists that package's targets.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::configuration::{Delta, Value};

/// Project manifest file name.
pub const MANIFEST_NAME: &str = "Lattice.toml";

/// Package declaration file name.
pub const BUILD_FILE_NAME: &str = "BUILD.toml";

/// Output root used when neither the manifest nor the config names one,
/// relative to the project root.
pub const DEFAULT_OUTROOT: &str = ".lattice/out";

/// Error locating a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("could not find Lattice.toml in {} or any parent directory", .dir.display())]
    NotFound { dir: PathBuf },
}

/// Find the manifest in `dir`, without searching upward.
pub fn find_manifest(dir: &Path) -> Result<PathBuf, ManifestError> {
    let path = dir.join(MANIFEST_NAME);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ManifestError::NotFound {
            dir: dir.to_path_buf(),
        })
    }
}

/// The `[project]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectSection {
    /// Output root, relative to the project root unless absolute
    #[serde(default)]
    pub outroot: Option<PathBuf>,
}

/// The parsed `Lattice.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub project: ProjectSection,

    /// Initial configuration values
    #[serde(default)]
    pub env: BTreeMap<String, Value>,
}

impl Manifest {
    /// Load a manifest from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("failed to parse manifest: {}", path.display()))
    }

    /// Parse manifest text.
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

/// Which rule a declared target uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    #[default]
    Group,
    Action,
}

fn default_true() -> bool {
    true
}

/// One `[[target]]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetDecl {
    pub name: String,

    #[serde(default)]
    pub kind: TargetKind,

    #[serde(default = "default_true")]
    pub transparent: bool,

    #[serde(default)]
    pub deps: Vec<String>,

    #[serde(default)]
    pub down: Delta,

    #[serde(default)]
    pub local: Delta,

    #[serde(default)]
    pub using: Delta,

    #[serde(default)]
    pub inputs: Vec<String>,

    #[serde(default)]
    pub outputs: Vec<String>,

    #[serde(default)]
    pub command: Vec<String>,
}

impl TargetDecl {
    /// Whether any action-only field is set.
    pub fn has_action_fields(&self) -> bool {
        !self.inputs.is_empty() || !self.outputs.is_empty() || !self.command.is_empty()
    }
}

/// The parsed `BUILD.toml` of one package.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildFile {
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetDecl>,
}

impl BuildFile {
    /// Load a build file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read build file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("failed to parse build file: {}", path.display()))
    }

    /// Parse build file text.
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}
