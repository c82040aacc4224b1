//! Target identifiers - `//path/to/package[:name]`.
//!
//! An Identifier names a target, and can also be punned as a package name
//! when the target part is omitted. `//foo/bar` refers to the `bar` target
//! inside the `foo/bar` package.

use std::fmt;
use std::str::FromStr;

use miette::Diagnostic as MietteDiagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const PREFIX: &str = "//";

/// Malformed identifier text.
#[derive(Debug, Clone, PartialEq, Eq, Error, MietteDiagnostic)]
#[error("bad identifier `{input}`: {reason}")]
#[diagnostic(
    code(lattice::identifier::parse),
    help("identifiers look like `//path/to/package` or `//path/to/package:target`")
)]
pub struct ParseError {
    pub input: String,
    pub reason: &'static str,
}

/// The canonical name of a target (or package).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    package_relpath: String,
    target_name: Option<String>,
}

impl Identifier {
    /// Assemble an identifier from its parts.
    pub fn new(package_relpath: impl Into<String>, target_name: Option<String>) -> Self {
        Identifier {
            package_relpath: package_relpath.into(),
            target_name,
        }
    }

    /// Identifier for a named target within a package.
    pub fn target(package_relpath: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(package_relpath, Some(name.into()))
    }

    /// Parse a textual identifier.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let rest = text.strip_prefix(PREFIX).ok_or_else(|| ParseError {
            input: text.to_string(),
            reason: "missing `//` prefix",
        })?;

        let mut parts = rest.split(':');
        let relpath = parts.next().unwrap_or_default();
        let name = parts.next();
        if parts.next().is_some() {
            return Err(ParseError {
                input: text.to_string(),
                reason: "too many colons",
            });
        }

        Ok(Identifier::new(relpath, name.map(str::to_string)))
    }

    /// Parse an identifier that may be relative to `package_relpath`.
    ///
    /// `:name` refers to the target `name` in the given package; anything
    /// else must be a full identifier.
    pub fn parse_relative(text: &str, package_relpath: &str) -> Result<Self, ParseError> {
        match text.strip_prefix(':') {
            Some(name) if name.contains(':') => Err(ParseError {
                input: text.to_string(),
                reason: "too many colons",
            }),
            Some(name) => Ok(Identifier::target(package_relpath, name)),
            None => Self::parse(text),
        }
    }

    /// Path of the package from the project root.
    pub fn package_relpath(&self) -> &str {
        &self.package_relpath
    }

    /// The explicit target name, if one was given.
    pub fn target_name(&self) -> Option<&str> {
        self.target_name.as_deref()
    }

    /// The target name, defaulting to the last segment of the package path.
    pub fn target_name_or_default(&self) -> &str {
        match &self.target_name {
            Some(name) => name,
            None => self
                .package_relpath
                .rsplit('/')
                .next()
                .unwrap_or(&self.package_relpath),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target_name {
            Some(name) => write!(f, "{}{}:{}", PREFIX, self.package_relpath, name),
            None => write!(f, "{}{}", PREFIX, self.package_relpath),
        }
    }
}

impl FromStr for Identifier {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identifier::parse(s)
    }
}

impl Serialize for Identifier {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Identifier::parse(&s).map_err(serde::de::Error::custom)
    }
}
