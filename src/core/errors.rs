//! Build-graph error types and diagnostics.

use std::fmt;

use thiserror::Error;

use crate::core::identifier::{Identifier, ParseError};
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Which half of an identifier failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Package,
    Target,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Package => write!(f, "package"),
            Missing::Target => write!(f, "target"),
        }
    }
}

/// Error raised while building or evaluating the target graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("duplicate package: `//{relpath}`")]
    DuplicatePackage { relpath: String },

    #[error("duplicate target: `{identifier}`")]
    DuplicateTarget { identifier: Identifier },

    #[error("no such {missing} for `{identifier}`")]
    NotFound {
        identifier: Identifier,
        missing: Missing,
    },

    #[error("dependency cycle through `{}`", .path.first().map(ToString::to_string).unwrap_or_default())]
    Cycle { path: Vec<Identifier> },

    #[error("`deps` of `{target}` must be a list of identifiers, found {found}")]
    InvalidDependencies {
        target: Identifier,
        found: &'static str,
    },
}

impl GraphError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            GraphError::Parse(err) => Diagnostic::error(err.to_string())
                .with_suggestion("Write identifiers as `//path/to/package[:target]`"),

            GraphError::DuplicatePackage { relpath } => {
                Diagnostic::error(format!("package `//{}` is declared twice", relpath))
                    .with_suggestion("Each directory may hold at most one package")
            }

            GraphError::DuplicateTarget { identifier } => {
                Diagnostic::error(format!("target `{}` is declared twice", identifier))
                    .with_suggestion("Rename one of the targets")
            }

            GraphError::NotFound {
                identifier,
                missing,
            } => {
                let detail = match missing {
                    Missing::Package => {
                        format!("no package at `//{}`", identifier.package_relpath())
                    }
                    Missing::Target => format!(
                        "package `//{}` has no target named `{}`",
                        identifier.package_relpath(),
                        identifier.target_name_or_default()
                    ),
                };
                Diagnostic::error(format!("could not find `{}`", identifier))
                    .with_context(detail)
                    .with_suggestion(suggestions::TARGET_NOT_FOUND)
            }

            GraphError::Cycle { path } => {
                let chain: Vec<String> = path.iter().map(ToString::to_string).collect();
                Diagnostic::error(self.to_string())
                    .with_context(format!("cycle: {}", chain.join(" -> ")))
                    .with_suggestion(suggestions::BREAK_CYCLE)
            }

            GraphError::InvalidDependencies { target, found } => {
                Diagnostic::error(self.to_string()).with_context(format!(
                    "the configuration seen by `{}` holds a {} under `deps`",
                    target, found
                ))
            }
        }
    }
}
