//! Core data structures for Lattice.
//!
//! This module contains the foundational types of the build graph:
//! - Identifiers and configurations
//! - Projects, packages and targets
//! - Ranked evaluation maps
//! - Declaration files

pub mod configuration;
pub mod errors;
pub mod identifier;
pub mod manifest;
pub mod project;
pub mod rank;
pub mod target;

pub use configuration::{Configuration, Delta, DeltaOp, Value};
pub use errors::{GraphError, Missing};
pub use identifier::Identifier;
pub use manifest::{find_manifest, BuildFile, Manifest, BUILD_FILE_NAME, MANIFEST_NAME};
pub use project::{Package, Project};
pub use rank::{combine_ranked, deterministic_order, EvalKey, RankMap, Ranked};
pub use target::{Evaluation, Product, Rule, RuleContext, Target, DEPS_KEY};
