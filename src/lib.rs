//! Lattice - a configuration-aware build graph evaluator
//!
//! This crate provides the core library functionality for Lattice:
//! targets grouped into packages, evaluated under immutable configurations
//! with memoized, deterministic results.

pub mod core;
pub mod ops;
pub mod rules;
pub mod util;

pub use crate::core::{
    configuration::Configuration, identifier::Identifier, project::Project, target::Target,
};

pub use crate::util::context::GlobalContext;
