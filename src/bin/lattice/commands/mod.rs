//! Command implementations

pub mod completions;
pub mod eval;
pub mod targets;
