//! High-level operations.
//!
//! This module contains the implementation of Lattice commands.

pub mod evaluate;
pub mod load;

pub use evaluate::{
    eval_targets, evaluate, format_report, format_report_json, parse_override, resolve_roots,
    starting_configuration, EntryReport, EvalOptions, EvalReport, RootReport,
};
pub use load::{load_project, open_project, resolve_outroot, LoadedProject};
