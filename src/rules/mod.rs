//! Concrete target kinds.
//!
//! Every kind implements [`Rule`](crate::core::target::Rule). The kinds here
//! are data-driven: what they contribute comes from their declaration rather
//! than from a compiler or linker.
//!
//! - [`Group`] aggregates dependencies and exports a delta, producing nothing.
//! - [`Action`] additionally describes one build action with its inputs and
//!   outputs.

pub mod action;
pub mod group;

pub use action::Action;
pub use group::Group;

use crate::core::configuration::{Configuration, Delta, Value};
use crate::core::target::DEPS_KEY;

/// How a declared target connects to the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wiring {
    /// Dependency identifiers; `:name` is relative to the owning package
    pub deps: Vec<String>,
    /// Applied to the configuration handed to dependencies
    pub down: Delta,
    /// Applied to the configuration this target discovers dependencies in
    pub local: Delta,
    /// This target's contribution to everything that depends on it
    pub using: Delta,
}

impl Wiring {
    /// Wiring with only dependencies.
    pub fn with_deps<I, S>(deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Wiring {
            deps: deps.into_iter().map(Into::into).collect(),
            ..Wiring::default()
        }
    }

    pub(crate) fn down(&self, cfg_up: &Configuration) -> Configuration {
        cfg_up.derive(&self.down)
    }

    /// The dependency list replaces whatever `deps` the configuration held;
    /// the local delta is applied after it and may still edit it.
    pub(crate) fn local(&self, cfg_down: &Configuration) -> Configuration {
        cfg_down
            .with(DEPS_KEY, Value::list(self.deps.iter().cloned()))
            .derive(&self.local)
    }
}
