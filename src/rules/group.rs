//! Group targets - named bundles of dependencies.

use crate::core::configuration::{Configuration, Delta};
use crate::core::target::{Product, Rule, RuleContext};
use crate::rules::Wiring;

/// A target that only aggregates its dependencies and exports a delta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    pub wiring: Wiring,
}

impl Group {
    pub fn new(wiring: Wiring) -> Self {
        Group { wiring }
    }
}

impl Rule for Group {
    fn kind(&self) -> &'static str {
        "group"
    }

    fn derive_down(&self, _cx: &RuleContext<'_>, cfg_up: &Configuration) -> Configuration {
        self.wiring.down(cfg_up)
    }

    fn derive_local(&self, _cx: &RuleContext<'_>, cfg_down: &Configuration) -> Configuration {
        self.wiring.local(cfg_down)
    }

    fn using_and_products(
        &self,
        _cx: &RuleContext<'_>,
        _cfg_local: &Configuration,
    ) -> (Delta, Vec<Product>) {
        (self.wiring.using.clone(), Vec::new())
    }
}
