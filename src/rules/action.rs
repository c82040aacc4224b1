//! Action targets - one build step with declared inputs and outputs.
//!
//! The action's command is a template. An argument that is exactly `$key`
//! expands to the value of `key` in the target's effective configuration
//! (lists expand to one argument per item, missing keys to nothing). `$in`
//! and `$out` expand to the input and output paths, and `$$` escapes a
//! literal dollar sign.

use std::path::PathBuf;

use crate::core::configuration::{Configuration, Delta};
use crate::core::target::{Product, Rule, RuleContext};
use crate::rules::Wiring;

/// A target that describes a single build action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Action {
    pub wiring: Wiring,
    /// Input files, relative to the package directory
    pub inputs: Vec<String>,
    /// Output files, relative to the package's output directory
    pub outputs: Vec<String>,
    /// Command template
    pub command: Vec<String>,
}

impl Action {
    pub fn new(wiring: Wiring) -> Self {
        Action {
            wiring,
            ..Action::default()
        }
    }

    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }
}

fn expand_command(
    template: &[String],
    cfg: &Configuration,
    inputs: &[PathBuf],
    outputs: &[PathBuf],
) -> Vec<String> {
    let paths = |ps: &[PathBuf]| -> Vec<String> {
        ps.iter().map(|p| p.display().to_string()).collect()
    };

    let mut args = Vec::with_capacity(template.len());
    for arg in template {
        match arg.as_str() {
            "$in" => args.extend(paths(inputs)),
            "$out" => args.extend(paths(outputs)),
            _ if arg.starts_with("$$") => args.push(arg[1..].to_string()),
            _ if arg.len() > 1 && arg.starts_with('$') => {
                if let Some(value) = cfg.get(&arg[1..]) {
                    args.extend(value.to_args());
                }
            }
            _ => args.push(arg.clone()),
        }
    }
    args
}

impl Rule for Action {
    fn kind(&self) -> &'static str {
        "action"
    }

    fn derive_down(&self, _cx: &RuleContext<'_>, cfg_up: &Configuration) -> Configuration {
        self.wiring.down(cfg_up)
    }

    fn derive_local(&self, _cx: &RuleContext<'_>, cfg_down: &Configuration) -> Configuration {
        self.wiring.local(cfg_down)
    }

    fn using_and_products(
        &self,
        cx: &RuleContext<'_>,
        cfg_local: &Configuration,
    ) -> (Delta, Vec<Product>) {
        if self.outputs.is_empty() {
            return (self.wiring.using.clone(), Vec::new());
        }

        let inputs: Vec<PathBuf> = self.inputs.iter().map(|i| cx.package.inpath([i])).collect();
        let outputs: Vec<PathBuf> = self
            .outputs
            .iter()
            .map(|o| cx.package.outpath(cfg_local, [o]))
            .collect();
        let command = expand_command(&self.command, cfg_local, &inputs, &outputs);

        let product = Product {
            target: cx.identifier.clone(),
            inputs,
            outputs,
            command,
        };
        (self.wiring.using.clone(), vec![product])
    }
}
