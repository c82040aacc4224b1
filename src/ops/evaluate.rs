//! Evaluate root targets and report what they would build.
//!
//! The starting configuration is layered: the manifest's `[env]`, then the
//! tool config's `[eval.env]`, then `--set` overrides from the command line.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::core::configuration::{Configuration, Delta, Value};
use crate::core::errors::GraphError;
use crate::core::identifier::Identifier;
use crate::core::manifest::Manifest;
use crate::core::project::Project;
use crate::core::rank::deterministic_order;
use crate::core::target::Product;
use crate::ops::load::LoadedProject;
use crate::util::config::Config;

/// Options for evaluating targets.
#[derive(Debug, Clone, Default)]
pub struct EvalOptions {
    /// Root target identifiers
    pub targets: Vec<String>,
    /// `key=value` overrides
    pub overrides: Vec<String>,
}

/// One ranked entry of a root's result map.
#[derive(Debug, Clone, Serialize)]
pub struct EntryReport {
    pub target: Identifier,
    pub digest: String,
    pub rank: u32,
    pub delta: Delta,
}

/// The result of one root target.
#[derive(Debug, Clone, Serialize)]
pub struct RootReport {
    pub target: Identifier,
    /// Entries in deterministic order
    pub entries: Vec<EntryReport>,
    /// Products in dependency order, duplicates included
    pub products: Vec<Product>,
}

/// The result of an evaluation run.
#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub configuration: Configuration,
    pub digest: String,
    pub roots: Vec<RootReport>,
    /// Products of every root, deduplicated in first-occurrence order
    pub products: Vec<Product>,
}

/// Parse a `key=value` override.
pub fn parse_override(text: &str) -> Result<(String, Value)> {
    let Some((key, value)) = text.split_once('=') else {
        bail!("invalid override `{}`, expected KEY=VALUE", text);
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("invalid override `{}`, key is empty", text);
    }
    Ok((key.to_string(), Value::parse_cli(value)))
}

/// Build the configuration evaluation starts from.
pub fn starting_configuration(
    manifest: &Manifest,
    config: &Config,
    overrides: &[String],
) -> Result<Configuration> {
    let mut values: BTreeMap<String, Value> = manifest.env.clone();
    values.extend(config.eval.env.clone());

    for text in overrides {
        let (key, value) = parse_override(text)?;
        values.insert(key, value);
    }

    Ok(Configuration::new(values))
}

/// Parse root target arguments.
///
/// `:name` refers to a target of the package containing `cwd`: the nearest
/// registered package at or above it.
pub fn resolve_roots(project: &Project, cwd: &Path, targets: &[String]) -> Result<Vec<Identifier>> {
    let parts: Vec<String> = cwd
        .strip_prefix(project.root())
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();

    let current = (0..=parts.len())
        .rev()
        .map(|n| parts[..n].join("/"))
        .find(|relpath| project.package(relpath).is_some())
        .unwrap_or_else(|| parts.join("/"));

    targets
        .iter()
        .map(|text| {
            Identifier::parse_relative(text, &current)
                .with_context(|| format!("invalid target `{}`", text))
        })
        .collect()
}

/// Layer the starting configuration, resolve the roots and evaluate them.
pub fn eval_targets(loaded: &LoadedProject, cwd: &Path, options: &EvalOptions) -> Result<EvalReport> {
    if options.targets.is_empty() {
        bail!("no targets given");
    }

    let configuration = starting_configuration(&loaded.manifest, &loaded.config, &options.overrides)?;
    tracing::debug!(digest = configuration.digest(), "starting configuration");

    let roots = resolve_roots(&loaded.project, cwd, &options.targets)?;
    Ok(evaluate(&loaded.project, &roots, &configuration)?)
}

/// Evaluate every root under `configuration`.
///
/// The first failure aborts the run.
pub fn evaluate(
    project: &Project,
    roots: &[Identifier],
    configuration: &Configuration,
) -> Result<EvalReport, GraphError> {
    let mut reports = Vec::with_capacity(roots.len());

    for root in roots {
        let target = project.find_target(root)?;
        tracing::info!("Evaluating {}", target.identifier());

        let evaluation = target.evaluate(project, configuration)?;
        let entries = deterministic_order(&evaluation.map)
            .into_iter()
            .map(|(key, ranked)| EntryReport {
                target: key.target.clone(),
                digest: key.configuration.digest().to_string(),
                rank: ranked.rank,
                delta: ranked.delta.clone(),
            })
            .collect();

        reports.push(RootReport {
            target: target.identifier().clone(),
            entries,
            products: evaluation.products.clone(),
        });
    }

    let mut seen = HashSet::new();
    let products = reports
        .iter()
        .flat_map(|r| r.products.iter())
        .filter(|p| seen.insert(*p))
        .cloned()
        .collect();

    Ok(EvalReport {
        configuration: configuration.clone(),
        digest: configuration.digest().to_string(),
        roots: reports,
        products,
    })
}

/// Format an evaluation report for the terminal.
pub fn format_report(report: &EvalReport, show_map: bool) -> String {
    let mut output = String::new();

    writeln!(
        output,
        "Configuration {} ({} values)",
        report.digest,
        report.configuration.len()
    )
    .unwrap();

    if show_map {
        for root in &report.roots {
            writeln!(output).unwrap();
            writeln!(output, "{}", root.target).unwrap();
            for entry in &root.entries {
                let delta = if entry.delta.is_empty() {
                    String::new()
                } else {
                    format!("  ({} ops)", entry.delta.ops().len())
                };
                writeln!(
                    output,
                    "  [{}] {} @ {}{}",
                    entry.rank, entry.target, entry.digest, delta
                )
                .unwrap();
            }
        }
    }

    writeln!(output).unwrap();
    if report.products.is_empty() {
        writeln!(output, "No products").unwrap();
        return output;
    }

    writeln!(output, "Products ({}):", report.products.len()).unwrap();
    for product in &report.products {
        writeln!(output, "  {}", product.target).unwrap();
        for out in &product.outputs {
            writeln!(output, "    -> {}", out.display()).unwrap();
        }
        if !product.command.is_empty() {
            writeln!(output, "    $ {}", product.command.join(" ")).unwrap();
        }
    }

    output
}

/// Format an evaluation report as JSON.
pub fn format_report_json(report: &EvalReport) -> String {
    serde_json::to_string_pretty(report)
        .unwrap_or_else(|e| format!(r#"{{"error": "Failed to serialize report: {}"}}"#, e))
}
