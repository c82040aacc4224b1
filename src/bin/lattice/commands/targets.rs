//! `lattice targets` command

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::TargetsArgs;
use lattice::ops::open_project;
use lattice::util::GlobalContext;

#[derive(Serialize)]
struct TargetEntry {
    identifier: String,
    kind: &'static str,
    transparent: bool,
}

pub fn execute(args: TargetsArgs, verbose: bool) -> Result<()> {
    let mut ctx = GlobalContext::new().context("failed to create global context")?;
    ctx.set_verbose(verbose);

    let loaded = open_project(&ctx)?;
    let project = &loaded.project;

    let entries: Vec<TargetEntry> = project
        .packages()
        .flat_map(|package| package.targets())
        .map(|target| TargetEntry {
            identifier: target.identifier().to_string(),
            kind: target.rule().kind(),
            transparent: target.is_transparent(),
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No targets found under {}", project.root().display());
        return Ok(());
    }

    for entry in &entries {
        let opaque = if entry.transparent { "" } else { " (opaque)" };
        println!("{:<40} {}{}", entry.identifier, entry.kind, opaque);
    }

    if ctx.is_verbose() {
        println!();
        println!("Outputs under {}", project.outroot().display());
    }

    Ok(())
}
