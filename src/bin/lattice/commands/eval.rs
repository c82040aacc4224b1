//! `lattice eval` command

use anyhow::{Context, Result};

use crate::cli::EvalArgs;
use lattice::core::GraphError;
use lattice::ops::{eval_targets, format_report, format_report_json, open_project, EvalOptions};
use lattice::util::diagnostic::{self, suggestions};
use lattice::util::{Diagnostic, GlobalContext};

pub fn execute(args: EvalArgs, verbose: bool, color: bool) -> Result<()> {
    let mut ctx = GlobalContext::new().context("failed to create global context")?;
    ctx.set_verbose(verbose);
    ctx.set_color(color);

    if ctx.find_manifest().is_err() {
        diagnostic::emit(
            &Diagnostic::error(format!(
                "could not find Lattice.toml in {} or any parent directory",
                ctx.cwd().display()
            ))
            .with_suggestion(suggestions::NO_MANIFEST),
            ctx.color(),
        );
        std::process::exit(1);
    }

    let loaded = open_project(&ctx)?;
    let options = EvalOptions {
        targets: args.targets,
        overrides: args.set,
    };

    let report = match eval_targets(&loaded, ctx.cwd(), &options) {
        Ok(report) => report,
        Err(err) => match err.downcast_ref::<GraphError>() {
            Some(graph_err) => {
                diagnostic::emit(&graph_err.to_diagnostic(), ctx.color());
                std::process::exit(1);
            }
            None => return Err(err),
        },
    };

    if args.json || loaded.config.output.json.unwrap_or(false) {
        println!("{}", format_report_json(&report));
    } else {
        print!("{}", format_report(&report, args.map || ctx.is_verbose()));
    }

    Ok(())
}
