//! Build the target graph from declaration files.
//!
//! Every directory below the project root holding a `BUILD.toml` becomes a
//! package. Hidden directories and the output root are not searched.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use walkdir::WalkDir;

use crate::core::manifest::{BuildFile, Manifest, TargetDecl, TargetKind, BUILD_FILE_NAME, DEFAULT_OUTROOT};
use crate::core::project::{Package, Project};
use crate::rules::{Action, Group, Wiring};
use crate::util::config::{load_config, Config};
use crate::util::GlobalContext;

/// A project together with the settings it was loaded with.
#[derive(Debug)]
pub struct LoadedProject {
    pub project: Project,
    pub manifest: Manifest,
    pub config: Config,
}

/// Locate, configure and load the project around the context's cwd.
pub fn open_project(ctx: &GlobalContext) -> Result<LoadedProject> {
    let manifest_path = ctx.find_manifest()?;
    let root = manifest_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| ctx.cwd().to_path_buf());

    let manifest = Manifest::load(&manifest_path)?;
    let config = load_config(&ctx.config_path(), &ctx.project_config_path(&root));

    let outroot = resolve_outroot(&root, &manifest, &config);
    tracing::debug!("Project root {}, outputs in {}", root.display(), outroot.display());

    let project = load_project(&root, &outroot)?;

    Ok(LoadedProject {
        project,
        manifest,
        config,
    })
}

/// Output root: config beats manifest beats the default.
pub fn resolve_outroot(root: &Path, manifest: &Manifest, config: &Config) -> PathBuf {
    let outroot = config
        .eval
        .outroot
        .clone()
        .or_else(|| manifest.project.outroot.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTROOT));
    root.join(outroot)
}

/// Discover and register every package below `root`.
pub fn load_project(root: &Path, outroot: &Path) -> Result<Project> {
    let mut project = Project::new(root, outroot);

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            !hidden && entry.path() != outroot
        });

    for entry in walker {
        let entry = entry.context("failed to walk project directory")?;
        if !entry.file_type().is_file() || entry.file_name() != BUILD_FILE_NAME {
            continue;
        }

        let dir = entry.path().parent().unwrap_or(root);
        let relpath = package_relpath(root, dir)?;
        if relpath.is_empty() {
            tracing::warn!(
                "Ignoring {} at the project root; packages live in subdirectories",
                entry.path().display()
            );
            continue;
        }

        let build = BuildFile::load(entry.path())?;
        let package = project
            .add_package(relpath)
            .with_context(|| format!("in {}", entry.path().display()))?;
        register_targets(package, build)
            .with_context(|| format!("in {}", entry.path().display()))?;
    }

    let count = project.packages().count();
    tracing::debug!("Loaded {} package(s)", count);
    Ok(project)
}

/// Relative path from the root, joined with `/` on every platform.
fn package_relpath(root: &Path, dir: &Path) -> Result<String> {
    let rel = dir
        .strip_prefix(root)
        .with_context(|| format!("{} is outside the project root", dir.display()))?;

    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(s) if !s.contains(':') => parts.push(s.to_string()),
                _ => bail!("unsupported package directory name: {}", dir.display()),
            },
            _ => bail!("unsupported package path: {}", dir.display()),
        }
    }
    Ok(parts.join("/"))
}

fn register_targets(package: &mut Package, build: BuildFile) -> Result<()> {
    for decl in build.targets {
        validate_name(&decl.name)?;
        if decl.kind == TargetKind::Group && decl.has_action_fields() {
            bail!(
                "target `{}` is a group; only action targets take inputs, outputs or command",
                decl.name
            );
        }

        let TargetDecl {
            name,
            kind,
            transparent,
            deps,
            down,
            local,
            using,
            inputs,
            outputs,
            command,
        } = decl;
        let wiring = Wiring {
            deps,
            down,
            local,
            using,
        };

        let target = match kind {
            TargetKind::Group => package.add_target(name, Group::new(wiring))?,
            TargetKind::Action => package.add_target(
                name,
                Action::new(wiring)
                    .with_inputs(inputs)
                    .with_outputs(outputs)
                    .with_command(command),
            )?,
        };
        target.set_transparent(transparent);
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("target name must not be empty");
    }
    if name.contains(':') || name.contains('/') {
        bail!("target name `{}` must not contain `:` or `/`", name);
    }
    Ok(())
}
