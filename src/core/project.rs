//! Projects and packages - the target registries.
//!
//! A Project owns its Packages by relative path, and each Package owns its
//! Targets by name. Registries are filled while the graph is constructed
//! (through `&mut` access) and are read-only once evaluation starts.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::configuration::Configuration;
use crate::core::errors::{GraphError, Missing};
use crate::core::identifier::Identifier;
use crate::core::target::{InFlight, Rule, Target};

/// Input and output roots shared by every package of a project.
#[derive(Debug)]
struct Layout {
    root: PathBuf,
    outroot: PathBuf,
}

/// A set of packages rooted at one directory.
#[derive(Debug)]
pub struct Project {
    layout: Arc<Layout>,
    packages: BTreeMap<String, Package>,
    in_flight: InFlight,
}

impl Project {
    /// Create an empty project.
    pub fn new(root: impl Into<PathBuf>, outroot: impl Into<PathBuf>) -> Self {
        Project {
            layout: Arc::new(Layout {
                root: root.into(),
                outroot: outroot.into(),
            }),
            packages: BTreeMap::new(),
            in_flight: InFlight::default(),
        }
    }

    pub(crate) fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Input root directory.
    pub fn root(&self) -> &Path {
        &self.layout.root
    }

    /// Output root directory.
    pub fn outroot(&self) -> &Path {
        &self.layout.outroot
    }

    /// Register a new, empty package.
    pub fn add_package(&mut self, relpath: impl Into<String>) -> Result<&mut Package, GraphError> {
        let relpath = relpath.into();
        match self.packages.entry(relpath) {
            Entry::Occupied(slot) => Err(GraphError::DuplicatePackage {
                relpath: slot.key().clone(),
            }),
            Entry::Vacant(slot) => {
                let package = Package {
                    layout: Arc::clone(&self.layout),
                    relpath: slot.key().clone(),
                    targets: BTreeMap::new(),
                };
                Ok(slot.insert(package))
            }
        }
    }

    /// Look up a package by relative path.
    pub fn package(&self, relpath: &str) -> Option<&Package> {
        self.packages.get(relpath)
    }

    /// Mutable package lookup, for graph construction.
    pub fn package_mut(&mut self, relpath: &str) -> Option<&mut Package> {
        self.packages.get_mut(relpath)
    }

    /// All packages, sorted by relative path.
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    /// Resolve an identifier to its target.
    pub fn find_target(&self, identifier: &Identifier) -> Result<&Target, GraphError> {
        let package =
            self.package(identifier.package_relpath())
                .ok_or_else(|| GraphError::NotFound {
                    identifier: identifier.clone(),
                    missing: Missing::Package,
                })?;

        package
            .target(identifier.target_name_or_default())
            .ok_or_else(|| GraphError::NotFound {
                identifier: identifier.clone(),
                missing: Missing::Target,
            })
    }
}

/// A directory of targets within a project.
#[derive(Debug)]
pub struct Package {
    layout: Arc<Layout>,
    relpath: String,
    targets: BTreeMap<String, Target>,
}

impl Package {
    /// Path from the project root.
    pub fn relpath(&self) -> &str {
        &self.relpath
    }

    /// Create a target and register it in this package.
    pub fn add_target<R>(&mut self, name: impl Into<String>, rule: R) -> Result<&mut Target, GraphError>
    where
        R: Rule + 'static,
    {
        let name = name.into();
        match self.targets.entry(name) {
            Entry::Occupied(slot) => Err(GraphError::DuplicateTarget {
                identifier: Identifier::target(&self.relpath, slot.key().clone()),
            }),
            Entry::Vacant(slot) => {
                let target = Target::new(&self.relpath, slot.key().clone(), Box::new(rule));
                Ok(slot.insert(target))
            }
        }
    }

    /// Look up a target by name.
    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    /// All targets, sorted by name.
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    /// Path of an input file: `<root>/<relpath>/<parts...>`.
    pub fn inpath<I, P>(&self, parts: I) -> PathBuf
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut path = self.layout.root.join(&self.relpath);
        path.extend(parts);
        path
    }

    /// Path of an output file: `<outroot>/<digest>/<relpath>/<parts...>`.
    ///
    /// The configuration digest keeps outputs of one target built under
    /// different configurations apart.
    pub fn outpath<I, P>(&self, configuration: &Configuration, parts: I) -> PathBuf
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut path = self
            .layout
            .outroot
            .join(configuration.digest())
            .join(&self.relpath);
        path.extend(parts);
        path
    }
}
