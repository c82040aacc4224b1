//! Targets and their evaluation.
//!
//! A Target is a node in the build graph. What it does is decided by its
//! [`Rule`]; how its subgraph is walked is decided here.
//!
//! Evaluating a target under a starting configuration walks the entire
//! contextual subgraph beneath it, so results are memoized per target and
//! per configuration value. A target reachable through several paths under
//! the same configuration is computed once, also when several threads
//! evaluate the same project.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use serde::Serialize;

use crate::core::configuration::{Configuration, Delta, Value};
use crate::core::errors::{GraphError, Missing};
use crate::core::identifier::Identifier;
use crate::core::project::{Package, Project};
use crate::core::rank::{combine_ranked, deterministic_order, EvalKey, RankMap, Ranked};

/// Configuration key holding a target's dependency identifiers.
pub const DEPS_KEY: &str = "deps";

/// What a rule hook can see about the target it runs for.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub identifier: &'a Identifier,
    pub package: &'a Package,
}

/// Kind-specific behavior of a target.
///
/// Every hook has a neutral default, so a rule only overrides what it needs.
pub trait Rule: fmt::Debug + Send + Sync {
    /// Short name of the rule kind, for listings.
    fn kind(&self) -> &'static str;

    /// The configuration this target's dependencies are evaluated under.
    fn derive_down(&self, _cx: &RuleContext<'_>, cfg_up: &Configuration) -> Configuration {
        cfg_up.clone()
    }

    /// The configuration used to discover this target's dependencies.
    ///
    /// Dependencies are read from [`DEPS_KEY`] of the result, so they may
    /// depend on the configuration.
    fn derive_local(&self, _cx: &RuleContext<'_>, cfg_down: &Configuration) -> Configuration {
        cfg_down.clone()
    }

    /// This target's own delta and build products, given its effective
    /// local configuration.
    fn using_and_products(
        &self,
        _cx: &RuleContext<'_>,
        _cfg_local: &Configuration,
    ) -> (Delta, Vec<Product>) {
        (Delta::new(), Vec::new())
    }

    /// Extension point. Evaluation never calls it.
    fn derive_using(
        &self,
        _cx: &RuleContext<'_>,
        _cfg_local: &Configuration,
        cfg_dep: &Configuration,
    ) -> Configuration {
        cfg_dep.clone()
    }
}

/// An opaque description of one build output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Product {
    /// Target that produced it
    pub target: Identifier,
    /// Files read by the action
    pub inputs: Vec<PathBuf>,
    /// Files written by the action
    pub outputs: Vec<PathBuf>,
    /// Action argument vector
    pub command: Vec<String>,
}

/// The result of evaluating one target under one configuration.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    /// Every evaluation visible through this one, with ranks and deltas.
    pub map: RankMap,
    /// Build products of the subgraph, dependencies first.
    pub products: Vec<Product>,
}

/// How many times one target may appear on a single evaluation path.
///
/// A target may depend on itself under another configuration, but a loop
/// whose `down` delta changes the configuration on every trip never repeats
/// a key exactly. Past this bound the loop is reported as a cycle.
pub const MAX_TARGET_REPEATS: usize = 8;

/// Finished evaluations of one target, keyed by configuration value.
#[derive(Default)]
struct EvaluationCache {
    done: Mutex<HashMap<Configuration, Arc<Evaluation>>>,
}

impl EvaluationCache {
    fn lock(&self) -> MutexGuard<'_, HashMap<Configuration, Arc<Evaluation>>> {
        self.done.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, configuration: &Configuration) -> Option<Arc<Evaluation>> {
        self.lock().get(configuration).cloned()
    }

    fn insert(&self, configuration: Configuration, evaluation: Arc<Evaluation>) {
        self.lock().insert(configuration, evaluation);
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

impl fmt::Debug for EvaluationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationCache")
            .field("entries", &self.len())
            .finish()
    }
}

/// Evaluations currently being computed, across all threads of a project.
///
/// A key has at most one owner thread. Other threads wait for the owner to
/// finish, unless the owner is itself (transitively) waiting on them, in
/// which case waiting would never end and the caller gets a cycle error.
#[derive(Default)]
pub(crate) struct InFlight {
    state: Mutex<InFlightState>,
    changed: Condvar,
}

#[derive(Default)]
struct InFlightState {
    running: HashMap<EvalKey, ThreadId>,
    waiting: HashMap<ThreadId, EvalKey>,
}

enum Claim<'a> {
    /// The caller computes the key; dropping the guard releases it.
    Owner(ClaimGuard<'a>),
    /// Another thread released the key; look in the cache again.
    Released,
}

struct ClaimGuard<'a> {
    in_flight: &'a InFlight,
    key: EvalKey,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().running.remove(&self.key);
        self.in_flight.changed.notify_all();
    }
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, InFlightState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Become the owner of `key`, or wait until its owner releases it.
    ///
    /// `stack` is the calling thread's evaluation path.
    fn claim(&self, key: &EvalKey, stack: &[EvalKey]) -> Result<Claim<'_>, GraphError> {
        let me = thread::current().id();
        let mut state = self.lock();

        loop {
            let Some(owner) = state.running.get(key).copied() else {
                state.running.insert(key.clone(), me);
                return Ok(Claim::Owner(ClaimGuard {
                    in_flight: self,
                    key: key.clone(),
                }));
            };

            if let Some(path) = state.deadlock_path(key, owner, me, stack) {
                return Err(GraphError::Cycle { path });
            }

            state.waiting.insert(me, key.clone());
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            state.waiting.remove(&me);

            if !state.running.contains_key(key) {
                return Ok(Claim::Released);
            }
        }
    }
}

impl InFlightState {
    /// Follow the wait-for chain from `owner`. If it leads back to `me`,
    /// return the dependency path that closes the loop.
    fn deadlock_path(
        &self,
        wanted: &EvalKey,
        owner: ThreadId,
        me: ThreadId,
        stack: &[EvalKey],
    ) -> Option<Vec<Identifier>> {
        let mut path = vec![wanted.target.clone()];
        let mut held = wanted;
        let mut holder = owner;

        for _ in 0..=self.running.len() {
            if holder == me {
                // `held` is ours, so it is on our own path to `wanted`
                if let Some(pos) = stack.iter().position(|k| k == held) {
                    path.extend(stack[pos + 1..].iter().map(|k| k.target.clone()));
                }
                path.push(wanted.target.clone());
                return Some(path);
            }
            held = self.waiting.get(&holder)?;
            path.push(held.target.clone());
            holder = *self.running.get(held)?;
        }
        None
    }
}

impl fmt::Debug for InFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlight")
            .field("running", &self.lock().running.len())
            .finish()
    }
}

/// A buildable node of the graph.
#[derive(Debug)]
pub struct Target {
    package_relpath: String,
    name: String,
    identifier: Identifier,
    transparent: bool,
    rule: Box<dyn Rule>,
    evaluations: EvaluationCache,
}

impl Target {
    pub(crate) fn new(package_relpath: &str, name: String, rule: Box<dyn Rule>) -> Self {
        Target {
            package_relpath: package_relpath.to_string(),
            identifier: Identifier::target(package_relpath, name.clone()),
            name,
            transparent: true,
            rule,
            evaluations: EvaluationCache::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn package_relpath(&self) -> &str {
        &self.package_relpath
    }

    pub fn rule(&self) -> &dyn Rule {
        self.rule.as_ref()
    }

    /// Whether callers see this target's dependency entries.
    pub fn is_transparent(&self) -> bool {
        self.transparent
    }

    /// Make the target transparent (the default) or opaque.
    ///
    /// An opaque target hides its subgraph: its result map holds only its
    /// own entry. Products are passed up either way.
    pub fn set_transparent(&mut self, transparent: bool) -> &mut Self {
        self.transparent = transparent;
        self
    }

    /// A previously computed evaluation, if any.
    pub fn cached(&self, configuration: &Configuration) -> Option<Arc<Evaluation>> {
        self.evaluations.get(configuration)
    }

    /// Number of configurations this target has been evaluated under.
    pub fn evaluation_count(&self) -> usize {
        self.evaluations.len()
    }

    /// Evaluate this target and its subgraph under `configuration`.
    ///
    /// Calling this again with an equal configuration returns the same
    /// shared result without recomputing it. Threads evaluating the same
    /// project concurrently share results, and each `(target,
    /// configuration)` is computed at most once. A dependency cycle fails
    /// with [`GraphError::Cycle`], also when threads would wait on each
    /// other around it.
    pub fn evaluate(
        &self,
        project: &Project,
        configuration: &Configuration,
    ) -> Result<Arc<Evaluation>, GraphError> {
        let mut stack = Vec::new();
        self.evaluate_in(project, configuration, &mut stack)
    }

    fn evaluate_in(
        &self,
        project: &Project,
        cfg_up: &Configuration,
        stack: &mut Vec<EvalKey>,
    ) -> Result<Arc<Evaluation>, GraphError> {
        self.check_cycle(cfg_up, stack)?;
        let key = EvalKey::new(self.identifier.clone(), cfg_up.clone());

        loop {
            if let Some(evaluation) = self.evaluations.get(cfg_up) {
                tracing::debug!(digest = cfg_up.digest(), "evaluation cache hit");
                return Ok(evaluation);
            }

            let _claim = match project.in_flight().claim(&key, stack)? {
                Claim::Owner(guard) => guard,
                Claim::Released => continue,
            };
            // the previous owner may have finished between lookup and claim
            if let Some(evaluation) = self.evaluations.get(cfg_up) {
                return Ok(evaluation);
            }

            tracing::debug!(identifier = %self.identifier, digest = cfg_up.digest(), "evaluating");
            stack.push(key.clone());
            let result = self.compute(project, cfg_up, stack);
            stack.pop();

            let evaluation = Arc::new(result?);
            self.evaluations.insert(cfg_up.clone(), Arc::clone(&evaluation));
            return Ok(evaluation);
        }
    }

    /// Fail if evaluating under `cfg_up` would re-enter the current path.
    fn check_cycle(&self, cfg_up: &Configuration, stack: &[EvalKey]) -> Result<(), GraphError> {
        let cycle_from = |start: usize| {
            let mut path: Vec<Identifier> =
                stack[start..].iter().map(|k| k.target.clone()).collect();
            path.push(self.identifier.clone());
            GraphError::Cycle { path }
        };

        if let Some(start) = stack
            .iter()
            .position(|k| k.target == self.identifier && k.configuration == *cfg_up)
        {
            return Err(cycle_from(start));
        }

        let repeats: Vec<usize> = stack
            .iter()
            .enumerate()
            .filter(|(_, k)| k.target == self.identifier)
            .map(|(i, _)| i)
            .collect();
        match repeats.last() {
            Some(&last) if repeats.len() >= MAX_TARGET_REPEATS => Err(cycle_from(last)),
            _ => Ok(()),
        }
    }

    fn compute(
        &self,
        project: &Project,
        cfg_up: &Configuration,
        stack: &mut Vec<EvalKey>,
    ) -> Result<Evaluation, GraphError> {
        let package = project
            .package(&self.package_relpath)
            .ok_or_else(|| GraphError::NotFound {
                identifier: self.identifier.clone(),
                missing: Missing::Package,
            })?;
        let cx = RuleContext {
            identifier: &self.identifier,
            package,
        };

        let cfg_down = self.rule.derive_down(&cx, cfg_up);

        // Local A only needs to be good enough to discover dependencies.
        let cfg_local_a = self.rule.derive_local(&cx, &cfg_down);
        let deps = self.dependencies(&cfg_local_a)?;
        tracing::trace!(identifier = %self.identifier, deps = deps.len(), "discovered dependencies");

        let mut results = Vec::with_capacity(deps.len());
        for id in &deps {
            let dep = project.find_target(id)?;
            results.push(dep.evaluate_in(project, &cfg_down, stack)?);
        }

        let mut map = combine_ranked(results.iter().map(|r| &r.map));
        let mut products: Vec<Product> = results
            .iter()
            .flat_map(|r| r.products.iter().cloned())
            .collect();

        // Local B: every dependency delta applied, in a reproducible order.
        let cfg_local_b = deterministic_order(&map)
            .into_iter()
            .fold(cfg_local_a, |cfg, (_, ranked)| cfg.derive(&ranked.delta));

        let (using, own_products) = self.rule.using_and_products(&cx, &cfg_local_b);

        let own = EvalKey::new(self.identifier.clone(), cfg_up.clone());
        if self.transparent {
            map.insert(own, Ranked::new(0, using));
        } else {
            map = RankMap::from([(own, Ranked::new(0, using))]);
        }
        products.extend(own_products);

        Ok(Evaluation { map, products })
    }

    /// Read the dependency list out of a configuration.
    fn dependencies(&self, configuration: &Configuration) -> Result<Vec<Identifier>, GraphError> {
        match configuration.get(DEPS_KEY) {
            None => Ok(Vec::new()),
            Some(Value::List(items)) => items
                .iter()
                .map(|text| {
                    Identifier::parse_relative(text, &self.package_relpath).map_err(Into::into)
                })
                .collect(),
            Some(other) => Err(GraphError::InvalidDependencies {
                target: self.identifier.clone(),
                found: other.type_name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{mpsc, Barrier};
    use std::time::Duration;

    use super::*;

    /// Records every effective configuration it is computed under.
    #[derive(Debug, Default, Clone)]
    struct Recorder {
        deps: Vec<String>,
        down: Delta,
        /// Held inside `derive_local`, to keep evaluations in flight
        delay: Duration,
        calls: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<Configuration>>>,
    }

    impl Recorder {
        fn with_deps(deps: &[&str]) -> Self {
            Recorder {
                deps: deps.iter().map(|d| d.to_string()).collect(),
                ..Recorder::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_seen(&self) -> Configuration {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl Rule for Recorder {
        fn kind(&self) -> &'static str {
            "recorder"
        }

        fn derive_down(&self, _cx: &RuleContext<'_>, cfg_up: &Configuration) -> Configuration {
            cfg_up.derive(&self.down)
        }

        fn derive_local(&self, _cx: &RuleContext<'_>, cfg_down: &Configuration) -> Configuration {
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            cfg_down.with(DEPS_KEY, Value::list(self.deps.clone()))
        }

        fn using_and_products(
            &self,
            cx: &RuleContext<'_>,
            cfg_local: &Configuration,
        ) -> (Delta, Vec<Product>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(cfg_local.clone());

            let name = cx.identifier.target_name_or_default().to_string();
            let product = Product {
                target: cx.identifier.clone(),
                inputs: Vec::new(),
                outputs: vec![cx.package.outpath(cfg_local, [&name])],
                command: Vec::new(),
            };
            (Delta::new().append("trail", [name]), vec![product])
        }
    }

    fn id(text: &str) -> Identifier {
        Identifier::parse(text).unwrap()
    }

    /// Register one recorder per `(package, deps)` pair, in the given order.
    fn build(graph: &[(&str, &[&str])]) -> (Project, HashMap<String, Recorder>) {
        let mut project = Project::new("/src", "/out");
        let mut recorders = HashMap::new();
        for (name, deps) in graph {
            let recorder = Recorder::with_deps(deps);
            project
                .add_package(*name)
                .unwrap()
                .add_target(*name, recorder.clone())
                .unwrap();
            recorders.insert(name.to_string(), recorder);
        }
        (project, recorders)
    }

    fn outputs(evaluation: &Evaluation) -> Vec<String> {
        evaluation
            .products
            .iter()
            .map(|p| p.target.target_name_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_memoized_by_value() {
        let (project, recorders) = build(&[("a", &[])]);
        let target = project.find_target(&id("//a")).unwrap();

        let first_cfg = Configuration::empty().with("x", 1i64).with("y", 2i64);
        let second_cfg = Configuration::empty().with("y", 2i64).with("x", 1i64);

        let first = target.evaluate(&project, &first_cfg).unwrap();
        let second = target.evaluate(&project, &second_cfg).unwrap();

        assert_eq!(recorders["a"].calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(target.evaluation_count(), 1);
        assert!(target.cached(&first_cfg).is_some());
    }

    #[test]
    fn test_distinct_configurations_evaluate_separately() {
        let (project, recorders) = build(&[("a", &[])]);
        let target = project.find_target(&id("//a")).unwrap();

        let debug = Configuration::empty().with("mode", "debug");
        let release = Configuration::empty().with("mode", "release");
        let d = target.evaluate(&project, &debug).unwrap();
        let r = target.evaluate(&project, &release).unwrap();

        assert_eq!(recorders["a"].calls(), 2);
        assert_ne!(d.products[0].outputs, r.products[0].outputs);
    }

    #[test]
    fn test_diamond_converges_with_max_rank() {
        // a -> b -> d and a -> c -> e -> d
        let (project, recorders) = build(&[
            ("a", &["//b", "//c"]),
            ("b", &["//d"]),
            ("c", &["//e"]),
            ("e", &["//d"]),
            ("d", &[]),
        ]);
        let cfg = Configuration::empty();
        let result = project
            .find_target(&id("//a"))
            .unwrap()
            .evaluate(&project, &cfg)
            .unwrap();

        assert_eq!(recorders["d"].calls(), 1);

        let d_entries: Vec<_> = result
            .map
            .iter()
            .filter(|(k, _)| k.target == Identifier::target("d", "d"))
            .collect();
        assert_eq!(d_entries.len(), 1);
        let (d_key, d_ranked) = d_entries[0];
        assert_eq!(d_key.configuration, cfg);
        assert_eq!(d_ranked.rank, 3);

        assert_eq!(result.map[&EvalKey::new(Identifier::target("a", "a"), cfg.clone())].rank, 0);
        assert_eq!(result.map.len(), 5);
    }

    #[test]
    fn test_dependency_deltas_fold_in_rank_order() {
        let (project, recorders) = build(&[
            ("a", &["//c", "//b"]),
            ("b", &["//d"]),
            ("c", &["//d"]),
            ("d", &[]),
        ]);
        project
            .find_target(&id("//a"))
            .unwrap()
            .evaluate(&project, &Configuration::empty())
            .unwrap();

        let seen = recorders["a"].last_seen();
        assert_eq!(seen.get("trail"), Some(&Value::list(["b", "c", "d"])));

        // Products keep dependency-list order, duplicates included.
        let result = project
            .find_target(&id("//a"))
            .unwrap()
            .cached(&Configuration::empty())
            .unwrap();
        assert_eq!(outputs(&result), ["d", "c", "d", "b", "a"]);
    }

    #[test]
    fn test_opaque_target_hides_subgraph() {
        let (mut project, _) = build(&[("a", &["//b"]), ("b", &["//d"]), ("d", &[])]);
        project
            .package_mut("b")
            .unwrap()
            .add_target("hidden", Recorder::with_deps(&[":b"]))
            .unwrap()
            .set_transparent(false);

        let cfg = Configuration::empty();
        let hidden = project.find_target(&id("//b:hidden")).unwrap();
        let result = hidden.evaluate(&project, &cfg).unwrap();

        assert_eq!(result.map.len(), 1);
        assert!(result
            .map
            .contains_key(&EvalKey::new(id("//b:hidden"), cfg.clone())));
        assert_eq!(outputs(&result), ["d", "b", "hidden"]);
    }

    #[test]
    fn test_opaque_target_in_chain() {
        let (mut project, _) = build(&[("a", &["//b"]), ("d", &[])]);
        project
            .add_package("b")
            .unwrap()
            .add_target("b", Recorder::with_deps(&["//d"]))
            .unwrap()
            .set_transparent(false);

        let cfg = Configuration::empty();
        let b = project.find_target(&id("//b")).unwrap().evaluate(&project, &cfg).unwrap();
        assert_eq!(b.map.len(), 1);
        assert_eq!(outputs(&b), ["d", "b"]);

        let a = project.find_target(&id("//a")).unwrap().evaluate(&project, &cfg).unwrap();
        let names: Vec<_> = a.map.keys().map(|k| k.target.to_string()).collect();
        assert!(!names.contains(&"//d:d".to_string()));
        assert_eq!(a.map.len(), 2);
        assert_eq!(outputs(&a), ["d", "b", "a"]);
    }

    #[test]
    fn test_deterministic_across_insertion_orders() {
        let edges: [(&str, &[&str]); 6] = [
            ("a", &["//b", "//c", "//f"]),
            ("b", &["//d", "//e"]),
            ("c", &["//e"]),
            ("d", &[]),
            ("e", &["//d"]),
            ("f", &["//d"]),
        ];
        let mut reversed = edges;
        reversed.reverse();
        let mut rotated = edges;
        rotated.rotate_left(2);

        let mut observed = Vec::new();
        for order in [&edges[..], &reversed[..], &rotated[..]] {
            let (project, recorders) = build(order);
            project
                .find_target(&id("//a"))
                .unwrap()
                .evaluate(&project, &Configuration::empty())
                .unwrap();
            let mut per_node: Vec<_> = recorders
                .iter()
                .map(|(name, recorder)| (name.clone(), recorder.last_seen()))
                .collect();
            per_node.sort_by(|x, y| x.0.cmp(&y.0));
            observed.push(per_node);
        }

        assert_eq!(observed[0], observed[1]);
        assert_eq!(observed[0], observed[2]);
    }

    #[test]
    fn test_down_configuration_reaches_dependencies() {
        let mut project = Project::new("/src", "/out");
        let leaf = Recorder::default();
        let root = Recorder {
            down: Delta::new().set("arch", "arm64"),
            ..Recorder::with_deps(&["//leaf"])
        };
        project.add_package("root").unwrap().add_target("root", root).unwrap();
        project.add_package("leaf").unwrap().add_target("leaf", leaf.clone()).unwrap();

        let cfg = Configuration::empty();
        let result = project
            .find_target(&id("//root"))
            .unwrap()
            .evaluate(&project, &cfg)
            .unwrap();

        assert_eq!(leaf.last_seen().get("arch"), Some(&Value::from("arm64")));
        let down = cfg.with("arch", "arm64");
        assert!(result
            .map
            .contains_key(&EvalKey::new(Identifier::target("leaf", "leaf"), down)));
    }

    #[test]
    fn test_cycle_detected() {
        let (project, _) = build(&[("a", &["//b"]), ("b", &["//a"])]);
        let err = project
            .find_target(&id("//a"))
            .unwrap()
            .evaluate(&project, &Configuration::empty())
            .unwrap_err();

        match err {
            GraphError::Cycle { path } => {
                let path: Vec<_> = path.iter().map(ToString::to_string).collect();
                assert_eq!(path, ["//a:a", "//b:b", "//a:a"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let (project, _) = build(&[("a", &[":a"])]);
        let err = project
            .find_target(&id("//a"))
            .unwrap()
            .evaluate(&project, &Configuration::empty())
            .unwrap_err();
        assert!(matches!(err, GraphError::Cycle { ref path } if path.len() == 2));
    }

    #[test]
    fn test_cycle_through_changing_configuration() {
        let mut project = Project::new("/src", "/out");
        let a = Recorder {
            down: Delta::new().append("trail", ["x"]),
            ..Recorder::with_deps(&["//b"])
        };
        project.add_package("a").unwrap().add_target("a", a).unwrap();
        project
            .add_package("b")
            .unwrap()
            .add_target("b", Recorder::with_deps(&["//a"]))
            .unwrap();

        let err = project
            .find_target(&id("//a"))
            .unwrap()
            .evaluate(&project, &Configuration::empty())
            .unwrap_err();

        match err {
            GraphError::Cycle { path } => {
                let path: Vec<_> = path.iter().map(ToString::to_string).collect();
                assert_eq!(path, ["//a:a", "//b:b", "//a:a"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    /// Depends on itself with a growing `stage` until the stage reaches 3.
    #[derive(Debug)]
    struct Staged;

    fn stage(cfg: &Configuration) -> i64 {
        match cfg.get("stage") {
            Some(Value::Int(n)) => *n,
            _ => 0,
        }
    }

    impl Rule for Staged {
        fn kind(&self) -> &'static str {
            "staged"
        }

        fn derive_down(&self, _cx: &RuleContext<'_>, cfg_up: &Configuration) -> Configuration {
            cfg_up.with("stage", stage(cfg_up) + 1)
        }

        fn derive_local(&self, _cx: &RuleContext<'_>, cfg_down: &Configuration) -> Configuration {
            let deps: Vec<&str> = if stage(cfg_down) < 3 { vec![":a"] } else { vec![] };
            cfg_down.with(DEPS_KEY, Value::list(deps))
        }
    }

    #[test]
    fn test_self_dependency_under_other_configuration() {
        let mut project = Project::new("/src", "/out");
        project.add_package("a").unwrap().add_target("a", Staged).unwrap();
        let target = project.find_target(&id("//a")).unwrap();

        let result = target.evaluate(&project, &Configuration::empty()).unwrap();

        assert_eq!(result.map.len(), 3);
        assert_eq!(target.evaluation_count(), 3);
    }

    #[test]
    fn test_concurrent_evaluation_computes_once() {
        let (project, recorders) = build(&[
            ("a", &["//b", "//c"]),
            ("b", &["//d"]),
            ("c", &["//d"]),
            ("d", &[]),
        ]);
        let cfg = Configuration::empty().with("mode", "release");
        let threads = 8;
        let barrier = Barrier::new(threads);

        let results: Vec<Arc<Evaluation>> = thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|i| {
                    let (project, barrier) = (&project, &barrier);
                    // fresh but equal configurations, and a mix of roots
                    let cfg = Configuration::empty().with("mode", "release");
                    let root = ["//a", "//b", "//c", "//d"][i % 4];
                    s.spawn(move || {
                        barrier.wait();
                        let target = project.find_target(&id(root)).unwrap();
                        target.evaluate(project, &cfg).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for name in ["a", "b", "c", "d"] {
            assert_eq!(recorders[name].calls(), 1, "{name} computed more than once");
        }
        for (i, result) in results.iter().enumerate() {
            let root = ["//a", "//b", "//c", "//d"][i % 4];
            let cached = project.find_target(&id(root)).unwrap().cached(&cfg).unwrap();
            assert!(Arc::ptr_eq(result, &cached));
        }
    }

    #[test]
    fn test_cycle_across_threads_fails_instead_of_waiting() {
        let mut project = Project::new("/src", "/out");
        for (name, dep) in [("a", "//b"), ("b", "//a")] {
            let rule = Recorder {
                delay: Duration::from_millis(200),
                ..Recorder::with_deps(&[dep])
            };
            project.add_package(name).unwrap().add_target(name, rule).unwrap();
        }
        let project = Arc::new(project);

        let (tx, rx) = mpsc::channel();
        for root in ["//a", "//b"] {
            let (project, tx) = (Arc::clone(&project), tx.clone());
            thread::spawn(move || {
                let target = project.find_target(&id(root)).unwrap();
                let result = target.evaluate(&project, &Configuration::empty());
                tx.send(result.map(|_| ())).unwrap();
            });
        }

        for _ in 0..2 {
            let result = rx
                .recv_timeout(Duration::from_secs(10))
                .expect("evaluation did not finish");
            assert!(matches!(result, Err(GraphError::Cycle { .. })), "{result:?}");
        }
    }

    /// Panics the first time it is asked for products.
    #[derive(Debug, Default)]
    struct Flaky {
        failed: AtomicBool,
    }

    impl Rule for Flaky {
        fn kind(&self) -> &'static str {
            "flaky"
        }

        fn using_and_products(
            &self,
            _cx: &RuleContext<'_>,
            _cfg_local: &Configuration,
        ) -> (Delta, Vec<Product>) {
            if !self.failed.swap(true, Ordering::SeqCst) {
                panic!("first call fails");
            }
            (Delta::new(), Vec::new())
        }
    }

    #[test]
    fn test_evaluation_recovers_after_panic() {
        let mut project = Project::new("/src", "/out");
        project
            .add_package("a")
            .unwrap()
            .add_target("a", Flaky::default())
            .unwrap();
        let target = project.find_target(&id("//a")).unwrap();
        let cfg = Configuration::empty();

        let first = panic::catch_unwind(AssertUnwindSafe(|| target.evaluate(&project, &cfg)));
        assert!(first.is_err());

        let second = target.evaluate(&project, &cfg).unwrap();
        assert!(second.products.is_empty());
        assert_eq!(target.evaluation_count(), 1);
    }

    #[test]
    fn test_missing_dependency_propagates() {
        let (project, recorders) = build(&[("a", &["//nowhere"])]);
        let target = project.find_target(&id("//a")).unwrap();
        let err = target.evaluate(&project, &Configuration::empty()).unwrap_err();

        assert!(matches!(err, GraphError::NotFound { missing: Missing::Package, .. }));
        assert_eq!(recorders["a"].calls(), 0);
        assert!(target.cached(&Configuration::empty()).is_none());
    }

    #[test]
    fn test_malformed_dependency() {
        let (project, _) = build(&[("a", &["b"])]);
        let err = project
            .find_target(&id("//a"))
            .unwrap()
            .evaluate(&project, &Configuration::empty())
            .unwrap_err();
        assert!(matches!(err, GraphError::Parse(_)));
    }

    #[derive(Debug)]
    struct Plain;

    impl Rule for Plain {
        fn kind(&self) -> &'static str {
            "plain"
        }
    }

    #[test]
    fn test_deps_must_be_a_list() {
        let mut project = Project::new("/src", "/out");
        project.add_package("a").unwrap().add_target("a", Plain).unwrap();

        let cfg = Configuration::empty().with(DEPS_KEY, "//b");
        let err = project
            .find_target(&id("//a"))
            .unwrap()
            .evaluate(&project, &cfg)
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidDependencies { found: "string", .. }));
    }

    #[test]
    fn test_default_hooks() {
        let mut project = Project::new("/src", "/out");
        project.add_package("a").unwrap().add_target("a", Plain).unwrap();
        let target = project.find_target(&id("//a")).unwrap();

        let cfg = Configuration::empty().with("k", "v");
        let result = target.evaluate(&project, &cfg).unwrap();
        assert!(result.products.is_empty());
        assert_eq!(
            result.map[&EvalKey::new(id("//a:a"), cfg.clone())],
            Ranked::new(0, Delta::new())
        );

        let package = project.package("a").unwrap();
        let cx = RuleContext {
            identifier: target.identifier(),
            package,
        };
        let dep_cfg = Configuration::empty().with("dep", true);
        assert_eq!(target.rule().derive_using(&cx, &cfg, &dep_cfg), dep_cfg);
    }
}
