//! Ranked result maps and the two primitives that merge them.
//!
//! An evaluation returns a [`RankMap`] from every `(target, configuration)`
//! reached in its subgraph to that evaluation's configuration delta, tagged
//! with a rank: the number of edges walked from the evaluation point. Ranks
//! only exist to put deltas in a reproducible order, so that folding them
//! gives bit-identical configurations on every run.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use serde::Serialize;

use crate::core::configuration::{Configuration, Delta};
use crate::core::identifier::Identifier;

/// A single target evaluation: the target and its starting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EvalKey {
    pub target: Identifier,
    pub configuration: Configuration,
}

impl EvalKey {
    pub fn new(target: Identifier, configuration: Configuration) -> Self {
        EvalKey {
            target,
            configuration,
        }
    }
}

/// A delta together with its distance from the evaluation point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ranked {
    pub rank: u32,
    pub delta: Delta,
}

impl Ranked {
    pub fn new(rank: u32, delta: Delta) -> Self {
        Ranked { rank, delta }
    }
}

/// Evaluation result map.
pub type RankMap = HashMap<EvalKey, Ranked>;

/// Merge the maps of several direct dependencies.
///
/// Every rank grows by one, for the edge from the caller to the dependency.
/// When the same key was reached through several dependencies the largest
/// rank wins, so a converging node sorts after everything on its longest
/// path.
pub fn combine_ranked<'a>(maps: impl IntoIterator<Item = &'a RankMap>) -> RankMap {
    let mut merged = RankMap::new();

    for map in maps {
        for (key, ranked) in map {
            let rank = ranked.rank + 1;
            match merged.entry(key.clone()) {
                Entry::Occupied(mut slot) => {
                    // One (target, configuration) is evaluated exactly once,
                    // so every path carries the same delta.
                    debug_assert_eq!(slot.get().delta, ranked.delta);
                    if rank > slot.get().rank {
                        *slot.get_mut() = Ranked::new(rank, ranked.delta.clone());
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(Ranked::new(rank, ranked.delta.clone()));
                }
            }
        }
    }

    merged
}

/// Sort a map's entries into a reproducible application order.
///
/// The order is `(rank, target, configuration digest, delta)`, all
/// ascending. It never depends on the map's iteration order.
pub fn deterministic_order(map: &RankMap) -> Vec<(&EvalKey, &Ranked)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|(ka, ra), (kb, rb)| {
        ra.rank
            .cmp(&rb.rank)
            .then_with(|| ka.target.cmp(&kb.target))
            .then_with(|| ka.configuration.cmp(&kb.configuration))
            .then_with(|| ra.delta.cmp(&rb.delta))
    });
    entries
}
