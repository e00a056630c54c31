//! Mutual-exclusion checks.
//!
//! Two I-nodes are mutually exclusive when they give one variable different
//! states. A derivation, a path, or a completed inference containing such a
//! pair cannot describe one consistent world.
//!
//! [`MutexValidator::check_graph`] inspects the knowledge base itself: it
//! walks every maximal derivation rooted at a sink I-node (one that no
//! S-node requires), choosing one supporter per I-node, and reports every
//! conflicting pair that co-occurs. The walk does no conflict pruning and is
//! bounded by a derivation budget.

use bkb_graph::{GraphStore, InodeId};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::error::Result;
use crate::result::{InferencePath, InferenceResult};

/// Default number of derivations [`MutexValidator::check_graph`] explores.
pub const DEFAULT_MAX_DERIVATIONS: usize = 10_000;

/// Outcome of a mutex check.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MutexReport {
    /// `true` when no violation was found.
    pub consistent: bool,
    /// Conflicting pairs `(a, b)` with `a < b`, sorted and de-duplicated.
    pub violations: Vec<(InodeId, InodeId)>,
    /// Derivations, paths or inferences inspected.
    pub explored: usize,
    /// `true` if the derivation budget stopped the walk early.
    pub truncated: bool,
}

impl MutexReport {
    fn from_parts(violations: BTreeSet<(InodeId, InodeId)>, explored: usize, truncated: bool) -> Self {
        Self {
            consistent: violations.is_empty(),
            violations: violations.into_iter().collect(),
            explored,
            truncated,
        }
    }

    /// Renders each violation as a readable line.
    pub fn explain(&self, store: &GraphStore) -> Result<Vec<String>> {
        self.violations
            .iter()
            .map(|&(a, b)| {
                let first = store.inode(a)?;
                let second = store.inode(b)?;
                Ok(format!(
                    "Mutex violation:\n  1. {} ({})\n  2. {} ({})\n  Reason: {} cannot take both states",
                    first, a, second, b, first.variable
                ))
            })
            .collect()
    }
}

/// Checks knowledge bases, paths and results for mutually exclusive I-nodes.
///
/// The validator holds no per-check state and can be shared across threads.
#[derive(Debug, Clone, Copy)]
pub struct MutexValidator {
    max_derivations: usize,
}

impl Default for MutexValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl MutexValidator {
    /// Creates a validator with [`DEFAULT_MAX_DERIVATIONS`].
    pub fn new() -> Self {
        Self {
            max_derivations: DEFAULT_MAX_DERIVATIONS,
        }
    }

    /// Creates a validator exploring at most `max_derivations` derivations.
    pub fn with_limit(max_derivations: usize) -> Self {
        Self { max_derivations }
    }

    /// Walks every maximal derivation of the knowledge base.
    pub fn check_graph(&self, store: &GraphStore) -> Result<MutexReport> {
        let mut violations = BTreeSet::new();
        let mut explored = 0usize;
        let mut truncated = false;

        'sinks: for (sink, _) in store.inodes() {
            if !self.is_sink(store, sink)? || self.supporters(store, sink)?.is_empty() {
                continue;
            }

            let mut stack = vec![Derivation::rooted_at(sink)];
            while let Some(mut derivation) = stack.pop() {
                let Some(goal) = derivation.pending.pop() else {
                    if explored >= self.max_derivations {
                        truncated = true;
                        break 'sinks;
                    }
                    explored += 1;
                    let inodes: Vec<InodeId> = derivation.inodes.iter().copied().collect();
                    violations.extend(conflicting_pairs(store, &inodes)?);
                    continue;
                };

                if !derivation.expanded.insert(goal) {
                    stack.push(derivation);
                    continue;
                }

                let supporters = self.supporters(store, goal)?;
                if supporters.is_empty() {
                    stack.push(derivation);
                    continue;
                }

                for tails in supporters.into_iter().rev() {
                    let mut child = derivation.clone();
                    child.inodes.extend(tails.iter().copied());
                    child.pending.extend(tails);
                    stack.push(child);
                }
            }
        }

        if truncated {
            warn!(
                "Mutex check stopped after {} derivations; result is incomplete",
                explored
            );
        }
        debug!(
            "Mutex check explored {} derivations, {} violations",
            explored,
            violations.len()
        );
        Ok(MutexReport::from_parts(violations, explored, truncated))
    }

    /// Checks one inference path.
    pub fn check_path(&self, store: &GraphStore, path: &InferencePath) -> Result<MutexReport> {
        let violations = conflicting_pairs(store, &path.inodes())?;
        Ok(MutexReport::from_parts(violations.into_iter().collect(), 1, false))
    }

    /// Checks every contribution and every completed inference of a result.
    pub fn check_result(&self, store: &GraphStore, result: &InferenceResult) -> Result<MutexReport> {
        let mut violations = BTreeSet::new();
        let mut explored = 0usize;

        for contribution in result.contributions() {
            violations.extend(conflicting_pairs(store, &contribution.path.inodes())?);
            explored += 1;
        }
        for inference in result.completed_inferences() {
            violations.extend(conflicting_pairs(store, &inference.inodes)?);
            explored += 1;
        }

        Ok(MutexReport::from_parts(violations, explored, false))
    }

    /// Tail sets of the active S-nodes supporting `inode`.
    fn supporters(&self, store: &GraphStore, inode: InodeId) -> Result<Vec<Vec<InodeId>>> {
        let mut out = Vec::new();
        for &sid in store.support_nodes_concluding_fact(inode) {
            let snode = store.snode(sid)?;
            if snode.is_active() {
                out.push(snode.tails.clone());
            }
        }
        Ok(out)
    }

    fn is_sink(&self, store: &GraphStore, inode: InodeId) -> Result<bool> {
        for &sid in store.support_nodes_requiring_fact(inode) {
            if store.snode(sid)?.is_active() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Checks the whole knowledge base with a default [`MutexValidator`].
pub fn check_mutex(store: &GraphStore) -> Result<MutexReport> {
    MutexValidator::new().check_graph(store)
}

#[derive(Debug, Clone)]
struct Derivation {
    pending: Vec<InodeId>,
    expanded: HashSet<InodeId>,
    inodes: BTreeSet<InodeId>,
}

impl Derivation {
    fn rooted_at(sink: InodeId) -> Self {
        Self {
            pending: vec![sink],
            expanded: HashSet::new(),
            inodes: BTreeSet::from([sink]),
        }
    }
}

/// All pairs of I-nodes in `inodes` that assign one variable different states.
pub(crate) fn conflicting_pairs(
    store: &GraphStore,
    inodes: &[InodeId],
) -> Result<Vec<(InodeId, InodeId)>> {
    let mut pairs = Vec::new();
    for (i, &a) in inodes.iter().enumerate() {
        let first = store.inode(a)?;
        for &b in &inodes[i + 1..] {
            if a != b && first.is_mutex_with(store.inode(b)?) {
                pairs.push((a.min(b), a.max(b)));
            }
        }
    }
    pairs.sort_unstable();
    pairs.dedup();
    Ok(pairs)
}
