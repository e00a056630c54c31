//! Backtracking path search below one target I-node.
//!
//! The search works backward from the target through the head index. Each
//! entry of the work stack is a [`PartialPath`] that owns everything its
//! branch has decided so far, so branches never share mutable state and
//! whole targets can be searched on different threads.

use bkb_graph::{GraphStore, InodeId};
use log::trace;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::error::Result;
use crate::result::{InferencePath, MetaLeaf, PartialReason, PathStep, SearchStats};

/// Read-only state shared by every target search of one query.
#[derive(Debug)]
pub(crate) struct SearchContext<'a> {
    store: &'a GraphStore,
    /// Evidence variable → observed I-node.
    evidence: HashMap<&'a str, InodeId>,
    /// Meta-evidence variable → admissible bucket I-node → fraction.
    meta_evidence: HashMap<&'a str, HashMap<InodeId, f64>>,
    max_depth: usize,
    max_expansions: usize,
    deadline: Option<Instant>,
}

/// Paths completed below one target, with the counters of the search.
#[derive(Debug)]
pub(crate) struct TargetSearch {
    pub target: InodeId,
    pub paths: Vec<InferencePath>,
    pub stats: SearchStats,
    pub partial: Vec<PartialReason>,
}

/// One branch of the search.
#[derive(Debug, Clone)]
struct PartialPath<'a> {
    steps: Vec<PathStep>,
    asserted: HashMap<&'a str, InodeId>,
    resolved: HashSet<InodeId>,
    pending: Vec<(InodeId, usize)>,
    evidence_used: Vec<InodeId>,
    meta_leaves: Vec<MetaLeaf>,
    weight: f64,
}

impl<'a> PartialPath<'a> {
    fn root(target: InodeId, evidence: &HashMap<&'a str, InodeId>) -> Self {
        Self {
            steps: Vec::new(),
            asserted: evidence.clone(),
            resolved: HashSet::new(),
            pending: vec![(target, 0)],
            evidence_used: Vec::new(),
            meta_leaves: Vec::new(),
            weight: 1.0,
        }
    }

    fn conflicts(&self, variable: &str, inode: InodeId) -> bool {
        matches!(self.asserted.get(variable), Some(&held) if held != inode)
    }

    fn finish(mut self, target: InodeId) -> InferencePath {
        self.evidence_used.sort_unstable();
        InferencePath {
            target,
            steps: self.steps,
            evidence: self.evidence_used,
            meta_leaves: self.meta_leaves,
            weight: self.weight,
        }
    }
}

impl<'a> SearchContext<'a> {
    pub fn new(
        store: &'a GraphStore,
        evidence: HashMap<&'a str, InodeId>,
        meta_evidence: HashMap<&'a str, HashMap<InodeId, f64>>,
        max_depth: usize,
        max_expansions: usize,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            store,
            evidence,
            meta_evidence,
            max_depth,
            max_expansions,
            deadline,
        }
    }

    /// Enumerates every consistent path deriving `target`.
    ///
    /// Budgets stop the search early without failing it; the reasons are
    /// returned in [`TargetSearch::partial`].
    pub fn search_target(&self, target: InodeId) -> Result<TargetSearch> {
        let mut stats = SearchStats {
            targets_searched: 1,
            ..SearchStats::default()
        };
        let mut paths = Vec::new();
        let mut partial = Vec::new();
        let mut stack = vec![PartialPath::root(target, &self.evidence)];

        while let Some(mut path) = stack.pop() {
            if stats.expansions >= self.max_expansions {
                partial.push(PartialReason::ExpansionBudget { target });
                break;
            }
            if self.deadline.is_some_and(|d| Instant::now() >= d) {
                partial.push(PartialReason::TimeBudget { target });
                break;
            }
            stats.expansions += 1;

            let Some((goal, depth)) = path.pending.pop() else {
                stats.completed_paths += 1;
                paths.push(path.finish(target));
                continue;
            };

            if path.resolved.contains(&goal) {
                stack.push(path);
                continue;
            }

            let inode = self.store.inode(goal)?;
            let variable = inode.variable.as_str();

            if path.conflicts(variable, goal) {
                trace!("{}: {} conflicts with an asserted state", target, inode);
                stats.abandoned_conflicts += 1;
                continue;
            }

            if self.evidence.get(variable) == Some(&goal) {
                path.resolved.insert(goal);
                path.evidence_used.push(goal);
                stack.push(path);
                continue;
            }

            if let Some(admissible) = self.meta_evidence.get(variable) {
                match admissible.get(&goal) {
                    Some(&fraction) => {
                        path.asserted.insert(variable, goal);
                        path.resolved.insert(goal);
                        path.weight *= fraction;
                        path.meta_leaves.push(MetaLeaf {
                            inode: goal,
                            fraction,
                        });
                        stack.push(path);
                    }
                    None => {
                        trace!("{}: bucket {} is excluded by meta-evidence", target, inode);
                        stats.abandoned_conflicts += 1;
                    }
                }
                continue;
            }

            if depth > self.max_depth {
                trace!("{}: depth budget reached at {}", target, inode);
                stats.depth_cutoffs += 1;
                continue;
            }

            let mut children = Vec::new();
            'supporters: for &sid in self.store.support_nodes_concluding_fact(goal) {
                let snode = self.store.snode(sid)?;
                if !snode.is_active() {
                    continue;
                }

                let mut tails = Vec::with_capacity(snode.tails.len());
                for &tail in &snode.tails {
                    let tail_variable = self.store.inode(tail)?.variable.as_str();
                    if path.conflicts(tail_variable, tail) {
                        stats.abandoned_conflicts += 1;
                        continue 'supporters;
                    }
                    tails.push((tail_variable, tail));
                }

                let mut child = path.clone();
                child.asserted.insert(variable, goal);
                child.resolved.insert(goal);
                for &(tail_variable, tail) in &tails {
                    child.asserted.insert(tail_variable, tail);
                    child.pending.push((tail, depth + 1));
                }
                child.weight *= snode.weight;
                child.steps.push(PathStep {
                    snode: sid,
                    head: goal,
                    tails: snode.tails.clone(),
                    weight: snode.weight,
                    depth,
                });
                children.push(child);
            }

            if children.is_empty() {
                trace!("{}: no usable support for {}", target, inode);
                stats.dead_ends += 1;
            }
            // First supporter is explored first.
            stack.extend(children.into_iter().rev());
        }

        if stats.depth_cutoffs > 0 {
            partial.insert(0, PartialReason::DepthExceeded { target });
        }

        Ok(TargetSearch {
            target,
            paths,
            stats,
            partial,
        })
    }
}
