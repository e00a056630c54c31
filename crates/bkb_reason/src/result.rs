//! Structured, read-only reasoning results.
//!
//! An [`InferenceResult`] is produced by [`analyze`](crate::analyze) and never
//! mutated afterwards. Everything a report needs is reachable through its
//! accessors; [`ResultSummary`] is the stable serialized form with node ids
//! replaced by readable facts.

use bkb_graph::{GraphStore, InodeId, SnodeId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::Result;
use crate::query::{Fact, MetaComparison};

/// One S-node chosen while deriving a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    /// The chosen support node.
    pub snode: SnodeId,
    /// The I-node it supports.
    pub head: InodeId,
    /// Its tail I-nodes.
    pub tails: Vec<InodeId>,
    /// Its weight.
    pub weight: f64,
    /// Rule hops between the target and `head`.
    pub depth: usize,
}

/// A meta-evidence bucket used as a leaf, with its admissible fraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetaLeaf {
    /// The bucket I-node.
    pub inode: InodeId,
    /// Admissible fraction of the bucket in `(0, 1]`.
    pub fraction: f64,
}

/// A consistent set of S-nodes deriving one target I-node from evidence,
/// admissible meta buckets and unconditional facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferencePath {
    /// The derived target I-node.
    pub target: InodeId,
    /// Chosen S-nodes in the order they were expanded.
    pub steps: Vec<PathStep>,
    /// Evidence I-nodes the path bottoms out in, sorted.
    pub evidence: Vec<InodeId>,
    /// Meta-evidence buckets the path bottoms out in.
    pub meta_leaves: Vec<MetaLeaf>,
    /// Product of step weights and meta fractions.
    pub weight: f64,
}

impl InferencePath {
    /// Every I-node the path asserts, sorted and de-duplicated.
    pub fn inodes(&self) -> Vec<InodeId> {
        let mut all: BTreeSet<InodeId> = BTreeSet::new();
        all.insert(self.target);
        for step in &self.steps {
            all.insert(step.head);
            all.extend(step.tails.iter().copied());
        }
        all.extend(self.evidence.iter().copied());
        all.extend(self.meta_leaves.iter().map(|leaf| leaf.inode));
        all.into_iter().collect()
    }

    /// The S-nodes of the path, sorted.
    pub fn snodes(&self) -> Vec<SnodeId> {
        let mut ids: Vec<SnodeId> = self.steps.iter().map(|s| s.snode).collect();
        ids.sort_unstable();
        ids
    }

    /// Deepest rule hop in the path.
    pub fn depth(&self) -> usize {
        self.steps.iter().map(|s| s.depth + 1).max().unwrap_or(0)
    }
}

/// One completed path and the target state it supports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    /// Target variable.
    pub variable: String,
    /// Target state.
    pub state: String,
    /// The supporting path.
    pub path: InferencePath,
    /// Source knowledge bases of the path's S-nodes, sorted.
    pub sources: Vec<String>,
}

impl Contribution {
    /// The path weight.
    pub fn weight(&self) -> f64 {
        self.path.weight
    }
}

/// Mass and normalized probability of one target state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateProbability {
    /// The state.
    pub state: String,
    /// Its I-node.
    pub inode: InodeId,
    /// Sum of contributing path weights.
    pub mass: f64,
    /// `mass` normalized over the variable's states.
    pub probability: f64,
}

/// Distribution over the states of one target variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDistribution {
    /// The variable.
    pub variable: String,
    /// Every state of the variable, in store order.
    pub states: Vec<StateProbability>,
}

impl TargetDistribution {
    /// Probability of `state`, if the variable has it.
    pub fn probability(&self, state: &str) -> Option<f64> {
        self.states
            .iter()
            .find(|s| s.state == state)
            .map(|s| s.probability)
    }

    /// Total mass over all states.
    pub fn total_mass(&self) -> f64 {
        self.states.iter().map(|s| s.mass).sum()
    }

    /// Returns `true` if at least one path reached a state.
    pub fn is_supported(&self) -> bool {
        self.total_mass() > 0.0
    }

    /// The most probable state, first in store order on ties.
    pub fn most_probable(&self) -> Option<&StateProbability> {
        self.states
            .iter()
            .filter(|s| s.mass > 0.0)
            .fold(None, |best: Option<&StateProbability>, s| match best {
                Some(b) if b.probability >= s.probability => Some(b),
                _ => Some(s),
            })
    }
}

/// Mass of one bucket of a meta-target variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketMass {
    /// Bucket state.
    pub state: String,
    /// Bucket I-node.
    pub inode: InodeId,
    /// Lower boundary.
    pub lower: f64,
    /// Upper boundary.
    pub upper: f64,
    /// Sum of path weights deriving the bucket.
    pub mass: f64,
    /// Fraction of the bucket satisfying the comparison.
    pub fraction: f64,
}

/// Probability that a meta-target comparison holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaTargetOutcome {
    /// The comparison asked for.
    pub comparison: MetaComparison,
    /// `Σ mass·fraction / Σ mass`, or 0 when no bucket was derived.
    pub probability: f64,
    /// Per-bucket detail.
    pub buckets: Vec<BucketMass>,
}

impl MetaTargetOutcome {
    /// Total mass over all buckets.
    pub fn total_mass(&self) -> f64 {
        self.buckets.iter().map(|b| b.mass).sum()
    }
}

/// A consistent combination of one path per target variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedInference {
    /// One assignment per target variable, in target order.
    pub assignments: Vec<Fact>,
    /// Union of the combined paths' S-nodes, sorted.
    pub snodes: Vec<SnodeId>,
    /// Union of the combined paths' I-nodes, sorted.
    pub inodes: Vec<InodeId>,
    /// Product over `snodes` and the meta leaves, each counted once.
    pub weight: f64,
    /// `weight` normalized over all completed inferences.
    pub probability: f64,
}

/// Non-fatal outcomes worth reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// A completed path failed mutex re-validation and was discarded.
    MutexRejected {
        /// Target of the discarded path.
        target: InodeId,
        /// The conflicting pairs found.
        violations: Vec<(InodeId, InodeId)>,
    },
    /// No consistent path reached any state of a target variable.
    NoPathFound {
        /// The unreachable variable.
        variable: String,
    },
}

/// Why a result may be incomplete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PartialReason {
    /// Some branch below `target` was cut at the depth budget.
    DepthExceeded {
        /// Target whose search was cut.
        target: InodeId,
    },
    /// The per-target expansion budget ran out.
    ExpansionBudget {
        /// Target whose search stopped.
        target: InodeId,
    },
    /// The query's wall-clock budget ran out.
    TimeBudget {
        /// Target whose search stopped.
        target: InodeId,
    },
    /// Completed inferences stopped after `limit` combinations.
    JointBudget {
        /// The combination budget.
        limit: usize,
    },
}

impl fmt::Display for PartialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartialReason::DepthExceeded { target } => {
                write!(f, "depth budget exceeded below {}", target)
            }
            PartialReason::ExpansionBudget { target } => {
                write!(f, "expansion budget exhausted for {}", target)
            }
            PartialReason::TimeBudget { target } => {
                write!(f, "time budget exhausted while searching {}", target)
            }
            PartialReason::JointBudget { limit } => {
                write!(f, "completed inferences stopped after {} combinations", limit)
            }
        }
    }
}

/// Search counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Target I-nodes searched.
    pub targets_searched: usize,
    /// Work-stack pops.
    pub expansions: usize,
    /// Paths completed by the search.
    pub completed_paths: usize,
    /// Completed paths discarded by mutex re-validation.
    pub rejected_by_mutex: usize,
    /// Branches abandoned on a conflicting assignment.
    pub abandoned_conflicts: usize,
    /// Branches with an unsupported goal.
    pub dead_ends: usize,
    /// Branches cut at the depth budget.
    pub depth_cutoffs: usize,
    /// Path combinations tried for completed inferences.
    pub joint_combinations: usize,
}

impl SearchStats {
    /// Adds `other`'s counters into `self`.
    pub fn merge(&mut self, other: &SearchStats) {
        self.targets_searched += other.targets_searched;
        self.expansions += other.expansions;
        self.completed_paths += other.completed_paths;
        self.rejected_by_mutex += other.rejected_by_mutex;
        self.abandoned_conflicts += other.abandoned_conflicts;
        self.dead_ends += other.dead_ends;
        self.depth_cutoffs += other.depth_cutoffs;
        self.joint_combinations += other.joint_combinations;
    }
}

/// The outcome of one reasoning call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InferenceResult {
    pub(crate) query_name: Option<String>,
    pub(crate) probabilities: IndexMap<String, TargetDistribution>,
    pub(crate) contributions: Vec<Contribution>,
    pub(crate) meta_targets: Vec<MetaTargetOutcome>,
    pub(crate) completed: Vec<CompletedInference>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) partial: Vec<PartialReason>,
    pub(crate) stats: SearchStats,
}

impl InferenceResult {
    pub(crate) fn empty(query_name: Option<&str>) -> Self {
        Self {
            query_name: query_name.map(str::to_string),
            ..Self::default()
        }
    }

    /// Name of the query this result answers.
    pub fn query_name(&self) -> Option<&str> {
        self.query_name.as_deref()
    }

    /// Distributions per target variable, in target order.
    pub fn probabilities(&self) -> &IndexMap<String, TargetDistribution> {
        &self.probabilities
    }

    /// Probability of `variable = state`, if `variable` was a target.
    pub fn probability(&self, variable: &str, state: &str) -> Option<f64> {
        self.probabilities.get(variable)?.probability(state)
    }

    /// Every accepted path, heaviest first.
    pub fn contributions(&self) -> &[Contribution] {
        &self.contributions
    }

    /// Accepted paths for one variable, heaviest first.
    pub fn contributions_for<'s>(&'s self, variable: &'s str) -> impl Iterator<Item = &'s Contribution> + 's {
        self.contributions
            .iter()
            .filter(move |c| c.variable == variable)
    }

    /// Meta-target outcomes, in query order.
    pub fn meta_targets(&self) -> &[MetaTargetOutcome] {
        &self.meta_targets
    }

    /// Completed inferences, most probable first.
    pub fn completed_inferences(&self) -> &[CompletedInference] {
        &self.completed
    }

    /// Non-fatal diagnostics.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Reasons the result may be incomplete; empty for a complete result.
    pub fn partial(&self) -> &[PartialReason] {
        &self.partial
    }

    /// Returns `true` if any budget was exceeded.
    pub fn is_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    /// Search counters.
    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Returns `true` if nothing was asked for.
    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty() && self.meta_targets.is_empty()
    }

    /// All S-nodes used by any contribution, sorted.
    pub fn contributing_snodes(&self) -> Vec<SnodeId> {
        let ids: BTreeSet<SnodeId> = self
            .contributions
            .iter()
            .flat_map(|c| c.path.steps.iter().map(|s| s.snode))
            .collect();
        ids.into_iter().collect()
    }

    /// The sub-store induced by the contributing S-nodes.
    pub fn support_graph(&self, store: &GraphStore) -> Result<GraphStore> {
        Ok(store.subgraph(self.contributing_snodes())?)
    }

    /// Renders the result with readable facts instead of node ids.
    pub fn to_summary(&self, store: &GraphStore) -> Result<ResultSummary> {
        let mut probabilities = IndexMap::new();
        for (variable, distribution) in &self.probabilities {
            let states: IndexMap<String, f64> = distribution
                .states
                .iter()
                .map(|s| (s.state.clone(), s.probability))
                .collect();
            probabilities.insert(variable.clone(), states);
        }

        let contributions = self
            .contributions
            .iter()
            .map(|c| {
                let rules = c
                    .path
                    .steps
                    .iter()
                    .map(|s| store.describe_snode(s.snode))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                let mut evidence = c
                    .path
                    .evidence
                    .iter()
                    .map(|&id| store.inode(id).map(ToString::to_string))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                for leaf in &c.path.meta_leaves {
                    evidence.push(format!("{} (x{})", store.inode(leaf.inode)?, leaf.fraction));
                }
                Ok(ContributionSummary {
                    target: format!("{}={}", c.variable, c.state),
                    weight: c.path.weight,
                    rules,
                    evidence,
                    sources: c.sources.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let meta_targets = self
            .meta_targets
            .iter()
            .map(|m| MetaTargetSummary {
                comparison: m.comparison.to_string(),
                probability: m.probability,
            })
            .collect();

        let completed_inferences = self
            .completed
            .iter()
            .map(|ci| CompletedSummary {
                assignments: ci.assignments.iter().map(ToString::to_string).collect(),
                weight: ci.weight,
                probability: ci.probability,
            })
            .collect();

        let diagnostics = self
            .diagnostics
            .iter()
            .map(|d| describe_diagnostic(store, d))
            .collect::<Result<Vec<_>>>()?;

        let partial = self
            .partial
            .iter()
            .map(|p| describe_partial(store, p))
            .collect::<Result<Vec<_>>>()?;

        Ok(ResultSummary {
            query: self.query_name.clone(),
            probabilities,
            contributions,
            meta_targets,
            completed_inferences,
            diagnostics,
            partial,
            stats: self.stats,
        })
    }

    /// [`to_summary`](Self::to_summary) as pretty-printed JSON.
    pub fn to_json(&self, store: &GraphStore) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_summary(store)?)?)
    }
}

pub(crate) fn describe_diagnostic(store: &GraphStore, diagnostic: &Diagnostic) -> Result<String> {
    Ok(match diagnostic {
        Diagnostic::MutexRejected { target, violations } => {
            let pairs = violations
                .iter()
                .map(|&(a, b)| Ok(format!("{} / {}", store.inode(a)?, store.inode(b)?)))
                .collect::<Result<Vec<_>>>()?;
            format!(
                "path for {} rejected: {}",
                store.inode(*target)?,
                pairs.join(", ")
            )
        }
        Diagnostic::NoPathFound { variable } => {
            format!("no consistent path reaches {}", variable)
        }
    })
}

pub(crate) fn describe_partial(store: &GraphStore, reason: &PartialReason) -> Result<String> {
    Ok(match reason {
        PartialReason::DepthExceeded { target } => {
            format!("depth budget exceeded below {}", store.inode(*target)?)
        }
        PartialReason::ExpansionBudget { target } => {
            format!("expansion budget exhausted for {}", store.inode(*target)?)
        }
        PartialReason::TimeBudget { target } => {
            format!("time budget exhausted while searching {}", store.inode(*target)?)
        }
        PartialReason::JointBudget { .. } => reason.to_string(),
    })
}

/// Serializable view of an [`InferenceResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    /// Query name.
    pub query: Option<String>,
    /// variable → state → probability.
    pub probabilities: IndexMap<String, IndexMap<String, f64>>,
    /// Contributions, heaviest first.
    pub contributions: Vec<ContributionSummary>,
    /// Meta-target probabilities.
    pub meta_targets: Vec<MetaTargetSummary>,
    /// Completed inferences.
    pub completed_inferences: Vec<CompletedSummary>,
    /// Rendered diagnostics.
    pub diagnostics: Vec<String>,
    /// Rendered partial reasons.
    pub partial: Vec<String>,
    /// Search counters.
    pub stats: SearchStats,
}

/// Serializable view of a [`Contribution`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionSummary {
    /// `variable=state`.
    pub target: String,
    /// Path weight.
    pub weight: f64,
    /// Rules in expansion order.
    pub rules: Vec<String>,
    /// Evidence and meta leaves.
    pub evidence: Vec<String>,
    /// Source knowledge bases.
    pub sources: Vec<String>,
}

/// Serializable view of a [`MetaTargetOutcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaTargetSummary {
    /// The comparison, e.g. `Survival_Time >= 300`.
    pub comparison: String,
    /// Probability that it holds.
    pub probability: f64,
}

/// Serializable view of a [`CompletedInference`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedSummary {
    /// `variable=state` assignments.
    pub assignments: Vec<String>,
    /// Joint weight.
    pub weight: f64,
    /// Joint probability.
    pub probability: f64,
}
