//! The inference engine.
//!
//! One [`analyze`](InferenceEngine::analyze) call runs these stages:
//!
//! 1. **Resolve** the query against the store: evidence I-nodes, admissible
//!    meta-evidence buckets with their fractions, target variables and
//!    meta-target bucket plans. Problems with the query fail here, before
//!    any traversal.
//! 2. **Search** every target I-node in parallel (see [`crate::search`]).
//! 3. **Assemble** the result: optional mutex re-validation, per-variable
//!    normalization, meta-target probabilities and completed inferences.
//!
//! # Example
//!
//! ```
//! use bkb_graph::GraphStore;
//! use bkb_reason::{AnalyzeOptions, InferenceEngine, MetadataTable, Query};
//!
//! # fn main() -> Result<(), bkb_reason::Error> {
//! let mut store = GraphStore::new();
//! let a = store.add_inode("A", "True")?;
//! let b = store.add_inode("B", "High")?;
//! store.add_snode(b, [a], 0.8)?;
//!
//! let metadata = MetadataTable::new();
//! let engine = InferenceEngine::new(&store, &metadata);
//! let query = Query::builder().evidence("A", "True").target("B").build()?;
//! let result = engine.analyze(&query, &AnalyzeOptions::default())?;
//!
//! assert_eq!(result.probability("B", "High"), Some(1.0));
//! # Ok(())
//! # }
//! ```

use bkb_graph::{GraphStore, InodeId};
use indexmap::{IndexMap, IndexSet};
use log::{debug, trace, warn};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use crate::config::{AnalyzeOptions, TargetStrategy};
use crate::error::{Error, Result};
use crate::interpolation::Interpolator;
use crate::joint::{complete_inferences, JointGroup};
use crate::metadata::{MetaRanges, MetadataSource};
use crate::mutex::MutexValidator;
use crate::query::{MetaComparison, Query};
use crate::result::{
    BucketMass, Contribution, Diagnostic, InferencePath, InferenceResult, MetaTargetOutcome,
    PartialReason, StateProbability, TargetDistribution,
};
use crate::search::{SearchContext, TargetSearch};

/// Runs queries against one knowledge base and its metadata.
///
/// The engine only borrows its inputs; any number of engines may share a
/// store across threads.
#[derive(Clone, Copy)]
pub struct InferenceEngine<'a> {
    store: &'a GraphStore,
    metadata: &'a dyn MetadataSource,
}

/// A meta-target comparison resolved against its buckets.
struct MetaTargetPlan<'a> {
    comparison: &'a MetaComparison,
    ranges: &'a MetaRanges,
    /// (bucket index, bucket I-node, admitted fraction) for buckets present in the store.
    buckets: Vec<(usize, InodeId, f64)>,
}

impl<'a> InferenceEngine<'a> {
    /// Creates an engine over `store` and `metadata`.
    pub fn new(store: &'a GraphStore, metadata: &'a dyn MetadataSource) -> Self {
        Self { store, metadata }
    }

    /// The knowledge base this engine reads.
    pub fn store(&self) -> &'a GraphStore {
        self.store
    }

    /// Answers `query`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidQuery`] for unknown evidence facts, unknown target
    ///   variables, or meta-variables without metadata.
    /// - [`Error::EvidenceUnsatisfiable`] for two states of one evidence
    ///   variable, or meta-evidence no observed bucket satisfies.
    /// - [`Error::Interpolation`] when the interpolation mode cannot resolve
    ///   a threshold.
    ///
    /// Paths without support and exceeded budgets are not errors; they are
    /// recorded in the result.
    pub fn analyze(&self, query: &Query, options: &AnalyzeOptions) -> Result<InferenceResult> {
        let started = Instant::now();
        let deadline = options.time_budget.map(|budget| started + budget);
        query.validate()?;

        let interpolator = options.interpolation.interpolator();
        let evidence = self.resolve_evidence(query)?;
        let meta_evidence = self.resolve_meta_evidence(query, interpolator)?;
        let meta_plans = self.resolve_meta_targets(query, interpolator)?;
        let targets = self.select_targets(query, options, &evidence, &meta_evidence)?;

        if targets.is_empty() && meta_plans.is_empty() {
            debug!("Query {:?} has no targets; returning an empty result", query.name());
            return Ok(InferenceResult::empty(query.name()));
        }

        let mut jobs: IndexSet<InodeId> = IndexSet::new();
        for variable in &targets {
            jobs.extend(self.store.nodes_for_variable(variable).iter().copied());
        }
        for plan in &meta_plans {
            jobs.extend(plan.buckets.iter().map(|&(_, inode, _)| inode));
        }
        let jobs: Vec<InodeId> = jobs.into_iter().collect();

        debug!(
            "Analyzing query {:?}: {} evidence facts, {} meta-evidence variables, {} targets, {} meta-targets, {} target I-nodes ({} interpolation)",
            query.name(),
            evidence.len(),
            meta_evidence.len(),
            targets.len(),
            meta_plans.len(),
            jobs.len(),
            options.interpolation.name()
        );

        let context = SearchContext::new(
            self.store,
            evidence,
            meta_evidence,
            options.max_depth,
            options.max_expansions,
            deadline,
        );
        let searches = run_searches(&context, &jobs, options.fan_out)?;

        let result = self.assemble(query, options, &targets, &meta_plans, searches)?;

        if result.is_partial() {
            warn!(
                "Query {:?} returned a partial result: {}",
                query.name(),
                result
                    .partial()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ")
            );
        }
        debug!(
            "Query {:?} finished in {:?}: {} contributions, {} completed inferences, {} expansions",
            query.name(),
            started.elapsed(),
            result.contributions().len(),
            result.completed_inferences().len(),
            result.stats().expansions
        );
        Ok(result)
    }

    fn resolve_evidence(&self, query: &Query) -> Result<HashMap<&'a str, InodeId>> {
        let mut by_variable: IndexMap<&str, Vec<&str>> = IndexMap::new();
        for fact in query.evidence() {
            let states = by_variable.entry(fact.variable.as_str()).or_default();
            if !states.contains(&fact.state.as_str()) {
                states.push(fact.state.as_str());
            }
        }
        if let Some((variable, states)) = by_variable.iter().find(|(_, s)| s.len() > 1) {
            return Err(Error::EvidenceUnsatisfiable {
                variable: variable.to_string(),
                states: states.iter().map(|s| s.to_string()).collect(),
            });
        }

        let mut evidence = HashMap::new();
        for fact in query.evidence() {
            let id = self
                .store
                .find_inode(&fact.variable, &fact.state)
                .ok_or_else(|| {
                    Error::InvalidQuery(format!("evidence {} is not in the knowledge base", fact))
                })?;
            evidence.insert(self.store.inode(id)?.variable.as_str(), id);
        }
        Ok(evidence)
    }

    fn ranges_for(&self, variable: &str) -> Result<&'a MetaRanges> {
        self.metadata.metadata_ranges(variable).ok_or_else(|| {
            Error::InvalidQuery(format!("no metadata for meta-variable '{}'", variable))
        })
    }

    fn resolve_meta_evidence(
        &self,
        query: &Query,
        interpolator: &dyn Interpolator,
    ) -> Result<HashMap<&'a str, HashMap<InodeId, f64>>> {
        let mut by_variable: IndexMap<&str, Vec<&MetaComparison>> = IndexMap::new();
        for comparison in query.meta_evidence() {
            by_variable
                .entry(comparison.variable.as_str())
                .or_default()
                .push(comparison);
        }

        let mut resolved = HashMap::new();
        for (variable, comparisons) in by_variable {
            let ranges = self.ranges_for(variable)?;
            let mut admissible = HashMap::new();
            let mut key: Option<&'a str> = None;

            for (index, bucket) in ranges.buckets().iter().enumerate() {
                let Some(inode) = self.store.find_inode(variable, &bucket.state) else {
                    trace!("bucket {}={} is not in the knowledge base", variable, bucket.state);
                    continue;
                };
                let fraction = interpolator.admissible_fraction(ranges, index, &comparisons)?;
                if fraction > 0.0 {
                    key = Some(self.store.inode(inode)?.variable.as_str());
                    admissible.insert(inode, fraction);
                }
            }

            match key {
                Some(key) => {
                    resolved.insert(key, admissible);
                }
                None => {
                    return Err(Error::EvidenceUnsatisfiable {
                        variable: variable.to_string(),
                        states: comparisons.iter().map(|c| c.to_string()).collect(),
                    });
                }
            }
        }
        Ok(resolved)
    }

    fn resolve_meta_targets<'q>(
        &self,
        query: &'q Query,
        interpolator: &dyn Interpolator,
    ) -> Result<Vec<MetaTargetPlan<'q>>>
    where
        'a: 'q,
    {
        let mut plans = Vec::with_capacity(query.meta_targets().len());
        for comparison in query.meta_targets() {
            let ranges = self.ranges_for(&comparison.variable)?;
            let mut buckets = Vec::new();
            for (index, bucket) in ranges.buckets().iter().enumerate() {
                if let Some(inode) = self.store.find_inode(&comparison.variable, &bucket.state) {
                    let fraction = interpolator.admissible_fraction(ranges, index, &[comparison])?;
                    buckets.push((index, inode, fraction));
                }
            }
            plans.push(MetaTargetPlan {
                comparison,
                ranges,
                buckets,
            });
        }
        Ok(plans)
    }

    fn select_targets(
        &self,
        query: &Query,
        options: &AnalyzeOptions,
        evidence: &HashMap<&'a str, InodeId>,
        meta_evidence: &HashMap<&'a str, HashMap<InodeId, f64>>,
    ) -> Result<Vec<String>> {
        let mut targets: IndexSet<String> = IndexSet::new();
        for variable in query.targets() {
            if !self.store.has_variable(variable) {
                return Err(Error::InvalidQuery(format!(
                    "target variable '{}' is not in the knowledge base",
                    variable
                )));
            }
            targets.insert(variable.clone());
        }

        if options.target_strategy == TargetStrategy::Enumerate {
            let meta_target_variables: HashSet<&str> = query
                .meta_targets()
                .iter()
                .map(|c| c.variable.as_str())
                .collect();

            let mut seeds: Vec<InodeId> = evidence.values().copied().collect();
            for admissible in meta_evidence.values() {
                seeds.extend(admissible.keys().copied());
            }
            seeds.sort_unstable();

            let reached = self.reachable_variables(seeds)?;
            for variable in self.store.variables() {
                if reached.contains(variable)
                    && !evidence.contains_key(variable)
                    && !meta_evidence.contains_key(variable)
                    && !meta_target_variables.contains(variable)
                {
                    targets.insert(variable.to_string());
                }
            }
        }

        Ok(targets.into_iter().collect())
    }

    /// Variables of every I-node reachable forward from `seeds` through
    /// active S-nodes, the seeds included.
    fn reachable_variables(&self, seeds: Vec<InodeId>) -> Result<HashSet<&'a str>> {
        let mut visited: HashSet<InodeId> = seeds.iter().copied().collect();
        let mut queue: VecDeque<InodeId> = seeds.into_iter().collect();
        while let Some(current) = queue.pop_front() {
            for &sid in self.store.support_nodes_requiring_fact(current) {
                let snode = self.store.snode(sid)?;
                if snode.is_active() && visited.insert(snode.head) {
                    queue.push_back(snode.head);
                }
            }
        }

        let mut variables = HashSet::new();
        for id in visited {
            variables.insert(self.store.inode(id)?.variable.as_str());
        }
        Ok(variables)
    }

    fn assemble(
        &self,
        query: &Query,
        options: &AnalyzeOptions,
        targets: &[String],
        meta_plans: &[MetaTargetPlan<'_>],
        searches: Vec<TargetSearch>,
    ) -> Result<InferenceResult> {
        let mut result = InferenceResult::empty(query.name());
        let validator = MutexValidator::new();
        let mut paths_by_target: HashMap<InodeId, Vec<InferencePath>> = HashMap::new();

        for search in searches {
            result.stats.merge(&search.stats);
            result.partial.extend(search.partial);

            let accepted = paths_by_target.entry(search.target).or_default();
            for path in search.paths {
                if options.check_mutex && !screen_path(self.store, &validator, &path, &mut result)? {
                    continue;
                }
                accepted.push(path);
            }
        }

        let mass_of = |inode: InodeId| -> f64 {
            paths_by_target
                .get(&inode)
                .map(|paths| paths.iter().map(|p| p.weight).sum())
                .unwrap_or(0.0)
        };

        for variable in targets {
            let mut states = Vec::new();
            for &inode in self.store.nodes_for_variable(variable) {
                states.push(StateProbability {
                    state: self.store.inode(inode)?.state.clone(),
                    inode,
                    mass: mass_of(inode),
                    probability: 0.0,
                });
            }
            let total: f64 = states.iter().map(|s| s.mass).sum();
            if total > 0.0 {
                for state in &mut states {
                    state.probability = state.mass / total;
                }
            } else {
                result.diagnostics.push(Diagnostic::NoPathFound {
                    variable: variable.clone(),
                });
            }
            result.probabilities.insert(
                variable.clone(),
                TargetDistribution {
                    variable: variable.clone(),
                    states,
                },
            );
        }

        for plan in meta_plans {
            let mut buckets = Vec::with_capacity(plan.buckets.len());
            for &(index, inode, fraction) in &plan.buckets {
                let bucket = &plan.ranges.buckets()[index];
                buckets.push(BucketMass {
                    state: bucket.state.clone(),
                    inode,
                    lower: bucket.lower,
                    upper: bucket.upper,
                    mass: mass_of(inode),
                    fraction,
                });
            }
            let total: f64 = buckets.iter().map(|b| b.mass).sum();
            let admitted: f64 = buckets.iter().map(|b| b.mass * b.fraction).sum();
            let probability = if total > 0.0 { admitted / total } else { 0.0 };
            if total == 0.0 {
                let diagnostic = Diagnostic::NoPathFound {
                    variable: plan.comparison.variable.clone(),
                };
                if !result.diagnostics.contains(&diagnostic) {
                    result.diagnostics.push(diagnostic);
                }
            }
            result.meta_targets.push(MetaTargetOutcome {
                comparison: plan.comparison.clone(),
                probability,
                buckets,
            });
        }

        let mut contributions = Vec::new();
        for paths in paths_by_target.values() {
            for path in paths {
                contributions.push(self.contribution(path)?);
            }
        }
        contributions.sort_by(|a, b| {
            b.path
                .weight
                .total_cmp(&a.path.weight)
                .then_with(|| a.path.target.cmp(&b.path.target))
                .then_with(|| a.path.snodes().cmp(&b.path.snodes()))
        });
        result.contributions = contributions;

        let mut group_variables: IndexSet<&str> = targets.iter().map(String::as_str).collect();
        group_variables.extend(meta_plans.iter().map(|p| p.comparison.variable.as_str()));
        let groups: Vec<JointGroup<'_>> = group_variables
            .into_iter()
            .map(|variable| JointGroup {
                variable,
                paths: result
                    .contributions
                    .iter()
                    .filter(|c| c.variable == variable)
                    .map(|c| &c.path)
                    .collect(),
            })
            .collect();

        let joint = complete_inferences(self.store, &groups, options.max_joint_combinations)?;
        result.stats.joint_combinations = joint.combinations;
        result.completed = joint.inferences;
        if joint.exhausted {
            result.partial.push(PartialReason::JointBudget {
                limit: options.max_joint_combinations,
            });
        }

        Ok(result)
    }

    fn contribution(&self, path: &InferencePath) -> Result<Contribution> {
        let target = self.store.inode(path.target)?;
        let mut sources: Vec<String> = Vec::new();
        for step in &path.steps {
            if let Some(source) = &self.store.snode(step.snode)?.source {
                if !sources.contains(source) {
                    sources.push(source.clone());
                }
            }
        }
        sources.sort();
        Ok(Contribution {
            variable: target.variable.clone(),
            state: target.state.clone(),
            path: path.clone(),
            sources,
        })
    }
}

/// Re-checks a completed path for mutually exclusive I-nodes.
///
/// This is a safety re-check: the search already abandons any branch that
/// asserts two states of one variable, so a rejection here means the path
/// was not produced by a sound search. Rejected paths are counted and
/// recorded as [`Diagnostic::MutexRejected`]. Returns whether the path is
/// kept.
fn screen_path(
    store: &GraphStore,
    validator: &MutexValidator,
    path: &InferencePath,
    result: &mut InferenceResult,
) -> Result<bool> {
    let report = validator.check_path(store, path)?;
    if report.consistent {
        return Ok(true);
    }
    warn!(
        "Discarding path for {}: {} mutex violation(s)",
        store.inode(path.target)?,
        report.violations.len()
    );
    result.stats.rejected_by_mutex += 1;
    result.diagnostics.push(Diagnostic::MutexRejected {
        target: path.target,
        violations: report.violations,
    });
    Ok(false)
}

/// Runs one search per target I-node, in parallel, keeping job order.
fn run_searches(
    context: &SearchContext<'_>,
    jobs: &[InodeId],
    fan_out: usize,
) -> Result<Vec<TargetSearch>> {
    let run = || {
        jobs.par_iter()
            .map(|&target| context.search_target(target))
            .collect::<Result<Vec<_>>>()
    };

    if fan_out == 0 {
        run()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(fan_out)
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;
        pool.install(run)
    }
}

/// Answers `query` against `store` and `metadata`.
///
/// Shorthand for [`InferenceEngine::new`] followed by
/// [`InferenceEngine::analyze`].
pub fn analyze(
    store: &GraphStore,
    metadata: &dyn MetadataSource,
    query: &Query,
    options: &AnalyzeOptions,
) -> Result<InferenceResult> {
    InferenceEngine::new(store, metadata).analyze(query, options)
}
