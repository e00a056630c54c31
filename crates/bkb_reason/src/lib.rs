//! BKB Reason - Inference over fused Bayesian Knowledge Bases
//!
//! Given a [`GraphStore`](bkb_graph::GraphStore) and a [`Query`], the engine
//! enumerates every consistent inference path deriving each target fact,
//! weighs it by its support rules, and normalizes the weights per target
//! variable.
//!
//! # Features
//!
//! - **Backtracking search**: explicit work stack, no recursion, mutually
//!   exclusive assignments abandoned as soon as they appear
//! - **Meta-variables**: relational evidence and targets (`>=`, `<`, ...) on
//!   continuous variables observed as buckets, with pluggable interpolation
//! - **Completed inferences**: consistent joint assignments over all targets
//! - **Mutex validation**: whole knowledge bases, single paths, or results
//! - **Budgets**: depth, expansions, combinations and wall clock; exceeding
//!   one yields a partial result, never a hang
//! - **Parallel**: target facts are searched on a rayon pool
//!
//! # Quick Start
//!
//! ```
//! use bkb_graph::GraphStore;
//! use bkb_reason::{AnalyzeOptions, MetaRanges, MetadataTable, Query, Reasoner};
//!
//! # fn main() -> Result<(), bkb_reason::Error> {
//! let mut store = GraphStore::new();
//! let young = store.add_inode("Age", "[20, 40)")?;
//! let old = store.add_inode("Age", "[40, 60]")?;
//! let high = store.add_inode("Risk", "High")?;
//! let low = store.add_inode("Risk", "Low")?;
//! store.add_snode(young, [], 0.5)?;
//! store.add_snode(old, [], 0.5)?;
//! store.add_snode(high, [old], 0.9)?;
//! store.add_snode(low, [young], 0.7)?;
//!
//! let metadata = MetadataTable::new()
//!     .with_ranges(MetaRanges::from_boundaries("Age", &[20.0, 40.0, 60.0])?);
//! let reasoner = Reasoner::new(&store)?.with_metadata(metadata);
//!
//! let query = Query::builder()
//!     .meta_evidence("Age", ">=", 50.0)
//!     .target("Risk")
//!     .build()?;
//! let analyzed = reasoner.analyze_query(&query, &AnalyzeOptions::default())?;
//!
//! // Only the upper bucket is admissible, so only Risk=High is derivable.
//! assert_eq!(analyzed.result().probability("Risk", "High"), Some(1.0));
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! The crate logs through the `log` facade: `debug!` per query, `trace!`
//! per search branch, `warn!` for partial results and rejected paths.

pub mod config;
pub mod engine;
pub mod error;
pub mod interpolation;
mod joint;
pub mod metadata;
pub mod mutex;
pub mod query;
pub mod reasoner;
pub mod report;
pub mod result;
mod search;

// Re-exports
pub use config::{AnalyzeOptions, TargetStrategy};
pub use engine::{analyze, InferenceEngine};
pub use error::{Error, Result};
pub use interpolation::{ExactInterpolation, InterpolationMode, Interpolator, StandardInterpolation};
pub use metadata::{MetaBucket, MetaRanges, MetadataSource, MetadataTable};
pub use mutex::{check_mutex, MutexReport, MutexValidator};
pub use query::{Fact, MetaComparison, Operator, Query, QueryBuilder};
pub use reasoner::{load_knowledge_base, AnalyzedQuery, Reasoner};
pub use report::Report;
pub use result::{
    BucketMass, CompletedInference, Contribution, Diagnostic, InferencePath, InferenceResult,
    MetaLeaf, MetaTargetOutcome, PartialReason, PathStep, ResultSummary, SearchStats,
    StateProbability, TargetDistribution,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable enabling mutex re-validation of every path
/// (`1`/`true` or `0`/`false`).
pub const ENV_CHECK_MUTEX: &str = "BKB_CHECK_MUTEX";

/// Environment variable selecting the interpolation mode (`standard` or `none`).
pub const ENV_INTERPOLATION: &str = "BKB_INTERPOLATION";

/// Environment variable selecting the target strategy (`explicit` or `enumerate`).
pub const ENV_TARGET_STRATEGY: &str = "BKB_TARGET_STRATEGY";

/// Environment variable overriding the depth budget.
pub const ENV_MAX_DEPTH: &str = "BKB_MAX_DEPTH";

/// Environment variable overriding the per-target expansion budget.
pub const ENV_MAX_EXPANSIONS: &str = "BKB_MAX_EXPANSIONS";

/// Environment variable setting the number of search threads.
///
/// ```bash
/// # Search on four threads
/// export BKB_FAN_OUT=4
/// ```
pub const ENV_FAN_OUT: &str = "BKB_FAN_OUT";

/// Environment variable setting a wall-clock budget per query, in milliseconds.
pub const ENV_TIME_BUDGET_MS: &str = "BKB_TIME_BUDGET_MS";
