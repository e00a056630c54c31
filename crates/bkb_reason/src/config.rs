//! Options for a single reasoning call.
//!
//! [`AnalyzeOptions`] collects every knob of the inference engine: path
//! re-validation, interpolation policy, target discovery, and the budgets
//! that keep pathological knowledge bases from hanging a query.
//!
//! # Presets
//!
//! - [`AnalyzeOptions::default()`] - balanced defaults
//! - [`AnalyzeOptions::exhaustive()`] - mutex re-validation, enumerate targets, generous budgets
//! - [`AnalyzeOptions::fast()`] - small budgets and a wall-clock limit
//! - [`AnalyzeOptions::test_mode()`] - single-threaded and deterministic for tests
//!
//! Any preset can then be adjusted through the fluent setters, and
//! [`AnalyzeOptions::from_env()`] applies overrides from `BKB_*` variables.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::interpolation::InterpolationMode;
use crate::{
    ENV_CHECK_MUTEX, ENV_FAN_OUT, ENV_INTERPOLATION, ENV_MAX_DEPTH, ENV_MAX_EXPANSIONS,
    ENV_TARGET_STRATEGY, ENV_TIME_BUDGET_MS,
};

/// Which target I-nodes the engine computes distributions for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStrategy {
    /// Only the variables and meta-targets named in the query.
    #[default]
    Explicit,
    /// The named targets plus every variable reachable forward from the
    /// evidence, excluding the evidence variables themselves.
    Enumerate,
}

impl FromStr for TargetStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "explicit" => Ok(TargetStrategy::Explicit),
            "enumerate" => Ok(TargetStrategy::Enumerate),
            other => Err(Error::InvalidQuery(format!(
                "unknown target strategy '{}'",
                other
            ))),
        }
    }
}

/// Engine options for one `analyze` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzeOptions {
    /// Re-validate every completed path for mutual exclusion before counting it.
    /// The search never completes a conflicting path, so this is a safety re-check.
    pub check_mutex: bool,
    /// How continuous thresholds are resolved against observed buckets.
    pub interpolation: InterpolationMode,
    /// Which targets are searched.
    pub target_strategy: TargetStrategy,
    /// Maximum number of rule hops below a target I-node.
    pub max_depth: usize,
    /// Maximum work-stack pops per target I-node.
    pub max_expansions: usize,
    /// Maximum number of path combinations tried for completed inferences.
    pub max_joint_combinations: usize,
    /// Optional wall-clock limit for the whole query.
    pub time_budget: Option<Duration>,
    /// Worker threads for the parallel search (0 = rayon's global pool).
    pub fan_out: usize,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            check_mutex: false,
            interpolation: InterpolationMode::Standard,
            target_strategy: TargetStrategy::Explicit,
            max_depth: 64,
            max_expansions: 1_000_000,
            max_joint_combinations: 100_000,
            time_budget: None,
            fan_out: 0,
        }
    }
}

impl AnalyzeOptions {
    /// Searches everything a query can reach and re-validates every path.
    pub fn exhaustive() -> Self {
        Self {
            check_mutex: true,
            target_strategy: TargetStrategy::Enumerate,
            max_depth: 256,
            max_expansions: 50_000_000,
            max_joint_combinations: 5_000_000,
            ..Self::default()
        }
    }

    /// Small budgets for interactive use; results may come back partial.
    pub fn fast() -> Self {
        Self {
            max_depth: 16,
            max_expansions: 50_000,
            max_joint_combinations: 10_000,
            time_budget: Some(Duration::from_millis(500)),
            ..Self::default()
        }
    }

    /// Deterministic settings for tests: mutex checks on, one worker thread,
    /// no wall-clock budget.
    pub fn test_mode() -> Self {
        Self {
            check_mutex: true,
            fan_out: 1,
            max_expansions: 100_000,
            ..Self::default()
        }
    }

    /// Applies overrides from `BKB_*` environment variables to the default
    /// options.
    ///
    /// - `BKB_CHECK_MUTEX` - `1`/`true` or `0`/`false`
    /// - `BKB_INTERPOLATION` - `standard` or `none`
    /// - `BKB_TARGET_STRATEGY` - `explicit` or `enumerate`
    /// - `BKB_MAX_DEPTH`, `BKB_MAX_EXPANSIONS`, `BKB_FAN_OUT` - integers
    /// - `BKB_TIME_BUDGET_MS` - milliseconds
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies `BKB_*` environment overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var(ENV_CHECK_MUTEX) {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.check_mutex = true,
                "0" | "false" | "no" => self.check_mutex = false,
                _ => {}
            }
        }

        if let Ok(value) = std::env::var(ENV_INTERPOLATION) {
            if let Ok(mode) = value.parse::<InterpolationMode>() {
                self.interpolation = mode;
            }
        }

        if let Ok(value) = std::env::var(ENV_TARGET_STRATEGY) {
            if let Ok(strategy) = value.parse::<TargetStrategy>() {
                self.target_strategy = strategy;
            }
        }

        if let Ok(value) = std::env::var(ENV_MAX_DEPTH) {
            if let Ok(depth) = value.trim().parse::<usize>() {
                self.max_depth = depth;
            }
        }

        if let Ok(value) = std::env::var(ENV_MAX_EXPANSIONS) {
            if let Ok(expansions) = value.trim().parse::<usize>() {
                self.max_expansions = expansions;
            }
        }

        if let Ok(value) = std::env::var(ENV_FAN_OUT) {
            if let Ok(threads) = value.trim().parse::<usize>() {
                self.fan_out = threads;
            }
        }

        if let Ok(value) = std::env::var(ENV_TIME_BUDGET_MS) {
            if let Ok(ms) = value.trim().parse::<u64>() {
                self.time_budget = Some(Duration::from_millis(ms));
            }
        }

        self
    }

    /// Sets [`check_mutex`](Self::check_mutex).
    pub fn with_check_mutex(mut self, enabled: bool) -> Self {
        self.check_mutex = enabled;
        self
    }

    /// Sets the interpolation mode.
    pub fn with_interpolation(mut self, mode: InterpolationMode) -> Self {
        self.interpolation = mode;
        self
    }

    /// Sets the target strategy.
    pub fn with_target_strategy(mut self, strategy: TargetStrategy) -> Self {
        self.target_strategy = strategy;
        self
    }

    /// Sets the depth budget.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets the per-target expansion budget.
    pub fn with_max_expansions(mut self, expansions: usize) -> Self {
        self.max_expansions = expansions;
        self
    }

    /// Sets the completed-inference combination budget.
    pub fn with_max_joint_combinations(mut self, combinations: usize) -> Self {
        self.max_joint_combinations = combinations;
        self
    }

    /// Sets a wall-clock budget for the whole query.
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    /// Sets the number of worker threads.
    pub fn with_fan_out(mut self, threads: usize) -> Self {
        self.fan_out = threads;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = AnalyzeOptions::default();
        assert!(!options.check_mutex);
        assert_eq!(options.interpolation, InterpolationMode::Standard);
        assert_eq!(options.target_strategy, TargetStrategy::Explicit);
        assert!(options.time_budget.is_none());
    }

    #[test]
    fn test_presets() {
        let exhaustive = AnalyzeOptions::exhaustive();
        assert!(exhaustive.check_mutex);
        assert_eq!(exhaustive.target_strategy, TargetStrategy::Enumerate);

        let fast = AnalyzeOptions::fast();
        assert!(fast.max_expansions < AnalyzeOptions::default().max_expansions);
        assert!(fast.time_budget.is_some());

        let test = AnalyzeOptions::test_mode();
        assert_eq!(test.fan_out, 1);
    }

    #[test]
    fn test_fluent_setters() {
        let options = AnalyzeOptions::default()
            .with_interpolation(InterpolationMode::None)
            .with_target_strategy(TargetStrategy::Enumerate)
            .with_max_depth(3)
            .with_fan_out(2)
            .with_time_budget(Duration::from_millis(10));
        assert_eq!(options.interpolation, InterpolationMode::None);
        assert_eq!(options.max_depth, 3);
        assert_eq!(options.fan_out, 2);
        assert_eq!(options.time_budget, Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "Enumerate".parse::<TargetStrategy>().unwrap(),
            TargetStrategy::Enumerate
        );
        assert!("all".parse::<TargetStrategy>().is_err());
    }

    #[test]
    fn test_deserialize_partial_options() {
        let options: AnalyzeOptions =
            serde_json::from_str(r#"{"interpolation":"none","max_depth":5}"#).unwrap();
        assert_eq!(options.interpolation, InterpolationMode::None);
        assert_eq!(options.max_depth, 5);
        assert_eq!(options.max_expansions, AnalyzeOptions::default().max_expansions);
    }

    #[test]
    fn test_from_env_without_overrides() {
        // Nothing in the test environment sets BKB_* variables.
        let options = AnalyzeOptions::from_env();
        assert_eq!(options.max_depth, AnalyzeOptions::default().max_depth);
    }
}
