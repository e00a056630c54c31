//! Observed ranges of continuous meta-variables.
//!
//! In a fused knowledge base a meta-variable such as `Age_of_Diagnosis` is
//! represented by one I-node per observed bucket. The metadata source tells
//! the engine which numeric interval each bucket state covers.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One observed bucket `[lower, upper)` of a meta-variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaBucket {
    /// The I-node state naming this bucket.
    pub state: String,
    /// Inclusive lower boundary.
    pub lower: f64,
    /// Upper boundary (exclusive, except for the last bucket).
    pub upper: f64,
}

impl MetaBucket {
    /// Creates a bucket.
    pub fn new(state: impl Into<String>, lower: f64, upper: f64) -> Self {
        Self {
            state: state.into(),
            lower,
            upper,
        }
    }

    /// Width of the bucket.
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// The ordered buckets of one meta-variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaRanges {
    variable: String,
    buckets: Vec<MetaBucket>,
}

impl MetaRanges {
    /// Creates ranges from explicit buckets.
    ///
    /// # Errors
    ///
    /// Returns `Error::Metadata` if there are no buckets, a boundary is not
    /// finite, a bucket is empty or inverted, or buckets overlap or are out
    /// of order.
    pub fn new(variable: impl Into<String>, buckets: Vec<MetaBucket>) -> Result<Self> {
        let variable = variable.into();
        if buckets.is_empty() {
            return Err(Error::Metadata(format!("{} has no buckets", variable)));
        }
        for bucket in &buckets {
            if !bucket.lower.is_finite() || !bucket.upper.is_finite() {
                return Err(Error::Metadata(format!(
                    "{} bucket '{}' has a non-finite boundary",
                    variable, bucket.state
                )));
            }
            if bucket.upper <= bucket.lower {
                return Err(Error::Metadata(format!(
                    "{} bucket '{}' is empty or inverted",
                    variable, bucket.state
                )));
            }
        }
        for pair in buckets.windows(2) {
            if pair[1].lower < pair[0].upper {
                return Err(Error::Metadata(format!(
                    "{} buckets '{}' and '{}' overlap or are out of order",
                    variable, pair[0].state, pair[1].state
                )));
            }
        }
        Ok(Self { variable, buckets })
    }

    /// Creates contiguous buckets from an increasing boundary sequence.
    ///
    /// Buckets are labelled `"[lo, hi)"`, the last one `"[lo, hi]"`.
    ///
    /// ```
    /// use bkb_reason::MetaRanges;
    ///
    /// let ranges = MetaRanges::from_boundaries("Age", &[20.0, 40.0, 60.0]).unwrap();
    /// let states: Vec<_> = ranges.buckets().iter().map(|b| b.state.as_str()).collect();
    /// assert_eq!(states, vec!["[20, 40)", "[40, 60]"]);
    /// ```
    pub fn from_boundaries(variable: impl Into<String>, boundaries: &[f64]) -> Result<Self> {
        let variable = variable.into();
        if boundaries.len() < 2 {
            return Err(Error::Metadata(format!(
                "{} needs at least two boundaries",
                variable
            )));
        }
        let last = boundaries.len() - 2;
        let buckets = boundaries
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let close = if i == last { ']' } else { ')' };
                MetaBucket::new(format!("[{}, {}{}", w[0], w[1], close), w[0], w[1])
            })
            .collect();
        Self::new(variable, buckets)
    }

    /// The meta-variable name.
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Buckets in increasing order.
    pub fn buckets(&self) -> &[MetaBucket] {
        &self.buckets
    }

    /// The ordered, de-duplicated bucket boundaries.
    pub fn boundaries(&self) -> Vec<f64> {
        let mut out: Vec<f64> = Vec::with_capacity(self.buckets.len() + 1);
        for bucket in &self.buckets {
            for b in [bucket.lower, bucket.upper] {
                if out.last() != Some(&b) {
                    out.push(b);
                }
            }
        }
        out
    }

    /// Returns `true` if `value` is exactly an observed boundary.
    pub fn is_boundary(&self, value: f64) -> bool {
        self.buckets
            .iter()
            .any(|b| b.lower == value || b.upper == value)
    }

    /// Index of the bucket containing `value`.
    pub fn bucket_containing(&self, value: f64) -> Option<usize> {
        let last = self.buckets.len().checked_sub(1)?;
        self.buckets
            .iter()
            .enumerate()
            .find(|(i, b)| value >= b.lower && (value < b.upper || (*i == last && value == b.upper)))
            .map(|(i, _)| i)
    }

    /// Index of the bucket named `state`.
    pub fn bucket_for_state(&self, state: &str) -> Option<usize> {
        self.buckets.iter().position(|b| b.state == state)
    }
}

/// Supplies observed bucket ranges for meta-variables.
pub trait MetadataSource: Send + Sync {
    /// Returns the ranges of `variable`, or `None` if it is not a known
    /// meta-variable.
    fn metadata_ranges(&self, variable: &str) -> Option<&MetaRanges>;
}

/// In-memory [`MetadataSource`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataTable {
    ranges: IndexMap<String, MetaRanges>,
}

impl MetadataTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the ranges of one meta-variable.
    pub fn insert(&mut self, ranges: MetaRanges) {
        self.ranges.insert(ranges.variable.clone(), ranges);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_ranges(mut self, ranges: MetaRanges) -> Self {
        self.insert(ranges);
        self
    }

    /// Known meta-variables, in insertion order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.ranges.keys().map(String::as_str)
    }

    /// Number of meta-variables.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Returns `true` if no meta-variable is known.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl MetadataSource for MetadataTable {
    fn metadata_ranges(&self, variable: &str) -> Option<&MetaRanges> {
        self.ranges.get(variable)
    }
}
