//! Resolving continuous thresholds against discretely observed buckets.
//!
//! Every interpolator answers one question: what fraction of a bucket's
//! probability mass satisfies a set of comparisons on its meta-variable?
//!
//! - [`StandardInterpolation`] assumes mass is spread uniformly inside a
//!   bucket, so a threshold falling between two observed boundaries admits
//!   the linearly interpolated share of that bucket.
//! - [`ExactInterpolation`] (mode `none`) only accepts thresholds that are
//!   observed boundaries; every bucket is then wholly in or out.
//! - Any other policy can be plugged in through [`InterpolationMode::Custom`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::metadata::{MetaBucket, MetaRanges};
use crate::query::{MetaComparison, Operator};

/// A policy for admitting bucket mass under relational comparisons.
pub trait Interpolator: Send + Sync + fmt::Debug {
    /// Fraction in `[0, 1]` of bucket `bucket` of `ranges` admitted by all
    /// `comparisons` together.
    fn admissible_fraction(
        &self,
        ranges: &MetaRanges,
        bucket: usize,
        comparisons: &[&MetaComparison],
    ) -> Result<f64>;

    /// Short name used in logs and reports.
    fn name(&self) -> &str {
        "custom"
    }
}

/// Linear interpolation inside buckets.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardInterpolation;

/// Exact boundary matching; fails on thresholds between boundaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactInterpolation;

/// The admissible region of the real line described by a set of comparisons.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Region {
    Interval { lo: f64, hi: f64 },
    Point(f64),
    Empty,
}

impl Region {
    fn from_comparisons(comparisons: &[&MetaComparison]) -> Region {
        let mut lo = f64::NEG_INFINITY;
        let mut hi = f64::INFINITY;
        let mut point: Option<f64> = None;

        for c in comparisons {
            match c.operator {
                Operator::Ge | Operator::Gt => lo = lo.max(c.threshold),
                Operator::Le | Operator::Lt => hi = hi.min(c.threshold),
                Operator::Eq => match point {
                    Some(p) if p != c.threshold => return Region::Empty,
                    _ => point = Some(c.threshold),
                },
            }
        }

        match point {
            Some(p) if comparisons.iter().all(|c| c.admits(p)) => Region::Point(p),
            Some(_) => Region::Empty,
            None if lo < hi => Region::Interval { lo, hi },
            None if lo == hi && comparisons.iter().all(|c| c.admits(lo)) => Region::Point(lo),
            None => Region::Empty,
        }
    }
}

/// Length of `[lo, hi]` inside bucket `b`.
fn overlap(lo: f64, hi: f64, b: &MetaBucket) -> f64 {
    (hi.min(b.upper) - lo.max(b.lower)).max(0.0)
}

fn point_fraction(ranges: &MetaRanges, bucket: usize, point: f64) -> f64 {
    if ranges.bucket_containing(point) == Some(bucket) {
        1.0
    } else {
        0.0
    }
}

/// The closed bucket end admitted by every comparison, if any.
fn touching_point(ranges: &MetaRanges, comparisons: &[&MetaComparison]) -> Option<f64> {
    let buckets = ranges.buckets();
    buckets
        .iter()
        .map(|b| b.lower)
        .chain(buckets.last().map(|b| b.upper))
        .find(|&p| comparisons.iter().all(|c| c.admits(p)))
}

impl Interpolator for StandardInterpolation {
    fn admissible_fraction(
        &self,
        ranges: &MetaRanges,
        bucket: usize,
        comparisons: &[&MetaComparison],
    ) -> Result<f64> {
        let b = ranges.buckets().get(bucket).ok_or_else(|| {
            Error::Metadata(format!(
                "{} has no bucket #{}",
                ranges.variable(),
                bucket
            ))
        })?;

        let fraction = match Region::from_comparisons(comparisons) {
            Region::Empty => 0.0,
            Region::Point(p) => point_fraction(ranges, bucket, p),
            Region::Interval { lo, hi } => {
                let measure: f64 = ranges.buckets().iter().map(|x| overlap(lo, hi, x)).sum();
                if measure > 0.0 {
                    (overlap(lo, hi, b) / b.width()).clamp(0.0, 1.0)
                } else {
                    // Meeting the buckets in a single closed end counts as `=` there.
                    touching_point(ranges, comparisons)
                        .map_or(0.0, |p| point_fraction(ranges, bucket, p))
                }
            }
        };
        Ok(fraction)
    }

    fn name(&self) -> &str {
        "standard"
    }
}

impl Interpolator for ExactInterpolation {
    fn admissible_fraction(
        &self,
        ranges: &MetaRanges,
        bucket: usize,
        comparisons: &[&MetaComparison],
    ) -> Result<f64> {
        for c in comparisons {
            if !ranges.is_boundary(c.threshold) {
                return Err(Error::Interpolation {
                    variable: c.variable.clone(),
                    threshold: c.threshold,
                    reason: format!(
                        "not an observed bucket boundary (observed: {:?})",
                        ranges.boundaries()
                    ),
                });
            }
        }
        StandardInterpolation.admissible_fraction(ranges, bucket, comparisons)
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Which interpolation policy the engine applies.
#[derive(Debug, Clone, Default)]
pub enum InterpolationMode {
    /// Linear interpolation between the nearest observed boundaries.
    #[default]
    Standard,
    /// Exact boundary matches only.
    None,
    /// A caller-supplied policy.
    Custom(Arc<dyn Interpolator>),
}

impl InterpolationMode {
    /// Returns the interpolator implementing this mode.
    pub fn interpolator(&self) -> &dyn Interpolator {
        match self {
            InterpolationMode::Standard => &StandardInterpolation,
            InterpolationMode::None => &ExactInterpolation,
            InterpolationMode::Custom(custom) => custom.as_ref(),
        }
    }

    /// The mode's name: `standard`, `none`, or the custom interpolator's name.
    pub fn name(&self) -> &str {
        self.interpolator().name()
    }
}

impl PartialEq for InterpolationMode {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (InterpolationMode::Standard, InterpolationMode::Standard)
            | (InterpolationMode::None, InterpolationMode::None) => true,
            (InterpolationMode::Custom(a), InterpolationMode::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl FromStr for InterpolationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(InterpolationMode::Standard),
            "none" => Ok(InterpolationMode::None),
            other => Err(Error::InvalidQuery(format!(
                "unknown interpolation mode '{}'",
                other
            ))),
        }
    }
}

// Custom interpolators are code, so only the built-in modes round-trip.
impl Serialize for InterpolationMode {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(match self {
            InterpolationMode::Standard => "standard",
            InterpolationMode::None => "none",
            InterpolationMode::Custom(_) => "custom",
        })
    }
}

impl<'de> Deserialize<'de> for InterpolationMode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn age() -> MetaRanges {
        MetaRanges::from_boundaries("Age", &[20.0, 40.0, 60.0]).unwrap()
    }

    fn cmp(op: Operator, t: f64) -> MetaComparison {
        MetaComparison::new("Age", op, t)
    }

    #[test]
    fn test_standard_interpolates_inside_bucket() {
        let ranges = age();
        let ge50 = cmp(Operator::Ge, 50.0);
        let lower = StandardInterpolation
            .admissible_fraction(&ranges, 0, &[&ge50])
            .unwrap();
        let upper = StandardInterpolation
            .admissible_fraction(&ranges, 1, &[&ge50])
            .unwrap();
        assert_eq!(lower, 0.0);
        assert!((upper - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_standard_intersects_comparisons() {
        let ranges = age();
        let ge25 = cmp(Operator::Ge, 25.0);
        let lt50 = cmp(Operator::Lt, 50.0);
        let first = StandardInterpolation
            .admissible_fraction(&ranges, 0, &[&ge25, &lt50])
            .unwrap();
        let second = StandardInterpolation
            .admissible_fraction(&ranges, 1, &[&ge25, &lt50])
            .unwrap();
        assert!((first - 0.75).abs() < 1e-12);
        assert!((second - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_standard_equality_picks_containing_bucket() {
        let ranges = age();
        let eq45 = cmp(Operator::Eq, 45.0);
        assert_eq!(
            StandardInterpolation
                .admissible_fraction(&ranges, 1, &[&eq45])
                .unwrap(),
            1.0
        );
        assert_eq!(
            StandardInterpolation
                .admissible_fraction(&ranges, 0, &[&eq45])
                .unwrap(),
            0.0
        );
    }

    #[test]
    fn test_contradictory_comparisons_admit_nothing() {
        let ranges = age();
        let ge50 = cmp(Operator::Ge, 50.0);
        let lt30 = cmp(Operator::Lt, 30.0);
        for bucket in 0..2 {
            assert_eq!(
                StandardInterpolation
                    .admissible_fraction(&ranges, bucket, &[&ge50, &lt30])
                    .unwrap(),
                0.0
            );
        }
    }

    #[test]
    fn test_exact_rejects_non_boundary() {
        let ranges = age();
        let ge50 = cmp(Operator::Ge, 50.0);
        let err = ExactInterpolation
            .admissible_fraction(&ranges, 1, &[&ge50])
            .unwrap_err();
        assert!(matches!(err, Error::Interpolation { threshold, .. } if threshold == 50.0));
    }

    #[test]
    fn test_exact_on_boundary_is_all_or_nothing() {
        let ranges = age();
        let ge40 = cmp(Operator::Ge, 40.0);
        assert_eq!(
            ExactInterpolation
                .admissible_fraction(&ranges, 0, &[&ge40])
                .unwrap(),
            0.0
        );
        assert_eq!(
            ExactInterpolation
                .admissible_fraction(&ranges, 1, &[&ge40])
                .unwrap(),
            1.0
        );
    }

    fn fractions(interpolator: &dyn Interpolator, comparison: &MetaComparison) -> Vec<f64> {
        let ranges = age();
        (0..ranges.buckets().len())
            .map(|b| {
                interpolator
                    .admissible_fraction(&ranges, b, &[comparison])
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_outermost_boundaries_match_equality() {
        for interpolator in [&StandardInterpolation as &dyn Interpolator, &ExactInterpolation] {
            assert_eq!(fractions(interpolator, &cmp(Operator::Eq, 60.0)), vec![0.0, 1.0]);
            assert_eq!(fractions(interpolator, &cmp(Operator::Ge, 60.0)), vec![0.0, 1.0]);
            assert_eq!(fractions(interpolator, &cmp(Operator::Gt, 60.0)), vec![0.0, 0.0]);

            assert_eq!(fractions(interpolator, &cmp(Operator::Eq, 20.0)), vec![1.0, 0.0]);
            assert_eq!(fractions(interpolator, &cmp(Operator::Le, 20.0)), vec![1.0, 0.0]);
            assert_eq!(fractions(interpolator, &cmp(Operator::Lt, 20.0)), vec![0.0, 0.0]);
        }
    }

    #[test]
    fn test_inner_boundary_does_not_leak_into_next_bucket() {
        assert_eq!(
            fractions(&StandardInterpolation, &cmp(Operator::Le, 40.0)),
            vec![1.0, 0.0]
        );
        assert_eq!(
            fractions(&ExactInterpolation, &cmp(Operator::Ge, 40.0)),
            vec![0.0, 1.0]
        );
    }

    #[test]
    fn test_pinned_interval_is_a_point() {
        let ranges = age();
        let ge60 = cmp(Operator::Ge, 60.0);
        let le60 = cmp(Operator::Le, 60.0);
        assert_eq!(
            StandardInterpolation
                .admissible_fraction(&ranges, 1, &[&ge60, &le60])
                .unwrap(),
            1.0
        );
    }

    #[test]
    fn test_mode_parsing_and_serde() {
        assert_eq!(
            "standard".parse::<InterpolationMode>().unwrap(),
            InterpolationMode::Standard
        );
        assert_eq!(
            "NONE".parse::<InterpolationMode>().unwrap(),
            InterpolationMode::None
        );
        assert!("cubic".parse::<InterpolationMode>().is_err());

        let json = serde_json::to_string(&InterpolationMode::None).unwrap();
        assert_eq!(json, "\"none\"");
        let back: InterpolationMode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, InterpolationMode::None);
    }

    #[derive(Debug)]
    struct Midpoint;

    impl Interpolator for Midpoint {
        fn admissible_fraction(
            &self,
            ranges: &MetaRanges,
            bucket: usize,
            comparisons: &[&MetaComparison],
        ) -> Result<f64> {
            let b = &ranges.buckets()[bucket];
            let mid = (b.lower + b.upper) / 2.0;
            Ok(if comparisons.iter().all(|c| c.admits(mid)) {
                1.0
            } else {
                0.0
            })
        }

        fn name(&self) -> &str {
            "midpoint"
        }
    }

    #[test]
    fn test_custom_mode() {
        let mode = InterpolationMode::Custom(Arc::new(Midpoint));
        assert_eq!(mode.name(), "midpoint");
        let ranges = age();
        let ge45 = cmp(Operator::Ge, 45.0);
        let f = mode
            .interpolator()
            .admissible_fraction(&ranges, 1, &[&ge45])
            .unwrap();
        assert_eq!(f, 1.0);
    }
}
