//! Instantiation nodes (facts) and support nodes (weighted rules).
//!
//! An [`Inode`] is the atomic fact "variable = state". A [`Snode`] is a
//! weighted rule whose tail I-nodes, taken together, support one head I-node.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense identifier of an instantiation node inside one [`GraphStore`](crate::GraphStore).
///
/// Ids are only meaningful for the store that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InodeId(pub u32);

impl InodeId {
    /// Returns the id as a vector index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0)
    }
}

/// Dense identifier of a support node inside one [`GraphStore`](crate::GraphStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnodeId(pub u32);

impl SnodeId {
    /// Returns the id as a vector index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SnodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// The fact "random variable `variable` takes state `state`".
///
/// # Examples
///
/// ```
/// use bkb_graph::Inode;
///
/// let a = Inode::new("mut_TMEM245", "True");
/// let b = Inode::new("mut_TMEM245", "False");
/// assert!(a.is_mutex_with(&b));
/// assert!(!a.is_mutex_with(&a));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Inode {
    /// Name of the random variable.
    pub variable: String,
    /// The state the variable takes.
    pub state: String,
}

impl Inode {
    /// Creates a new instantiation.
    pub fn new(variable: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            state: state.into(),
        }
    }

    /// Two instantiations are mutually exclusive when they give the same
    /// variable different states.
    pub fn is_mutex_with(&self, other: &Inode) -> bool {
        self.variable == other.variable && self.state != other.state
    }
}

impl fmt::Display for Inode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.variable, self.state)
    }
}

/// A weighted support rule: all `tails` together support `head`.
///
/// An empty tail set is an unconditional (prior) fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snode {
    /// The concluded instantiation.
    pub head: InodeId,
    /// The required instantiations, sorted and de-duplicated.
    pub tails: Vec<InodeId>,
    /// Unnormalized probability mass. Zero means "absent" to the engine.
    pub weight: f64,
    /// Name of the source knowledge base this rule was fused from, if known.
    pub source: Option<String>,
}

impl Snode {
    /// Returns `true` if this rule has no preconditions.
    pub fn is_prior(&self) -> bool {
        self.tails.is_empty()
    }

    /// Returns `true` if the engine should consider this rule at all.
    pub fn is_active(&self) -> bool {
        self.weight > 0.0
    }
}
