//! BKB Graph - Bayesian Knowledge Base store
//!
//! An in-memory store for fused Bayesian Knowledge Bases. A knowledge base is
//! a directed graph of two node kinds:
//!
//! ```text
//! ┌──────────────┐      ┌───────────────────┐      ┌──────────────┐
//! │  I-node      │─tail─▶  S-node (w = 0.8) │─head─▶  I-node      │
//! │  A = True    │      └───────────────────┘      │  B = High    │
//! └──────────────┘                                 └──────────────┘
//! ```
//!
//! - **I-nodes** (instantiation nodes) are facts "variable = state".
//! - **S-nodes** (support nodes) are weighted rules: all tail facts together
//!   support the head fact with an unnormalized probability mass.
//!
//! The store keeps three indexes (by variable, by head, by tail) and rejects
//! any rule that would introduce a support cycle.
//!
//! # Quick Start
//!
//! ```
//! use bkb_graph::GraphStore;
//!
//! # fn main() -> Result<(), bkb_graph::Error> {
//! let mut store = GraphStore::new();
//! let a_true = store.add_inode("A", "True")?;
//! let a_false = store.add_inode("A", "False")?;
//! let b_high = store.add_inode("B", "High")?;
//!
//! store.add_snode(b_high, [a_true], 0.8)?;
//! store.add_snode(b_high, [a_false], 0.2)?;
//!
//! assert_eq!(store.support_nodes_concluding_fact(b_high).len(), 2);
//! store.verify()?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod index;
pub mod loader;
pub mod node;
pub mod store;

// Re-exports
pub use error::{Error, Result};
pub use index::SupportIndex;
pub use loader::FusionLoader;
pub use node::{Inode, InodeId, Snode, SnodeId};
pub use store::{GraphStats, GraphStore};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
