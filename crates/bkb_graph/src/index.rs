//! Lookup indexes over instantiation and support nodes
//!
//! Three views are maintained as nodes are added:
//! - by variable: every instantiation of a random variable, in insertion order
//! - by head (reverse): which S-nodes conclude a fact
//! - by tail (forward): which S-nodes require a fact

use crate::{Inode, InodeId, Snode, SnodeId};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Index structure owned by a [`GraphStore`](crate::GraphStore).
#[derive(Debug, Clone, Default)]
pub struct SupportIndex {
    /// (variable, state) -> id
    by_fact: HashMap<Inode, InodeId>,
    /// variable -> instantiations, insertion ordered for deterministic iteration
    by_variable: IndexMap<String, Vec<InodeId>>,
    /// head I-node -> concluding S-nodes
    by_head: Vec<Vec<SnodeId>>,
    /// tail I-node -> requiring S-nodes
    by_tail: Vec<Vec<SnodeId>>,
}

impl SupportIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly allocated instantiation
    pub fn insert_inode(&mut self, inode: &Inode, id: InodeId) {
        self.by_fact.insert(inode.clone(), id);
        self.by_variable
            .entry(inode.variable.clone())
            .or_default()
            .push(id);
        self.by_head.push(Vec::new());
        self.by_tail.push(Vec::new());
    }

    /// Register a support node under its head and every tail
    pub fn insert_snode(&mut self, snode: &Snode, id: SnodeId) {
        self.by_head[snode.head.index()].push(id);
        for tail in &snode.tails {
            self.by_tail[tail.index()].push(id);
        }
    }

    /// Exact (variable, state) lookup
    pub fn find(&self, variable: &str, state: &str) -> Option<InodeId> {
        // Borrowed lookup would need a custom key type; facts are short strings.
        self.by_fact.get(&Inode::new(variable, state)).copied()
    }

    /// All instantiations of a variable
    pub fn for_variable(&self, variable: &str) -> &[InodeId] {
        self.by_variable
            .get(variable)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// S-nodes whose head is `id`
    pub fn concluding(&self, id: InodeId) -> &[SnodeId] {
        self.by_head
            .get(id.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// S-nodes whose tail set contains `id`
    pub fn requiring(&self, id: InodeId) -> &[SnodeId] {
        self.by_tail
            .get(id.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Variable names in insertion order
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.by_variable.keys().map(String::as_str)
    }

    /// Number of distinct variables
    pub fn variable_count(&self) -> usize {
        self.by_variable.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_insert_and_lookup() {
        let mut index = SupportIndex::new();
        let a_true = Inode::new("A", "True");
        let a_false = Inode::new("A", "False");
        let b_high = Inode::new("B", "High");

        index.insert_inode(&a_true, InodeId(0));
        index.insert_inode(&a_false, InodeId(1));
        index.insert_inode(&b_high, InodeId(2));

        let snode = Snode {
            head: InodeId(2),
            tails: vec![InodeId(0)],
            weight: 0.8,
            source: None,
        };
        index.insert_snode(&snode, SnodeId(0));

        assert_eq!(index.find("A", "False"), Some(InodeId(1)));
        assert_eq!(index.find("A", "Maybe"), None);
        assert_eq!(index.for_variable("A"), &[InodeId(0), InodeId(1)]);
        assert_eq!(index.concluding(InodeId(2)), &[SnodeId(0)]);
        assert_eq!(index.requiring(InodeId(0)), &[SnodeId(0)]);
        assert!(index.requiring(InodeId(1)).is_empty());
    }

    #[test]
    fn test_variables_keep_insertion_order() {
        let mut index = SupportIndex::new();
        index.insert_inode(&Inode::new("Z", "1"), InodeId(0));
        index.insert_inode(&Inode::new("A", "1"), InodeId(1));
        index.insert_inode(&Inode::new("Z", "2"), InodeId(2));

        let vars: Vec<_> = index.variables().collect();
        assert_eq!(vars, vec!["Z", "A"]);
        assert_eq!(index.variable_count(), 2);
    }

    #[test]
    fn test_unknown_ids_are_empty() {
        let index = SupportIndex::new();
        assert!(index.concluding(InodeId(42)).is_empty());
        assert!(index.for_variable("nothing").is_empty());
    }
}
