//! The core graph storage engine.
//!
//! `GraphStore` owns the instantiation and support nodes of a fused knowledge
//! base together with their indexes. It is populated through `&mut self`
//! methods and then shared read-only (`&GraphStore` or `Arc<GraphStore>`)
//! with any number of concurrent reasoning sessions.

use crate::{index::SupportIndex, Error, Inode, InodeId, Result, Snode, SnodeId};
use log::{debug, trace};
use std::collections::{BTreeSet, HashSet, VecDeque};

/// The in-memory Bayesian Knowledge Base.
///
/// # Examples
///
/// ```
/// use bkb_graph::GraphStore;
///
/// # fn main() -> Result<(), bkb_graph::Error> {
/// let mut store = GraphStore::new();
/// let a = store.add_inode("A", "True")?;
/// let b = store.add_inode("B", "High")?;
/// let s = store.add_snode(b, [a], 0.8)?;
///
/// assert_eq!(store.support_nodes_concluding_fact(b), &[s]);
/// assert_eq!(store.support_nodes_requiring_fact(a), &[s]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    inodes: Vec<Inode>,
    snodes: Vec<Snode>,
    index: SupportIndex,
}

/// Summary counts for a [`GraphStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct GraphStats {
    /// Number of instantiation nodes.
    pub inodes: usize,
    /// Number of support nodes.
    pub snodes: usize,
    /// Number of distinct random variables.
    pub variables: usize,
    /// Number of support nodes with an empty tail set.
    pub priors: usize,
}

impl GraphStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the instantiation `variable = state`, returning its id.
    ///
    /// Adding an instantiation that already exists returns the existing id.
    ///
    /// # Errors
    ///
    /// Returns `Error::Structural` if either name is empty.
    pub fn add_inode(
        &mut self,
        variable: impl Into<String>,
        state: impl Into<String>,
    ) -> Result<InodeId> {
        let inode = Inode::new(variable, state);
        if inode.variable.is_empty() || inode.state.is_empty() {
            return Err(Error::Structural(format!(
                "instantiation '{}' needs a non-empty variable and state",
                inode
            )));
        }

        if let Some(id) = self.index.find(&inode.variable, &inode.state) {
            return Ok(id);
        }

        let id = InodeId(self.inodes.len() as u32);
        trace!("add I-node {} as {}", inode, id);
        self.index.insert_inode(&inode, id);
        self.inodes.push(inode);
        Ok(id)
    }

    /// Adds a support node `tails => head` with the given weight.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownInode` for a dangling reference and
    /// `Error::Structural` for a negative or non-finite weight, a tail set
    /// holding two states of one variable, a tail on the head's own variable,
    /// or a rule that would close a support cycle.
    pub fn add_snode(
        &mut self,
        head: InodeId,
        tails: impl IntoIterator<Item = InodeId>,
        weight: f64,
    ) -> Result<SnodeId> {
        self.insert_snode(head, tails, weight, None)
    }

    /// Same as [`add_snode`](Self::add_snode), tagging the rule with the
    /// source knowledge base it was fused from.
    pub fn add_snode_with_source(
        &mut self,
        head: InodeId,
        tails: impl IntoIterator<Item = InodeId>,
        weight: f64,
        source: impl Into<String>,
    ) -> Result<SnodeId> {
        self.insert_snode(head, tails, weight, Some(source.into()))
    }

    fn insert_snode(
        &mut self,
        head: InodeId,
        tails: impl IntoIterator<Item = InodeId>,
        weight: f64,
        source: Option<String>,
    ) -> Result<SnodeId> {
        let head_node = self.inode(head)?.clone();

        let tails: Vec<InodeId> = tails
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        for &tail in &tails {
            let tail_node = self.inode(tail)?;
            if tail_node.variable == head_node.variable {
                return Err(Error::Structural(format!(
                    "support node for {} requires {} on its own variable",
                    head_node, tail_node
                )));
            }
        }

        if !weight.is_finite() || weight < 0.0 {
            return Err(Error::Structural(format!(
                "support node for {} has invalid weight {}",
                head_node, weight
            )));
        }

        if let Some((a, b)) = self.first_mutex_pair(&tails) {
            return Err(Error::Structural(format!(
                "support node for {} requires both {} and {}",
                head_node, self.inodes[a.index()], self.inodes[b.index()]
            )));
        }

        if self.reaches_any(head, &tails) {
            debug!("rejecting support node for {}: cycle", head_node);
            return Err(Error::Structural(format!(
                "support node for {} would create a support cycle",
                head_node
            )));
        }

        let id = SnodeId(self.snodes.len() as u32);
        let snode = Snode {
            head,
            tails,
            weight,
            source,
        };
        trace!("add S-node {} -> {} (w={})", id, head_node, weight);
        self.index.insert_snode(&snode, id);
        self.snodes.push(snode);
        Ok(id)
    }

    /// Returns `true` if any of `targets` is reachable from `start` by
    /// following tail -> head implication edges.
    fn reaches_any(&self, start: InodeId, targets: &[InodeId]) -> bool {
        if targets.is_empty() {
            return false;
        }
        let targets: HashSet<InodeId> = targets.iter().copied().collect();
        let mut visited = HashSet::new();
        let mut frontier = vec![start];
        visited.insert(start);

        while let Some(current) = frontier.pop() {
            if targets.contains(&current) {
                return true;
            }
            for &s in self.index.requiring(current) {
                let next = self.snodes[s.index()].head;
                if visited.insert(next) {
                    frontier.push(next);
                }
            }
        }
        false
    }

    fn first_mutex_pair(&self, ids: &[InodeId]) -> Option<(InodeId, InodeId)> {
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                if self.inodes[a.index()].is_mutex_with(&self.inodes[b.index()]) {
                    return Some((a, b));
                }
            }
        }
        None
    }

    /// Retrieves an instantiation by id.
    pub fn inode(&self, id: InodeId) -> Result<&Inode> {
        self.inodes.get(id.index()).ok_or(Error::UnknownInode(id))
    }

    /// Retrieves a support node by id.
    pub fn snode(&self, id: SnodeId) -> Result<&Snode> {
        self.snodes.get(id.index()).ok_or(Error::UnknownSnode(id))
    }

    /// Finds the id of `variable = state`, if present.
    pub fn find_inode(&self, variable: &str, state: &str) -> Option<InodeId> {
        self.index.find(variable, state)
    }

    /// All instantiations of `variable`, in insertion order.
    pub fn nodes_for_variable(&self, variable: &str) -> &[InodeId] {
        self.index.for_variable(variable)
    }

    /// Support nodes whose head is `inode` (reverse index).
    pub fn support_nodes_concluding_fact(&self, inode: InodeId) -> &[SnodeId] {
        self.index.concluding(inode)
    }

    /// Support nodes whose tail set contains `inode` (forward index).
    pub fn support_nodes_requiring_fact(&self, inode: InodeId) -> &[SnodeId] {
        self.index.requiring(inode)
    }

    /// Returns `true` if `a` and `b` assign different states to one variable.
    pub fn are_mutex(&self, a: InodeId, b: InodeId) -> bool {
        match (self.inodes.get(a.index()), self.inodes.get(b.index())) {
            (Some(x), Some(y)) => x.is_mutex_with(y),
            _ => false,
        }
    }

    /// Variable names in insertion order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.index.variables()
    }

    /// Returns `true` if the store knows the variable.
    pub fn has_variable(&self, variable: &str) -> bool {
        !self.index.for_variable(variable).is_empty()
    }

    /// Iterates all instantiations with their ids.
    pub fn inodes(&self) -> impl Iterator<Item = (InodeId, &Inode)> {
        self.inodes
            .iter()
            .enumerate()
            .map(|(i, n)| (InodeId(i as u32), n))
    }

    /// Iterates all support nodes with their ids.
    pub fn snodes(&self) -> impl Iterator<Item = (SnodeId, &Snode)> {
        self.snodes
            .iter()
            .enumerate()
            .map(|(i, s)| (SnodeId(i as u32), s))
    }

    /// Number of instantiation nodes.
    pub fn inode_count(&self) -> usize {
        self.inodes.len()
    }

    /// Number of support nodes.
    pub fn snode_count(&self) -> usize {
        self.snodes.len()
    }

    /// Returns `true` if the store holds nothing.
    pub fn is_empty(&self) -> bool {
        self.inodes.is_empty()
    }

    /// Summary counts.
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            inodes: self.inodes.len(),
            snodes: self.snodes.len(),
            variables: self.index.variable_count(),
            priors: self.snodes.iter().filter(|s| s.is_prior()).count(),
        }
    }

    /// Renders a support node as `[tail, ...] -> head (w)`.
    pub fn describe_snode(&self, id: SnodeId) -> Result<String> {
        let snode = self.snode(id)?;
        let tails = snode
            .tails
            .iter()
            .map(|&t| self.inode(t).map(ToString::to_string))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!(
            "[{}] -> {} ({})",
            tails.join(", "),
            self.inode(snode.head)?,
            snode.weight
        ))
    }

    /// Re-validates a store that was assembled elsewhere.
    ///
    /// Checks that every reference is in range, that weights are valid, and
    /// that the implication structure is acyclic (Kahn's algorithm).
    pub fn verify(&self) -> Result<()> {
        let n = self.inodes.len();
        let mut indegree = vec![0usize; n];

        for (id, snode) in self.snodes() {
            if snode.head.index() >= n {
                return Err(Error::UnknownInode(snode.head));
            }
            if !snode.weight.is_finite() || snode.weight < 0.0 {
                return Err(Error::Structural(format!(
                    "{} has invalid weight {}",
                    id, snode.weight
                )));
            }
            for tail in &snode.tails {
                if tail.index() >= n {
                    return Err(Error::UnknownInode(*tail));
                }
            }
            indegree[snode.head.index()] += snode.tails.len();
        }

        let mut queue: VecDeque<InodeId> = (0..n)
            .filter(|&i| indegree[i] == 0)
            .map(|i| InodeId(i as u32))
            .collect();
        let mut processed = 0usize;

        while let Some(current) = queue.pop_front() {
            processed += 1;
            for &s in self.index.requiring(current) {
                let head = self.snodes[s.index()].head.index();
                indegree[head] -= 1;
                if indegree[head] == 0 {
                    queue.push_back(InodeId(head as u32));
                }
            }
        }

        if processed < n {
            let stuck = indegree
                .iter()
                .position(|&d| d > 0)
                .map(|i| self.inodes[i].to_string())
                .unwrap_or_default();
            return Err(Error::Structural(format!(
                "support cycle detected through {}",
                stuck
            )));
        }

        Ok(())
    }

    /// Builds a new store holding only `snodes` and the instantiations they
    /// mention. Ids in the returned store are freshly assigned.
    pub fn subgraph(&self, snodes: impl IntoIterator<Item = SnodeId>) -> Result<GraphStore> {
        let selected: BTreeSet<SnodeId> = snodes.into_iter().collect();
        let mut sub = GraphStore::new();

        for id in selected {
            let snode = self.snode(id)?;
            let head = {
                let n = self.inode(snode.head)?;
                sub.add_inode(n.variable.clone(), n.state.clone())?
            };
            let mut tails = Vec::with_capacity(snode.tails.len());
            for &t in &snode.tails {
                let n = self.inode(t)?;
                tails.push(sub.add_inode(n.variable.clone(), n.state.clone())?);
            }
            sub.insert_snode(head, tails, snode.weight, snode.source.clone())?;
        }

        Ok(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ab_store() -> (GraphStore, InodeId, InodeId, InodeId, InodeId) {
        let mut store = GraphStore::new();
        let a_t = store.add_inode("A", "True").unwrap();
        let a_f = store.add_inode("A", "False").unwrap();
        let b_h = store.add_inode("B", "High").unwrap();
        let b_l = store.add_inode("B", "Low").unwrap();
        (store, a_t, a_f, b_h, b_l)
    }

    #[test]
    fn test_add_inode_is_idempotent() {
        let mut store = GraphStore::new();
        let first = store.add_inode("A", "True").unwrap();
        let second = store.add_inode("A", "True").unwrap();
        assert_eq!(first, second);
        assert_eq!(store.inode_count(), 1);
    }

    #[test]
    fn test_empty_names_rejected() {
        let mut store = GraphStore::new();
        assert!(matches!(
            store.add_inode("", "True"),
            Err(Error::Structural(_))
        ));
        assert!(matches!(store.add_inode("A", ""), Err(Error::Structural(_))));
    }

    #[test]
    fn test_unknown_reference_rejected() {
        let (mut store, a_t, ..) = ab_store();
        let err = store.add_snode(InodeId(99), [a_t], 1.0).unwrap_err();
        assert_eq!(err, Error::UnknownInode(InodeId(99)));
    }

    #[test]
    fn test_invalid_weight_rejected() {
        let (mut store, a_t, _, b_h, _) = ab_store();
        assert!(store.add_snode(b_h, [a_t], -0.1).is_err());
        assert!(store.add_snode(b_h, [a_t], f64::NAN).is_err());
        assert!(store.add_snode(b_h, [a_t], 0.0).is_ok());
    }

    #[test]
    fn test_mutex_tails_rejected() {
        let (mut store, a_t, a_f, b_h, _) = ab_store();
        let err = store.add_snode(b_h, [a_t, a_f], 0.5).unwrap_err();
        assert!(err.to_string().contains("requires both"));
    }

    #[test]
    fn test_self_variable_tail_rejected() {
        let (mut store, a_t, a_f, ..) = ab_store();
        assert!(store.add_snode(a_t, [a_f], 0.5).is_err());
        assert!(store.add_snode(a_t, [a_t], 0.5).is_err());
    }

    #[test]
    fn test_cycle_rejected() {
        let mut store = GraphStore::new();
        let a = store.add_inode("A", "1").unwrap();
        let b = store.add_inode("B", "1").unwrap();
        let c = store.add_inode("C", "1").unwrap();
        store.add_snode(b, [a], 1.0).unwrap();
        store.add_snode(c, [b], 1.0).unwrap();

        let err = store.add_snode(a, [c], 1.0).unwrap_err();
        assert!(err.to_string().contains("cycle"));
        assert_eq!(store.snode_count(), 2);
        assert!(store.verify().is_ok());
    }

    #[test]
    fn test_indexes() {
        let (mut store, a_t, a_f, b_h, _) = ab_store();
        let s1 = store.add_snode(b_h, [a_t], 0.8).unwrap();
        let s2 = store.add_snode(b_h, [a_f], 0.2).unwrap();

        assert_eq!(store.support_nodes_concluding_fact(b_h), &[s1, s2]);
        assert_eq!(store.support_nodes_requiring_fact(a_f), &[s2]);
        assert_eq!(store.nodes_for_variable("B").len(), 2);
        assert!(store.are_mutex(a_t, a_f));
        assert!(!store.are_mutex(a_t, b_h));
    }

    #[test]
    fn test_tails_sorted_and_deduplicated() {
        let mut store = GraphStore::new();
        let x = store.add_inode("X", "1").unwrap();
        let y = store.add_inode("Y", "1").unwrap();
        let z = store.add_inode("Z", "1").unwrap();
        let s = store.add_snode(z, [y, x, y], 1.0).unwrap();
        assert_eq!(store.snode(s).unwrap().tails, vec![x, y]);
    }

    #[test]
    fn test_subgraph_keeps_selected_rules() {
        let (mut store, a_t, a_f, b_h, _) = ab_store();
        let s1 = store
            .add_snode_with_source(b_h, [a_t], 0.8, "patient_1")
            .unwrap();
        store.add_snode(b_h, [a_f], 0.2).unwrap();

        let sub = store.subgraph([s1]).unwrap();
        assert_eq!(sub.snode_count(), 1);
        assert_eq!(sub.inode_count(), 2);
        assert!(sub.find_inode("A", "False").is_none());
        let (_, snode) = sub.snodes().next().unwrap();
        assert_eq!(snode.source.as_deref(), Some("patient_1"));
    }

    #[test]
    fn test_describe_snode() {
        let (mut store, a_t, _, b_h, _) = ab_store();
        let s = store.add_snode(b_h, [a_t], 0.8).unwrap();
        assert_eq!(store.describe_snode(s).unwrap(), "[A=True] -> B=High (0.8)");
    }

    #[test]
    fn test_stats() {
        let (mut store, a_t, _, b_h, _) = ab_store();
        store.add_snode(a_t, [], 0.5).unwrap();
        store.add_snode(b_h, [a_t], 0.8).unwrap();
        let stats = store.stats();
        assert_eq!(stats.inodes, 4);
        assert_eq!(stats.snodes, 2);
        assert_eq!(stats.variables, 2);
        assert_eq!(stats.priors, 1);
    }
}
