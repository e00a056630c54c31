//! Completed inferences: consistent combinations of one path per target.
//!
//! Paths for different target variables are merged one variable at a time
//! through an explicit stack. A merge survives only if it still asserts one
//! state per variable and every I-node keeps at most one supporting S-node.

use bkb_graph::{GraphStore, InodeId, SnodeId};
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::Result;
use crate::query::Fact;
use crate::result::{CompletedInference, InferencePath};

/// Candidate paths of one target variable.
pub(crate) struct JointGroup<'p> {
    pub variable: &'p str,
    pub paths: Vec<&'p InferencePath>,
}

/// Completed inferences and how the enumeration ended.
#[derive(Debug, Default)]
pub(crate) struct JointOutcome {
    pub inferences: Vec<CompletedInference>,
    pub combinations: usize,
    pub exhausted: bool,
}

#[derive(Debug, Clone, Default)]
struct Merge<'s> {
    asserted: HashMap<&'s str, InodeId>,
    supported_by: HashMap<InodeId, SnodeId>,
    snodes: BTreeSet<SnodeId>,
    meta: BTreeMap<InodeId, f64>,
    targets: Vec<InodeId>,
}

impl<'s> Merge<'s> {
    fn with_path(&self, store: &'s GraphStore, path: &InferencePath) -> Result<Option<Merge<'s>>> {
        let mut next = self.clone();

        for id in path.inodes() {
            let variable = store.inode(id)?.variable.as_str();
            match next.asserted.get(variable) {
                Some(&held) if held != id => return Ok(None),
                Some(_) => {}
                None => {
                    next.asserted.insert(variable, id);
                }
            }
        }

        for step in &path.steps {
            match next.supported_by.get(&step.head) {
                Some(&existing) if existing != step.snode => return Ok(None),
                Some(_) => {}
                None => {
                    next.supported_by.insert(step.head, step.snode);
                }
            }
            next.snodes.insert(step.snode);
        }

        for leaf in &path.meta_leaves {
            next.meta.insert(leaf.inode, leaf.fraction);
        }
        next.targets.push(path.target);
        Ok(Some(next))
    }

    fn finish(&self, store: &GraphStore) -> Result<CompletedInference> {
        let mut weight = 1.0;
        for &sid in &self.snodes {
            weight *= store.snode(sid)?.weight;
        }
        for fraction in self.meta.values() {
            weight *= fraction;
        }

        let assignments = self
            .targets
            .iter()
            .map(|&t| {
                let inode = store.inode(t)?;
                Ok(Fact::new(inode.variable.clone(), inode.state.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut inodes: Vec<InodeId> = self.asserted.values().copied().collect();
        inodes.sort_unstable();

        Ok(CompletedInference {
            assignments,
            snodes: self.snodes.iter().copied().collect(),
            inodes,
            weight,
            probability: 0.0,
        })
    }
}

/// Enumerates consistent combinations of one path per group.
///
/// Every group must be covered, so a group without paths yields no
/// inferences. At most `budget` merges are attempted; `exhausted` reports
/// whether the budget cut the enumeration short.
pub(crate) fn complete_inferences(
    store: &GraphStore,
    groups: &[JointGroup<'_>],
    budget: usize,
) -> Result<JointOutcome> {
    let mut outcome = JointOutcome::default();
    if groups.is_empty() {
        return Ok(outcome);
    }
    for group in groups {
        trace!("joint: {} has {} candidate paths", group.variable, group.paths.len());
    }
    if let Some(group) = groups.iter().find(|g| g.paths.is_empty()) {
        debug!("no completed inferences: {} has no inference path", group.variable);
        return Ok(outcome);
    }

    let mut stack: Vec<(usize, Merge<'_>)> = vec![(0, Merge::default())];
    'search: while let Some((level, merge)) = stack.pop() {
        if level == groups.len() {
            outcome.inferences.push(merge.finish(store)?);
            continue;
        }

        let mut children = Vec::new();
        for path in &groups[level].paths {
            if outcome.combinations >= budget {
                outcome.exhausted = true;
                stack.extend(children.into_iter().rev());
                break 'search;
            }
            outcome.combinations += 1;
            if let Some(next) = merge.with_path(store, path)? {
                children.push((level + 1, next));
            }
        }
        stack.extend(children.into_iter().rev());
    }

    // Finish merges that were already complete when the budget ran out.
    while let Some((level, merge)) = stack.pop() {
        if level == groups.len() {
            outcome.inferences.push(merge.finish(store)?);
        }
    }

    let total: f64 = outcome.inferences.iter().map(|i| i.weight).sum();
    for inference in &mut outcome.inferences {
        inference.probability = if total > 0.0 {
            inference.weight / total
        } else {
            0.0
        };
    }
    outcome.inferences.sort_by(|a, b| {
        b.weight
            .total_cmp(&a.weight)
            .then_with(|| a.snodes.cmp(&b.snodes))
    });

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::PathStep;

    fn path(target: InodeId, steps: &[(SnodeId, InodeId, f64)], weight: f64) -> InferencePath {
        InferencePath {
            target,
            steps: steps
                .iter()
                .map(|&(snode, head, w)| PathStep {
                    snode,
                    head,
                    tails: vec![],
                    weight: w,
                    depth: 0,
                })
                .collect(),
            evidence: vec![],
            meta_leaves: vec![],
            weight,
        }
    }

    #[test]
    fn test_independent_targets_multiply() {
        let mut store = GraphStore::new();
        let b = store.add_inode("B", "High").unwrap();
        let c = store.add_inode("C", "On").unwrap();
        let sb = store.add_snode(b, [], 0.5).unwrap();
        let sc = store.add_snode(c, [], 0.4).unwrap();

        let pb = path(b, &[(sb, b, 0.5)], 0.5);
        let pc = path(c, &[(sc, c, 0.4)], 0.4);
        let groups = vec![
            JointGroup {
                variable: "B",
                paths: vec![&pb],
            },
            JointGroup {
                variable: "C",
                paths: vec![&pc],
            },
        ];

        let outcome = complete_inferences(&store, &groups, 100).unwrap();
        assert_eq!(outcome.inferences.len(), 1);
        let inference = &outcome.inferences[0];
        assert!((inference.weight - 0.2).abs() < 1e-12);
        assert!((inference.probability - 1.0).abs() < 1e-12);
        assert_eq!(
            inference.assignments,
            vec![Fact::new("B", "High"), Fact::new("C", "On")]
        );
    }

    #[test]
    fn test_shared_snode_counted_once() {
        let mut store = GraphStore::new();
        let a = store.add_inode("A", "On").unwrap();
        let b = store.add_inode("B", "High").unwrap();
        let c = store.add_inode("C", "On").unwrap();
        let sa = store.add_snode(a, [], 0.5).unwrap();
        let sb = store.add_snode(b, [a], 0.5).unwrap();
        let sc = store.add_snode(c, [a], 0.5).unwrap();

        let pb = path(b, &[(sb, b, 0.5), (sa, a, 0.5)], 0.25);
        let pc = path(c, &[(sc, c, 0.5), (sa, a, 0.5)], 0.25);
        let groups = vec![
            JointGroup {
                variable: "B",
                paths: vec![&pb],
            },
            JointGroup {
                variable: "C",
                paths: vec![&pc],
            },
        ];

        let outcome = complete_inferences(&store, &groups, 100).unwrap();
        assert_eq!(outcome.inferences.len(), 1);
        assert!((outcome.inferences[0].weight - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_conflicting_paths_do_not_combine() {
        let mut store = GraphStore::new();
        let a_t = store.add_inode("A", "True").unwrap();
        let a_f = store.add_inode("A", "False").unwrap();
        let b = store.add_inode("B", "High").unwrap();
        let c = store.add_inode("C", "On").unwrap();
        let sat = store.add_snode(a_t, [], 0.5).unwrap();
        let saf = store.add_snode(a_f, [], 0.5).unwrap();
        let sb = store.add_snode(b, [a_t], 1.0).unwrap();
        let sc = store.add_snode(c, [a_f], 1.0).unwrap();

        let pb = path(b, &[(sb, b, 1.0), (sat, a_t, 0.5)], 0.5);
        let pc = path(c, &[(sc, c, 1.0), (saf, a_f, 0.5)], 0.5);
        let groups = vec![
            JointGroup {
                variable: "B",
                paths: vec![&pb],
            },
            JointGroup {
                variable: "C",
                paths: vec![&pc],
            },
        ];

        let outcome = complete_inferences(&store, &groups, 100).unwrap();
        assert!(outcome.inferences.is_empty());
        assert_eq!(outcome.combinations, 2);
    }

    #[test]
    fn test_uncovered_group_yields_nothing() {
        let mut store = GraphStore::new();
        let b = store.add_inode("B", "High").unwrap();
        store.add_inode("C", "On").unwrap();
        let sb = store.add_snode(b, [], 0.8).unwrap();

        let pb = path(b, &[(sb, b, 0.8)], 0.8);
        let groups = vec![
            JointGroup {
                variable: "B",
                paths: vec![&pb],
            },
            JointGroup {
                variable: "C",
                paths: vec![],
            },
        ];

        let outcome = complete_inferences(&store, &groups, 100).unwrap();
        assert!(outcome.inferences.is_empty());
        assert_eq!(outcome.combinations, 0);
        assert!(!outcome.exhausted);
    }

    #[test]
    fn test_budget_exhaustion() {
        let mut store = GraphStore::new();
        let b_h = store.add_inode("B", "High").unwrap();
        let b_l = store.add_inode("B", "Low").unwrap();
        let s1 = store.add_snode(b_h, [], 0.6).unwrap();
        let s2 = store.add_snode(b_l, [], 0.4).unwrap();
        let p1 = path(b_h, &[(s1, b_h, 0.6)], 0.6);
        let p2 = path(b_l, &[(s2, b_l, 0.4)], 0.4);
        let groups = vec![JointGroup {
            variable: "B",
            paths: vec![&p1, &p2],
        }];

        let outcome = complete_inferences(&store, &groups, 1).unwrap();
        assert!(outcome.exhausted);
        assert_eq!(outcome.inferences.len(), 1);
        assert!((outcome.inferences[0].probability - 1.0).abs() < 1e-12);
    }
}
