//! Integration tests for GraphStore
//!
//! Tests store construction, index consistency, structural validation,
//! and concurrent read-only access.

use bkb_graph::{Error, FusionLoader, GraphStore, InodeId};
use std::path::Path;
use std::sync::Arc;
use std::thread;

fn chain_store(len: usize) -> (GraphStore, Vec<InodeId>) {
    let mut store = GraphStore::new();
    let mut ids = Vec::with_capacity(len);
    for i in 0..len {
        ids.push(store.add_inode(format!("V{}", i), "on").unwrap());
        store.add_inode(format!("V{}", i), "off").unwrap();
    }
    store.add_snode(ids[0], [], 1.0).unwrap();
    for i in 1..len {
        store.add_snode(ids[i], [ids[i - 1]], 0.9).unwrap();
    }
    (store, ids)
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_chain_construction() {
    let (store, ids) = chain_store(10);
    assert_eq!(store.inode_count(), 20);
    assert_eq!(store.snode_count(), 10);
    assert_eq!(store.variables().count(), 10);
    assert_eq!(store.support_nodes_concluding_fact(ids[5]).len(), 1);
    assert_eq!(store.support_nodes_requiring_fact(ids[5]).len(), 1);
    assert!(store.support_nodes_requiring_fact(ids[9]).is_empty());
    store.verify().unwrap();
}

#[test]
fn test_long_cycle_rejected() {
    let (mut store, ids) = chain_store(50);
    let err = store.add_snode(ids[0], [ids[49]], 1.0).unwrap_err();
    assert!(matches!(err, Error::Structural(_)));
    store.verify().unwrap();
}

#[test]
fn test_diamond_is_not_a_cycle() {
    let mut store = GraphStore::new();
    let a = store.add_inode("A", "1").unwrap();
    let b = store.add_inode("B", "1").unwrap();
    let c = store.add_inode("C", "1").unwrap();
    let d = store.add_inode("D", "1").unwrap();
    store.add_snode(b, [a], 1.0).unwrap();
    store.add_snode(c, [a], 1.0).unwrap();
    store.add_snode(d, [b, c], 1.0).unwrap();
    store.verify().unwrap();
    assert_eq!(store.support_nodes_requiring_fact(a).len(), 2);
}

#[test]
fn test_nodes_for_unknown_variable() {
    let (store, _) = chain_store(3);
    assert!(store.nodes_for_variable("missing").is_empty());
    assert!(!store.has_variable("missing"));
    assert!(store.has_variable("V2"));
}

#[test]
fn test_lookup_errors() {
    let store = GraphStore::new();
    assert!(matches!(
        store.inode(InodeId(0)),
        Err(Error::UnknownInode(InodeId(0)))
    ));
}

#[test]
fn test_stats_serialize() {
    let (store, _) = chain_store(4);
    let json = serde_json::to_string(&store.stats()).unwrap();
    assert!(json.contains("\"snodes\":4"));
}

// ============================================================================
// Loader
// ============================================================================

struct ChainLoader;

impl FusionLoader for ChainLoader {
    fn load(&self, source: &Path) -> bkb_graph::Result<GraphStore> {
        match source.file_stem().and_then(|s| s.to_str()) {
            Some("chain") => Ok(chain_store(5).0),
            _ => Err(Error::load(source, "unknown knowledge base")),
        }
    }
}

#[test]
fn test_loader_produces_verified_store() {
    let store = ChainLoader.load(Path::new("kb/chain.bkb")).unwrap();
    store.verify().unwrap();
    assert_eq!(store.snode_count(), 5);
}

#[test]
fn test_loader_error_is_load_variant() {
    let err = ChainLoader.load(Path::new("kb/other.bkb")).unwrap_err();
    match err {
        Error::Load { source_path, .. } => assert!(source_path.ends_with("other.bkb")),
        other => panic!("unexpected error: {other}"),
    }
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_readers() {
    let (store, ids) = chain_store(100);
    let store = Arc::new(store);
    let ids = Arc::new(ids);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            let ids = Arc::clone(&ids);
            thread::spawn(move || {
                let mut total = 0;
                for i in (t..100).step_by(8) {
                    total += store.support_nodes_concluding_fact(ids[i]).len();
                }
                total
            })
        })
        .collect();

    let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, 100);
}
