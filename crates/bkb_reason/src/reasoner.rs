//! High-level entry point.
//!
//! A [`Reasoner`] pairs a verified knowledge base with the metadata of its
//! meta-variables and answers queries as [`AnalyzedQuery`] values, which keep
//! the induced support graph next to the result for rendering and
//! re-validation.

use bkb_graph::{FusionLoader, GraphStore};
use log::info;
use std::path::Path;

use crate::config::AnalyzeOptions;
use crate::engine::InferenceEngine;
use crate::error::Result;
use crate::metadata::MetadataTable;
use crate::mutex::{MutexReport, MutexValidator};
use crate::query::Query;
use crate::report::Report;
use crate::result::InferenceResult;

/// Loads a fused knowledge base and verifies it before use.
pub fn load_knowledge_base<L: FusionLoader + ?Sized>(loader: &L, source: &Path) -> Result<GraphStore> {
    let store = loader.load(source)?;
    store.verify()?;
    let stats = store.stats();
    info!(
        "Loaded knowledge base from {}: {} I-nodes, {} S-nodes, {} variables",
        source.display(),
        stats.inodes,
        stats.snodes,
        stats.variables
    );
    Ok(store)
}

/// Answers queries over one knowledge base.
///
/// # Examples
///
/// ```
/// use bkb_graph::GraphStore;
/// use bkb_reason::{AnalyzeOptions, Query, Reasoner};
///
/// # fn main() -> Result<(), bkb_reason::Error> {
/// let mut store = GraphStore::new();
/// let a = store.add_inode("A", "True")?;
/// let b = store.add_inode("B", "High")?;
/// store.add_snode(b, [a], 0.8)?;
///
/// let reasoner = Reasoner::new(&store)?;
/// let query = Query::builder().evidence("A", "True").target("B").build()?;
/// let analyzed = reasoner.analyze_query(&query, &AnalyzeOptions::default())?;
///
/// assert_eq!(analyzed.result().probability("B", "High"), Some(1.0));
/// assert_eq!(analyzed.bkb().snode_count(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Reasoner<'a> {
    store: &'a GraphStore,
    metadata: MetadataTable,
}

impl<'a> Reasoner<'a> {
    /// Verifies `store` and creates a reasoner without metadata.
    pub fn new(store: &'a GraphStore) -> Result<Self> {
        store.verify()?;
        let stats = store.stats();
        info!(
            "Reasoner ready: {} I-nodes, {} S-nodes ({} priors), {} variables",
            stats.inodes, stats.snodes, stats.priors, stats.variables
        );
        Ok(Self {
            store,
            metadata: MetadataTable::new(),
        })
    }

    /// Builder-style [`set_src_metadata`](Self::set_src_metadata).
    pub fn with_metadata(mut self, metadata: MetadataTable) -> Self {
        self.set_src_metadata(metadata);
        self
    }

    /// Replaces the meta-variable ranges.
    pub fn set_src_metadata(&mut self, metadata: MetadataTable) {
        info!("Reasoner metadata set for {} meta-variables", metadata.len());
        self.metadata = metadata;
    }

    /// The meta-variable ranges in use.
    pub fn metadata_ranges(&self) -> &MetadataTable {
        &self.metadata
    }

    /// The knowledge base.
    pub fn store(&self) -> &'a GraphStore {
        self.store
    }

    /// Checks the knowledge base for derivations holding mutually exclusive
    /// I-nodes.
    pub fn check_mutex(&self) -> Result<MutexReport> {
        MutexValidator::new().check_graph(self.store)
    }

    /// Answers `query` and extracts its support graph.
    pub fn analyze_query(&self, query: &Query, options: &AnalyzeOptions) -> Result<AnalyzedQuery<'a>> {
        let result = InferenceEngine::new(self.store, &self.metadata).analyze(query, options)?;
        let bkb = result.support_graph(self.store)?;
        Ok(AnalyzedQuery {
            store: self.store,
            query: query.clone(),
            result,
            bkb,
        })
    }
}

/// A query together with its result and support graph.
#[derive(Debug, Clone)]
pub struct AnalyzedQuery<'a> {
    store: &'a GraphStore,
    query: Query,
    result: InferenceResult,
    bkb: GraphStore,
}

impl<'a> AnalyzedQuery<'a> {
    /// The query.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// The result.
    pub fn result(&self) -> &InferenceResult {
        &self.result
    }

    /// The sub-store induced by the contributing S-nodes, with fresh ids.
    pub fn bkb(&self) -> &GraphStore {
        &self.bkb
    }

    /// Re-validates the result for mutually exclusive I-nodes.
    pub fn check_mutex(&self) -> Result<MutexReport> {
        MutexValidator::new().check_result(self.store, &self.result)
    }

    /// Renders the result.
    pub fn report(&self) -> Report<'_> {
        Report::new(self.store, &self.query, &self.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::metadata::MetaRanges;

    fn store() -> GraphStore {
        let mut store = GraphStore::new();
        let a = store.add_inode("A", "True").unwrap();
        store.add_inode("A", "False").unwrap();
        let b = store.add_inode("B", "High").unwrap();
        store.add_snode(b, [a], 0.8).unwrap();
        store
    }

    #[test]
    fn test_metadata_roundtrip() {
        let store = store();
        let table = MetadataTable::new()
            .with_ranges(MetaRanges::from_boundaries("Age", &[0.0, 50.0]).unwrap());
        let reasoner = Reasoner::new(&store).unwrap().with_metadata(table.clone());
        assert_eq!(reasoner.metadata_ranges(), &table);
    }

    #[test]
    fn test_analyzed_query_keeps_support_graph() {
        let store = store();
        let reasoner = Reasoner::new(&store).unwrap();
        let query = Query::builder()
            .evidence("A", "True")
            .target("B")
            .build()
            .unwrap();
        let analyzed = reasoner
            .analyze_query(&query, &AnalyzeOptions::test_mode())
            .unwrap();

        assert_eq!(analyzed.query(), &query);
        assert_eq!(analyzed.bkb().inode_count(), 2);
        assert!(analyzed.check_mutex().unwrap().consistent);
        assert!(analyzed.report().to_string().contains("B=High"));
    }

    #[test]
    fn test_load_knowledge_base_verifies() {
        let loader = |_: &Path| -> bkb_graph::Result<GraphStore> { Ok(store()) };
        let loaded = load_knowledge_base(&loader, Path::new("fusion.bkb")).unwrap();
        assert_eq!(loaded.snode_count(), 1);

        let failing = |path: &Path| -> bkb_graph::Result<GraphStore> {
            Err(bkb_graph::Error::load(path, "truncated file"))
        };
        let err = load_knowledge_base(&failing, Path::new("broken.bkb")).unwrap_err();
        assert!(matches!(err, Error::Graph(bkb_graph::Error::Load { .. })));
    }
}
