//! Fusion loader interface.
//!
//! Knowledge bases are fused from many sources and persisted by tooling that
//! lives outside this crate. The reasoning side only needs a way to ask for a
//! populated [`GraphStore`].

use std::path::Path;

use crate::{GraphStore, Result};

/// Produces a populated [`GraphStore`] from one fused source.
///
/// Implementations report malformed or missing data as
/// [`Error::Load`](crate::Error::Load). Callers should still run
/// [`GraphStore::verify`] on the returned store before reasoning over it.
pub trait FusionLoader {
    /// Loads the fused knowledge base found at `source`.
    fn load(&self, source: &Path) -> Result<GraphStore>;
}

impl<F> FusionLoader for F
where
    F: Fn(&Path) -> Result<GraphStore>,
{
    fn load(&self, source: &Path) -> Result<GraphStore> {
        self(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_closure_loader() {
        let loader = |path: &Path| -> Result<GraphStore> {
            if path.ends_with("fusion.bkb") {
                let mut store = GraphStore::new();
                store.add_inode("A", "True")?;
                Ok(store)
            } else {
                Err(Error::load(path, "no such knowledge base"))
            }
        };

        let store = loader.load(Path::new("/kb/fusion.bkb")).unwrap();
        assert_eq!(store.inode_count(), 1);

        let err = loader.load(Path::new("/kb/missing.bkb")).unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
    }
}
