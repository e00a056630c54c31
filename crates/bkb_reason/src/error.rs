//! Error types for the BKB reasoning engine.

use thiserror::Error;

/// A specialized `Result` type for reasoning operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Defines the errors that can abort a reasoning call.
///
/// Rejected inference paths and targets without any supporting path are
/// *not* errors; they are recorded in the
/// [`InferenceResult`](crate::InferenceResult) diagnostics instead.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// An error from the knowledge base itself (structural problems, unknown
    /// ids, loader failures), passed through unchanged.
    #[error(transparent)]
    Graph(#[from] bkb_graph::Error),

    /// The query is malformed or references things the knowledge base lacks.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The evidence set asserts contradictory facts.
    #[error("Evidence unsatisfiable: {variable} cannot take {states:?} at once")]
    EvidenceUnsatisfiable {
        /// The variable with conflicting requirements.
        variable: String,
        /// The conflicting states or comparisons.
        states: Vec<String>,
    },

    /// A continuous threshold could not be resolved against observed buckets.
    #[error("Interpolation failed for {variable} at {threshold}: {reason}")]
    Interpolation {
        /// The meta-variable being resolved.
        variable: String,
        /// The threshold that could not be matched.
        threshold: f64,
        /// Why resolution failed.
        reason: String,
    },

    /// Metadata ranges are malformed.
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// An error occurred during data serialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The worker pool for parallel search could not be created.
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

impl Error {
    /// Returns `true` if this is a structural problem with the knowledge base.
    pub fn is_structural(&self) -> bool {
        matches!(self, Error::Graph(bkb_graph::Error::Structural(_)))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidQuery("unknown operator '=>'".to_string());
        assert!(err.to_string().contains("=>"));
    }

    #[test]
    fn test_graph_error_passes_through() {
        let inner = bkb_graph::Error::Structural("cycle".into());
        let err: Error = inner.clone().into();
        assert!(err.is_structural());
        assert_eq!(err.to_string(), inner.to_string());
    }

    #[test]
    fn test_unsatisfiable_names_states() {
        let err = Error::EvidenceUnsatisfiable {
            variable: "A".into(),
            states: vec!["True".into(), "False".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("True") && msg.contains("False"));
    }
}
