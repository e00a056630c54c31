//! Human-readable rendering of an [`InferenceResult`].

use bkb_graph::GraphStore;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::error::Result;
use crate::query::Query;
use crate::result::{describe_diagnostic, describe_partial, InferenceResult};

/// A timestamped view of one query and its result.
#[derive(Debug, Clone)]
pub struct Report<'a> {
    store: &'a GraphStore,
    query: &'a Query,
    result: &'a InferenceResult,
    generated_at: DateTime<Utc>,
}

impl<'a> Report<'a> {
    /// Creates a report stamped with the current time.
    pub fn new(store: &'a GraphStore, query: &'a Query, result: &'a InferenceResult) -> Self {
        Self {
            store,
            query,
            result,
            generated_at: Utc::now(),
        }
    }

    /// When the report was created.
    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// The reported result.
    pub fn result(&self) -> &'a InferenceResult {
        self.result
    }

    /// One block per contribution: target, weight, then its rules.
    pub fn contributions_report(&self) -> Result<String> {
        let mut out = String::new();
        for (rank, contribution) in self.result.contributions().iter().enumerate() {
            out.push_str(&format!(
                "#{} {}={} weight={:.6}",
                rank + 1,
                contribution.variable,
                contribution.state,
                contribution.weight()
            ));
            if !contribution.sources.is_empty() {
                out.push_str(&format!(" sources={}", contribution.sources.join(",")));
            }
            out.push('\n');
            for step in &contribution.path.steps {
                out.push_str(&format!(
                    "    {}{}\n",
                    "  ".repeat(step.depth),
                    self.store.describe_snode(step.snode)?
                ));
            }
            for leaf in &contribution.path.meta_leaves {
                out.push_str(&format!(
                    "    meta {} x{:.4}\n",
                    self.store.inode(leaf.inode)?,
                    leaf.fraction
                ));
            }
        }
        Ok(out)
    }

    /// One line per completed inference, most probable first.
    pub fn completed_inferences_report(&self) -> String {
        let mut out = String::new();
        for inference in self.result.completed_inferences() {
            let assignments: Vec<String> =
                inference.assignments.iter().map(ToString::to_string).collect();
            out.push_str(&format!(
                "P={:.6} (w={:.6}) {}\n",
                inference.probability,
                inference.weight,
                assignments.join(", ")
            ));
        }
        out
    }

    fn evidence_line(&self) -> String {
        let mut parts: Vec<String> = self.query.evidence().iter().map(ToString::to_string).collect();
        parts.extend(self.query.meta_evidence().iter().map(ToString::to_string));
        if parts.is_empty() {
            "(none)".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Query: {}",
            self.query.name().unwrap_or("(unnamed)")
        )?;
        writeln!(f, "Generated: {}", self.generated_at.to_rfc3339())?;
        writeln!(f, "Evidence: {}", self.evidence_line())?;

        if self.result.is_empty() {
            return writeln!(f, "No targets.");
        }

        for distribution in self.result.probabilities().values() {
            writeln!(f, "{}:", distribution.variable)?;
            for state in &distribution.states {
                writeln!(f, "  {:<20} {:.6}", state.state, state.probability)?;
            }
        }

        for outcome in self.result.meta_targets() {
            writeln!(f, "P({}) = {:.6}", outcome.comparison, outcome.probability)?;
        }

        writeln!(f, "Contributions:")?;
        match self.contributions_report() {
            Ok(text) => write!(f, "{}", text)?,
            Err(_) => return Err(fmt::Error),
        }

        if !self.result.completed_inferences().is_empty() {
            writeln!(f, "Completed inferences:")?;
            write!(f, "{}", self.completed_inferences_report())?;
        }

        for diagnostic in self.result.diagnostics() {
            let line = describe_diagnostic(self.store, diagnostic).map_err(|_| fmt::Error)?;
            writeln!(f, "Note: {}", line)?;
        }
        for reason in self.result.partial() {
            let line = describe_partial(self.store, reason).map_err(|_| fmt::Error)?;
            writeln!(f, "Partial: {}", line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analyze, AnalyzeOptions, MetadataTable};

    #[test]
    fn test_report_renders_sections() {
        let mut store = GraphStore::new();
        let a = store.add_inode("A", "True").unwrap();
        let b = store.add_inode("B", "High").unwrap();
        store.add_snode_with_source(b, [a], 0.8, "tcga_lgg").unwrap();

        let query = Query::builder()
            .name("ab")
            .evidence("A", "True")
            .target("B")
            .build()
            .unwrap();
        let result = analyze(&store, &MetadataTable::new(), &query, &AnalyzeOptions::default())
            .unwrap();

        let report = Report::new(&store, &query, &result);
        let text = report.to_string();
        assert!(text.contains("Query: ab"));
        assert!(text.contains("Evidence: A=True"));
        assert!(text.contains("High"));
        assert!(text.contains("[A=True] -> B=High (0.8)"));
        assert!(text.contains("sources=tcga_lgg"));
        assert!(report
            .completed_inferences_report()
            .starts_with("P=1.000000"));
    }

    #[test]
    fn test_empty_report() {
        let store = GraphStore::new();
        let query = Query::builder().build().unwrap();
        let result = InferenceResult::empty(None);
        let text = Report::new(&store, &query, &result).to_string();
        assert!(text.contains("(unnamed)"));
        assert!(text.contains("No targets."));
    }
}
