//! Query model
//!
//! A [`Query`] describes one reasoning request: discrete evidence, relational
//! evidence on continuous meta-variables, the variables to compute
//! distributions for, and relational meta-targets. Queries are validated when
//! built and carry no engine state.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A discrete observation: `variable = state`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fact {
    /// The random variable.
    pub variable: String,
    /// The observed state.
    pub state: String,
}

impl Fact {
    /// Creates a new fact.
    pub fn new(variable: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            state: state.into(),
        }
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.variable, self.state)
    }
}

/// Relational operator for meta-variable comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// `=`
    #[serde(rename = "=")]
    Eq,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `<`
    #[serde(rename = "<")]
    Lt,
}

impl Operator {
    /// All supported operators.
    pub const ALL: [Operator; 5] = [
        Operator::Eq,
        Operator::Ge,
        Operator::Le,
        Operator::Gt,
        Operator::Lt,
    ];

    /// The operator's symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Lt => "<",
        }
    }

    /// Evaluates `value <op> threshold`.
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Eq => value == threshold,
            Operator::Ge => value >= threshold,
            Operator::Le => value <= threshold,
            Operator::Gt => value > threshold,
            Operator::Lt => value < threshold,
        }
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Operator::ALL
            .into_iter()
            .find(|op| op.symbol() == s.trim())
            .ok_or_else(|| {
                Error::InvalidQuery(format!(
                    "unknown operator '{}', expected one of =, >=, <=, >, <",
                    s
                ))
            })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A comparison `variable <operator> threshold` on a meta-variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaComparison {
    /// The meta-variable.
    pub variable: String,
    /// The relational operator.
    pub operator: Operator,
    /// The numeric threshold.
    pub threshold: f64,
}

impl MetaComparison {
    /// Creates a new comparison.
    pub fn new(variable: impl Into<String>, operator: Operator, threshold: f64) -> Self {
        Self {
            variable: variable.into(),
            operator,
            threshold,
        }
    }

    /// Returns `true` if `value` satisfies this comparison.
    pub fn admits(&self, value: f64) -> bool {
        self.operator.holds(value, self.threshold)
    }
}

impl fmt::Display for MetaComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.variable, self.operator, self.threshold)
    }
}

/// An immutable reasoning request.
///
/// # Examples
///
/// ```
/// use bkb_reason::Query;
///
/// # fn main() -> Result<(), bkb_reason::Error> {
/// let query = Query::builder()
///     .evidence("_mut_AADAC", "True")
///     .meta_evidence("Age_of_Diagnosis", ">=", 20000.0)
///     .meta_target("Survival_Time", ">=", 300.0)
///     .build()?;
///
/// assert_eq!(query.evidence().len(), 1);
/// assert!(query.targets().is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Query {
    name: Option<String>,
    evidence: Vec<Fact>,
    meta_evidence: Vec<MetaComparison>,
    targets: Vec<String>,
    meta_targets: Vec<MetaComparison>,
}

impl Query {
    /// Starts building a query.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    /// Optional human-readable name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Discrete evidence facts, in the order given.
    pub fn evidence(&self) -> &[Fact] {
        &self.evidence
    }

    /// Relational evidence on meta-variables.
    pub fn meta_evidence(&self) -> &[MetaComparison] {
        &self.meta_evidence
    }

    /// Target variables.
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Relational meta-targets.
    pub fn meta_targets(&self) -> &[MetaComparison] {
        &self.meta_targets
    }

    /// Returns `true` if nothing is asked for explicitly.
    pub fn has_no_targets(&self) -> bool {
        self.targets.is_empty() && self.meta_targets.is_empty()
    }

    /// Re-runs the construction checks; useful for deserialized queries.
    pub fn validate(&self) -> Result<()> {
        for fact in &self.evidence {
            if fact.variable.trim().is_empty() || fact.state.trim().is_empty() {
                return Err(Error::InvalidQuery(format!(
                    "evidence '{}' needs a variable and a state",
                    fact
                )));
            }
        }

        for comparison in self.meta_evidence.iter().chain(&self.meta_targets) {
            if comparison.variable.trim().is_empty() {
                return Err(Error::InvalidQuery(
                    "meta comparison without a variable".to_string(),
                ));
            }
            if !comparison.threshold.is_finite() {
                return Err(Error::InvalidQuery(format!(
                    "meta comparison '{}' needs a finite threshold",
                    comparison
                )));
            }
        }

        let mut seen = IndexSet::new();
        for target in &self.targets {
            if target.trim().is_empty() {
                return Err(Error::InvalidQuery("empty target variable".to_string()));
            }
            if !seen.insert(target.as_str()) {
                return Err(Error::InvalidQuery(format!(
                    "target '{}' listed twice",
                    target
                )));
            }
        }

        for (i, a) in self.meta_targets.iter().enumerate() {
            if self.meta_targets[..i].contains(a) {
                return Err(Error::InvalidQuery(format!(
                    "meta target '{}' listed twice",
                    a
                )));
            }
        }

        let evidence_vars: IndexSet<&str> = self
            .evidence
            .iter()
            .map(|f| f.variable.as_str())
            .collect();
        let meta_evidence_vars: IndexSet<&str> = self
            .meta_evidence
            .iter()
            .map(|c| c.variable.as_str())
            .collect();

        if let Some(var) = evidence_vars.iter().find(|v| meta_evidence_vars.contains(**v)) {
            return Err(Error::InvalidQuery(format!(
                "'{}' is used as both discrete and meta evidence",
                var
            )));
        }

        let target_vars = self
            .targets
            .iter()
            .map(String::as_str)
            .chain(self.meta_targets.iter().map(|c| c.variable.as_str()));
        for var in target_vars {
            if evidence_vars.contains(var) || meta_evidence_vars.contains(var) {
                return Err(Error::InvalidQuery(format!(
                    "'{}' cannot be both evidence and a target",
                    var
                )));
            }
        }

        Ok(())
    }
}

/// Fluent builder for [`Query`].
///
/// Operator strings are parsed as they are added; the first problem is kept
/// and reported by [`build`](QueryBuilder::build).
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
    error: Option<Error>,
}

impl QueryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a name for reports.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.query.name = Some(name.into());
        self
    }

    /// Adds the observation `variable = state`.
    pub fn evidence(mut self, variable: impl Into<String>, state: impl Into<String>) -> Self {
        self.query.evidence.push(Fact::new(variable, state));
        self
    }

    /// Adds a meta-evidence comparison, parsing `operator` from its symbol.
    pub fn meta_evidence(mut self, variable: impl Into<String>, operator: &str, threshold: f64) -> Self {
        if let Some(op) = self.parse_operator(operator) {
            self.query
                .meta_evidence
                .push(MetaComparison::new(variable, op, threshold));
        }
        self
    }

    /// Adds an already typed meta-evidence comparison.
    pub fn meta_evidence_comparison(mut self, comparison: MetaComparison) -> Self {
        self.query.meta_evidence.push(comparison);
        self
    }

    /// Adds a target variable.
    pub fn target(mut self, variable: impl Into<String>) -> Self {
        self.query.targets.push(variable.into());
        self
    }

    /// Adds several target variables.
    pub fn targets<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query
            .targets
            .extend(variables.into_iter().map(Into::into));
        self
    }

    /// Adds a meta-target comparison, parsing `operator` from its symbol.
    pub fn meta_target(mut self, variable: impl Into<String>, operator: &str, threshold: f64) -> Self {
        if let Some(op) = self.parse_operator(operator) {
            self.query
                .meta_targets
                .push(MetaComparison::new(variable, op, threshold));
        }
        self
    }

    /// Adds an already typed meta-target comparison.
    pub fn meta_target_comparison(mut self, comparison: MetaComparison) -> Self {
        self.query.meta_targets.push(comparison);
        self
    }

    fn parse_operator(&mut self, symbol: &str) -> Option<Operator> {
        match symbol.parse() {
            Ok(op) => Some(op),
            Err(e) => {
                self.error.get_or_insert(e);
                None
            }
        }
    }

    /// Validates and returns the query.
    pub fn build(self) -> Result<Query> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.query.validate()?;
        Ok(self.query)
    }
}
