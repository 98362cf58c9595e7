//! Error types for predicates and remediation decisions.

use thiserror::Error;

/// A predicate expression that cannot be parsed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PredicateError {
    #[error("invalid predicate expression: {0}")]
    Syntax(String),
}

/// Errors raised while loading or evaluating a remediation rule set.
#[derive(Debug, Error)]
pub enum DecisionError {
    /// The rule set file could not be read.
    #[error("failed to read rule set {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The rule set is malformed.
    #[error("invalid rule set: {0}")]
    InvalidRuleSet(String),

    /// Evaluating the rule set against a finding failed.
    #[error("rule evaluation failed: {0}")]
    Evaluation(String),

    /// The rule set produced something other than a list of actions.
    #[error("malformed decision: {0}")]
    MalformedDecision(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
