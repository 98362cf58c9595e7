//! Argus Policy
//!
//! Two evaluation concerns live here:
//!
//! - [`predicate`]: the boolean expression language controls use to decide
//!   whether a resource record is compliant.
//! - [`decision`]: remediation rule sets that turn a finding into an ordered
//!   list of actions. Rego modules and YAML rule lists are both supported
//!   behind the [`PolicyEngine`] trait.

pub mod decision;
pub mod error;
pub mod predicate;

pub use decision::{FindingDocument, PolicyEngine, RegoPolicy, RuleSetPolicy, load_policy};
pub use error::{DecisionError, PredicateError};
pub use predicate::{Expr, Predicate, evaluate, parse_expression};
