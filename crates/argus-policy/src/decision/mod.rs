//! Remediation decisions.
//!
//! A rule set is loaded once per process and evaluated against one finding
//! at a time. An empty action list is a valid decision.

mod rego;
mod rules;

use std::sync::Arc;

use argus_core::{Action, PolicyConfig, PolicyKind};
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::DecisionError;

pub use rego::RegoPolicy;
pub use rules::RuleSetPolicy;

/// A finding exactly as it was received, every field included.
pub type FindingDocument = Map<String, Value>;

/// Evaluates a finding against a loaded rule set.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// The ordered remediation actions for `finding`.
    async fn decide(&self, finding: &FindingDocument) -> Result<Vec<Action>, DecisionError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Load the rule set named by the configuration.
pub fn load_policy(config: &PolicyConfig) -> Result<Arc<dyn PolicyEngine>, DecisionError> {
    let engine: Arc<dyn PolicyEngine> = match config.kind {
        PolicyKind::Rego => Arc::new(RegoPolicy::from_file(&config.path, &config.rule)?),
        PolicyKind::Rules => Arc::new(RuleSetPolicy::from_file(&config.path)?),
    };

    tracing::info!(
        engine = engine.name(),
        path = %config.path.display(),
        "Remediation rule set loaded"
    );
    Ok(engine)
}

/// A string field of the finding, for logs.
pub(crate) fn field_str<'a>(finding: &'a FindingDocument, field: &str) -> &'a str {
    finding.get(field).and_then(Value::as_str).unwrap_or_default()
}

/// Interpret a decision document. Accepts `{actions: [...]}` or a bare list;
/// `null` means no actions.
pub(crate) fn actions_from_decision(
    decision: Value,
) -> Result<Vec<Action>, DecisionError> {
    let actions = match decision {
        Value::Null => return Ok(Vec::new()),
        Value::Object(mut map) => match map.remove("actions") {
            Some(Value::Null) | None => return Ok(Vec::new()),
            Some(actions) => actions,
        },
        list @ Value::Array(_) => list,
        other => {
            return Err(DecisionError::MalformedDecision(format!(
                "expected an object with 'actions', got {}",
                other
            )));
        }
    };

    serde_json::from_value(actions)
        .map_err(|e| DecisionError::MalformedDecision(format!("invalid action list: {}", e)))
}
