//! Rego rule sets evaluated with `regorus`.

use std::fs;
use std::path::Path;

use argus_core::Action;
use async_trait::async_trait;

use super::{FindingDocument, PolicyEngine, actions_from_decision, field_str};
use crate::error::DecisionError;

/// A Rego module plus the rule holding the decision.
///
/// The module is compiled once at load to surface syntax errors. Each
/// evaluation builds its own engine from the module text.
#[derive(Debug, Clone)]
pub struct RegoPolicy {
    module_path: String,
    source: String,
    rule: String,
}

impl RegoPolicy {
    /// Load a Rego module from disk.
    pub fn from_file(path: impl AsRef<Path>, rule: &str) -> Result<Self, DecisionError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| DecisionError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_source(path.display().to_string(), source, rule)
    }

    /// Build a policy from module text. `module_path` is only used in
    /// diagnostics.
    pub fn from_source(
        module_path: impl Into<String>,
        source: impl Into<String>,
        rule: &str,
    ) -> Result<Self, DecisionError> {
        let rule = rule.trim();
        if !rule.starts_with("data.") {
            return Err(DecisionError::InvalidRuleSet(format!(
                "decision rule '{}' must be a path under 'data.'",
                rule
            )));
        }

        let policy = Self {
            module_path: module_path.into(),
            source: source.into(),
            rule: rule.to_string(),
        };
        policy.engine()?;
        Ok(policy)
    }

    /// The rule path evaluated for each finding.
    pub fn rule(&self) -> &str {
        &self.rule
    }

    fn engine(&self) -> Result<regorus::Engine, DecisionError> {
        let mut engine = regorus::Engine::new();
        engine
            .add_policy(self.module_path.clone(), self.source.clone())
            .map_err(|e| DecisionError::InvalidRuleSet(e.to_string()))?;
        Ok(engine)
    }

    fn evaluate(&self, finding: &FindingDocument) -> Result<serde_json::Value, DecisionError> {
        let mut engine = self.engine()?;

        let input = serde_json::to_string(finding)?;
        let input = regorus::Value::from_json_str(&input)
            .map_err(|e| DecisionError::Evaluation(e.to_string()))?;
        engine.set_input(input);

        let value = engine
            .eval_rule(self.rule.clone())
            .map_err(|e| DecisionError::Evaluation(e.to_string()))?;
        if value == regorus::Value::Undefined {
            return Ok(serde_json::Value::Null);
        }

        let json = value
            .to_json_str()
            .map_err(|e| DecisionError::MalformedDecision(e.to_string()))?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[async_trait]
impl PolicyEngine for RegoPolicy {
    async fn decide(&self, finding: &FindingDocument) -> Result<Vec<Action>, DecisionError> {
        let decision = self.evaluate(finding)?;
        let actions = actions_from_decision(decision)?;

        tracing::debug!(
            control_id = field_str(finding, "controlID"),
            resource = field_str(finding, "InstanceIdentifier"),
            actions = actions.len(),
            "Rego decision evaluated"
        );
        Ok(actions)
    }

    fn name(&self) -> &str {
        "rego"
    }
}
