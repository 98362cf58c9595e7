//! Remediation action dispatch.

use std::sync::Arc;

use argus_core::{Action, CapabilityEntry, CapabilityTable};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DispatchError;
use crate::provider::Provider;

/// Transport metadata removed from every action result.
pub const RESPONSE_METADATA: &str = "ResponseMetadata";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Success,
    Failed,
}

/// Outcome of one attempted action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: Action,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Results of a fail-fast dispatch: every completed action, then the
/// failing one if any. Actions after a failure are not attempted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchOutcome {
    pub results: Vec<ActionResult>,
}

impl DispatchOutcome {
    pub fn failed(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.status == ActionStatus::Failed)
    }
}

/// Executes actions through the provider, addressing targets via the
/// capability table.
pub struct ActionDispatcher {
    provider: Arc<dyn Provider>,
    capabilities: Arc<CapabilityTable>,
}

impl ActionDispatcher {
    pub fn new(provider: Arc<dyn Provider>, capabilities: Arc<CapabilityTable>) -> Self {
        Self {
            provider,
            capabilities,
        }
    }

    /// Capability entries whose operation the provider cannot invoke.
    pub fn unsupported_capabilities(&self) -> Vec<CapabilityEntry> {
        self.capabilities
            .entries()
            .filter(|entry| !self.provider.supports(&entry.service, &entry.api_call))
            .collect()
    }

    /// Execute one action and return its result without transport metadata.
    pub async fn dispatch(&self, action: &Action) -> Result<Value, DispatchError> {
        let key = self
            .capabilities
            .identifier_key(&action.service, &action.api_call)
            .ok_or_else(|| {
                DispatchError::Configuration(format!(
                    "no identifier parameter is configured for {}.{}",
                    action.service, action.api_call
                ))
            })?;
        if !self.provider.supports(&action.service, &action.api_call) {
            return Err(DispatchError::Configuration(format!(
                "provider has no operation {}.{}",
                action.service, action.api_call
            )));
        }

        let mut request = action.parameters.clone();
        request.insert(
            key.to_string(),
            Value::String(action.target_identifier.clone()),
        );

        tracing::info!(
            service = %action.service,
            api_call = %action.api_call,
            target = %action.target_identifier,
            "Executing remediation action"
        );
        let mut response = self
            .provider
            .invoke(&action.service, &action.api_call, request)
            .await
            .map_err(|source| DispatchError::Execution {
                action: action.to_string(),
                source,
            })?;

        if let Value::Object(map) = &mut response {
            map.remove(RESPONSE_METADATA);
        }
        Ok(response)
    }

    /// Execute actions in order, stopping at the first failure.
    pub async fn dispatch_all(&self, actions: &[Action]) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for action in actions {
            match self.dispatch(action).await {
                Ok(result) => outcome.results.push(ActionResult {
                    action: action.clone(),
                    status: ActionStatus::Success,
                    result: Some(result),
                    error: None,
                }),
                Err(e) => {
                    tracing::error!(
                        service = %action.service,
                        api_call = %action.api_call,
                        target = %action.target_identifier,
                        error = %e,
                        "Remediation action failed"
                    );
                    outcome.results.push(ActionResult {
                        action: action.clone(),
                        status: ActionStatus::Failed,
                        result: None,
                        error: Some(e.to_string()),
                    });
                    break;
                }
            }
        }

        outcome
    }
}
