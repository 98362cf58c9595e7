//! Remediation requests: finding in, decision, dispatch, response out.

use std::sync::Arc;

use argus_core::{Finding, PolicyConfig};
use argus_policy::{PolicyEngine, load_policy};
use serde_json::{Value, json};

use crate::dispatcher::ActionDispatcher;

pub const MSG_POLICY_UNAVAILABLE: &str = "Remediation policy is not loaded, cannot proceed.";
pub const MSG_EMPTY_BODY: &str = "Request body must contain a valid JSON finding.";
pub const MSG_INVALID_JSON: &str = "Invalid JSON in request body.";
pub const MSG_NO_ACTIONS: &str = "No remediation action defined for this finding.";
pub const MSG_ACTIONS_FAILED: &str = "One or more remediation actions failed.";
pub const MSG_SUCCESS: &str = "Remediation executed successfully.";
pub const MSG_INTERNAL: &str = "An internal server error occurred.";

/// Whether the remediation rule set loaded. Decided once at startup.
#[derive(Clone)]
pub enum PolicyState {
    Ready(Arc<dyn PolicyEngine>),
    Unavailable { reason: String },
}

impl PolicyState {
    /// Load the configured rule set. A failure leaves remediation
    /// unavailable for the lifetime of the process.
    pub fn load(config: &PolicyConfig) -> Self {
        match load_policy(config) {
            Ok(engine) => PolicyState::Ready(engine),
            Err(e) => {
                tracing::error!(
                    path = %config.path.display(),
                    error = %e,
                    "Failed to load remediation rule set"
                );
                PolicyState::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, PolicyState::Ready(_))
    }
}

impl std::fmt::Debug for PolicyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyState::Ready(engine) => f.debug_tuple("Ready").field(&engine.name()).finish(),
            PolicyState::Unavailable { reason } => f
                .debug_struct("Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

/// HTTP-shaped result of a remediation request.
#[derive(Debug, Clone, PartialEq)]
pub struct RemediationResponse {
    pub status: u16,
    pub body: Value,
}

impl RemediationResponse {
    fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    fn error(status: u16, message: &str) -> Self {
        Self::new(status, json!({ "error": message }))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Evaluates findings against the rule set and executes the resulting actions.
pub struct RemediationService {
    policy: PolicyState,
    dispatcher: ActionDispatcher,
}

impl RemediationService {
    pub fn new(policy: PolicyState, dispatcher: ActionDispatcher) -> Self {
        Self { policy, dispatcher }
    }

    pub fn policy(&self) -> &PolicyState {
        &self.policy
    }

    /// Handle a raw request body.
    pub async fn handle(&self, body: &[u8]) -> RemediationResponse {
        let engine = match &self.policy {
            PolicyState::Ready(engine) => engine,
            PolicyState::Unavailable { reason } => {
                tracing::error!(reason = %reason, "Remediation requested while rule set is unavailable");
                return RemediationResponse::error(500, MSG_POLICY_UNAVAILABLE);
            }
        };

        if body.iter().all(u8::is_ascii_whitespace) {
            tracing::warn!("Request body is empty");
            return RemediationResponse::error(400, MSG_EMPTY_BODY);
        }

        let raw: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "Failed to parse JSON body");
                return RemediationResponse::error(400, MSG_INVALID_JSON);
            }
        };
        let document = match &raw {
            Value::Object(map) if !map.is_empty() => map,
            _ => {
                tracing::warn!("Request body is not a finding object");
                return RemediationResponse::error(400, MSG_EMPTY_BODY);
            }
        };

        // Validated as a Finding; rule sets see the document as sent.
        let finding: Finding = match serde_json::from_value(raw.clone()) {
            Ok(finding) => finding,
            Err(e) => {
                tracing::warn!(error = %e, "Request body is not a valid finding");
                return RemediationResponse::error(
                    400,
                    &format!("Request body is not a valid finding: {}", e),
                );
            }
        };

        tracing::info!(
            control_id = %finding.control_id,
            resource_id = %finding.resource_identifier,
            "Received finding for evaluation"
        );

        let actions = match engine.decide(document).await {
            Ok(actions) => actions,
            Err(e) => {
                tracing::error!(
                    control_id = %finding.control_id,
                    error = %e,
                    "Remediation decision failed"
                );
                return RemediationResponse::error(500, MSG_INTERNAL);
            }
        };

        if actions.is_empty() {
            tracing::info!(control_id = %finding.control_id, "No matching remediation action");
            return RemediationResponse::new(
                200,
                json!({ "message": MSG_NO_ACTIONS, "finding": raw }),
            );
        }

        let outcome = self.dispatcher.dispatch_all(&actions).await;
        if outcome.failed() {
            return RemediationResponse::new(
                500,
                json!({ "message": MSG_ACTIONS_FAILED, "results": outcome.results }),
            );
        }

        tracing::info!(
            control_id = %finding.control_id,
            actions = outcome.results.len(),
            "All remediation actions executed successfully"
        );
        RemediationResponse::new(
            200,
            json!({ "message": MSG_SUCCESS, "results": outcome.results }),
        )
    }
}
