//! Control evaluation.
//!
//! Controls are compiled once (predicates parsed, operations checked
//! against the provider) and then evaluated one after another. A control
//! that fails to enumerate is logged and skipped; the rest of the run
//! carries on.

use std::sync::Arc;

use argus_core::{
    AccountContext, ConfigError, Control, ControlManifest, Finding, UNKNOWN_RESOURCE,
};
use argus_policy::Predicate;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{CollectorError, PublishFailures};
use crate::notify::FindingSink;
use crate::provider::Provider;
use crate::resolver::resolve;
use crate::walker::{Collector, walk};

/// A control with its predicate parsed.
#[derive(Debug, Clone)]
pub struct CompiledControl {
    pub control: Control,
    pub predicate: Predicate,
}

impl CompiledControl {
    pub fn compile(control: Control) -> Result<Self, ConfigError> {
        let predicate = Predicate::parse(&control.detection.evaluation.expression)
            .map_err(|e| ConfigError::Config(format!("control '{}': {}", control.control_id, e)))?;
        Ok(Self { control, predicate })
    }

    pub fn id(&self) -> &str {
        &self.control.control_id
    }

    fn collector(&self) -> Collector<'_> {
        let detection = &self.control.detection;
        Collector {
            service: &detection.service,
            operation: &detection.list_operation,
            resource_list_field: &detection.resource_list_field,
        }
    }
}

/// The compiled controls of one manifest, in manifest order.
#[derive(Debug, Clone)]
pub struct ControlSet {
    controls: Vec<CompiledControl>,
}

impl ControlSet {
    /// Compile every control. Any unparseable expression fails the whole set.
    pub fn compile(manifest: &ControlManifest) -> Result<Self, ConfigError> {
        let controls = manifest
            .controls
            .iter()
            .cloned()
            .map(CompiledControl::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { controls })
    }

    /// Check that every list and sub-call operation is available.
    pub fn validate_against(&self, provider: &dyn Provider) -> Result<(), ConfigError> {
        for compiled in &self.controls {
            let detection = &compiled.control.detection;
            let mut operations = vec![detection.list_operation.as_str()];
            if let Some(sub_call) = &detection.sub_call {
                operations.push(sub_call.operation.as_str());
            }

            for operation in operations {
                if !provider.supports(&detection.service, operation) {
                    return Err(ConfigError::Config(format!(
                        "control '{}': provider has no operation {}.{}",
                        compiled.id(),
                        detection.service,
                        operation
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledControl> {
        self.controls.iter()
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}

fn identifier_of(record: &Value, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::String(_) | Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Evaluate one control against every resource it lists.
///
/// Sub-call failures drop the affected resource; enumeration failures fail
/// the whole control.
pub async fn evaluate_control(
    provider: &dyn Provider,
    compiled: &CompiledControl,
    account: &AccountContext,
) -> Result<Vec<Finding>, CollectorError> {
    let control = &compiled.control;
    let detection = &control.detection;
    let mut records = walk(provider, compiled.collector());
    let mut findings = Vec::new();

    while let Some(record) = records.try_next().await? {
        let Some(resource_id) = identifier_of(&record, &detection.resource_identifier_field) else {
            tracing::warn!(
                control_id = %control.control_id,
                field = %detection.resource_identifier_field,
                "Resource record has no identifier, treating as non-compliant"
            );
            findings.push(Finding::non_compliant(control, account, UNKNOWN_RESOURCE));
            continue;
        };

        let target = match &detection.sub_call {
            Some(sub_call) => {
                match resolve(provider, &detection.service, sub_call, &resource_id).await {
                    Ok(detail) => detail,
                    Err(e) => {
                        tracing::warn!(
                            control_id = %control.control_id,
                            resource_id = %resource_id,
                            error = %e,
                            "Sub-call failed, skipping resource"
                        );
                        continue;
                    }
                }
            }
            None => record,
        };

        if compiled.predicate.evaluate(&target) {
            tracing::debug!(
                control_id = %control.control_id,
                resource_id = %resource_id,
                "Resource is compliant"
            );
        } else {
            tracing::warn!(
                control_id = %control.control_id,
                resource_id = %resource_id,
                "Non-compliant resource found"
            );
            findings.push(Finding::non_compliant(control, account, resource_id));
        }
    }

    Ok(findings)
}

/// Result of evaluating one control during a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum ControlOutcome {
    Evaluated {
        #[serde(rename = "controlID")]
        control_id: String,
        findings: usize,
    },
    Failed {
        #[serde(rename = "controlID")]
        control_id: String,
        error: String,
    },
}

/// Evaluate every control, isolating failures per control.
pub async fn evaluate_all(
    provider: &dyn Provider,
    controls: &ControlSet,
    account: &AccountContext,
) -> (Vec<Finding>, Vec<ControlOutcome>) {
    let mut findings = Vec::new();
    let mut outcomes = Vec::with_capacity(controls.len());

    for compiled in controls.iter() {
        tracing::info!(control_id = %compiled.id(), "Evaluating control");
        match evaluate_control(provider, compiled, account).await {
            Ok(control_findings) => {
                outcomes.push(ControlOutcome::Evaluated {
                    control_id: compiled.id().to_string(),
                    findings: control_findings.len(),
                });
                findings.extend(control_findings);
            }
            Err(e) => {
                tracing::error!(
                    control_id = %compiled.id(),
                    error = %e,
                    "Control evaluation failed"
                );
                outcomes.push(ControlOutcome::Failed {
                    control_id: compiled.id().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    (findings, outcomes)
}

/// Summary of a detection run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: Uuid,
    pub account: AccountContext,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub controls: Vec<ControlOutcome>,
    pub findings: Vec<Finding>,
    pub published: usize,
    pub publish_failures: usize,
}

impl RunSummary {
    /// Controls that could not be evaluated.
    pub fn degraded_controls(&self) -> impl Iterator<Item = &str> {
        self.controls.iter().filter_map(|outcome| match outcome {
            ControlOutcome::Failed { control_id, .. } => Some(control_id.as_str()),
            ControlOutcome::Evaluated { .. } => None,
        })
    }

    /// Fails when any finding could not be published.
    pub fn into_result(self) -> Result<Self, PublishFailures> {
        if self.publish_failures == 0 {
            Ok(self)
        } else {
            Err(PublishFailures {
                failed: self.publish_failures,
                total: self.findings.len(),
            })
        }
    }
}

/// Evaluates a control set and publishes its findings.
pub struct DetectionRun {
    provider: Arc<dyn Provider>,
    sink: Arc<dyn FindingSink>,
    account: AccountContext,
}

impl DetectionRun {
    pub fn new(
        provider: Arc<dyn Provider>,
        sink: Arc<dyn FindingSink>,
        account: AccountContext,
    ) -> Self {
        Self {
            provider,
            sink,
            account,
        }
    }

    /// Evaluate all controls, then publish every finding. A publish failure
    /// is counted and the remaining findings are still published.
    pub async fn execute(&self, controls: &ControlSet) -> RunSummary {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(
            run_id = %run_id,
            account_id = %self.account.account_id,
            region = %self.account.region,
            controls = controls.len(),
            "Detection run started"
        );

        let (findings, outcomes) = evaluate_all(self.provider.as_ref(), controls, &self.account).await;

        let mut published = 0;
        let mut publish_failures = 0;
        for finding in &findings {
            match self.sink.publish(finding).await {
                Ok(message_id) => {
                    published += 1;
                    tracing::info!(
                        control_id = %finding.control_id,
                        resource_id = %finding.resource_identifier,
                        message_id = %message_id,
                        "Finding published"
                    );
                }
                Err(e) => {
                    publish_failures += 1;
                    tracing::error!(
                        control_id = %finding.control_id,
                        resource_id = %finding.resource_identifier,
                        error = %e,
                        "Failed to publish finding"
                    );
                }
            }
        }

        let summary = RunSummary {
            run_id,
            account: self.account.clone(),
            started_at,
            finished_at: Utc::now(),
            controls: outcomes,
            findings,
            published,
            publish_failures,
        };
        tracing::info!(
            run_id = %run_id,
            findings = summary.findings.len(),
            published,
            publish_failures,
            degraded = summary.degraded_controls().count(),
            "Detection run finished"
        );
        summary
    }
}
