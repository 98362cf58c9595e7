use serde::{Deserialize, Serialize};
use std::fmt;

// Configuration types shared across all Argus crates
pub mod capability;
pub mod config;
pub mod manifest;

pub use capability::{CapabilityEntry, CapabilityTable};
pub use config::{
    AccountConfig, ArgusConfig, ConfigError, NotificationConfig, PolicyConfig, PolicyKind,
    SinkKind,
};
pub use manifest::{
    Control, ControlManifest, DetectionSpec, Evaluation, ParameterSource, SubCallParameter,
    SubCallSpec,
};

/// Placeholder identifier used when a record lacks its declared identifier field.
pub const UNKNOWN_RESOURCE: &str = "<unknown>";

/// Control severity, as declared in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    #[default]
    NonCompliant,
}

/// The account/region an evaluation runs against. Stamped into every finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountContext {
    pub account_id: String,
    pub region: String,
}

impl AccountContext {
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
        }
    }
}

/// One resource that failed one control.
///
/// Field names on the wire match the message format consumed by the
/// notification sink and accepted by the remediation endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "controlID")]
    pub control_id: String,

    #[serde(rename = "AccountId", default)]
    pub account_id: String,

    #[serde(rename = "Region", default)]
    pub region: String,

    #[serde(rename = "InstanceIdentifier")]
    pub resource_identifier: String,

    #[serde(rename = "FindingDescription", default)]
    pub description: String,

    #[serde(rename = "Status", default)]
    pub status: ComplianceStatus,

    #[serde(rename = "Severity", default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl Finding {
    /// Build a non-compliant finding for `resource_identifier` under `control`.
    pub fn non_compliant(
        control: &Control,
        account: &AccountContext,
        resource_identifier: impl Into<String>,
    ) -> Self {
        Self {
            control_id: control.control_id.clone(),
            account_id: account.account_id.clone(),
            region: account.region.clone(),
            resource_identifier: resource_identifier.into(),
            description: control.description.clone(),
            status: ComplianceStatus::NonCompliant,
            severity: Some(control.severity),
        }
    }

    /// Subject line used when publishing this finding.
    pub fn subject(&self, prefix: &str) -> String {
        format!("{}: {} - {}", prefix, self.control_id, self.resource_identifier)
    }
}

/// A single remediation step produced by a policy decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub service: String,
    pub api_call: String,
    pub target_identifier: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}({})",
            self.service, self.api_call, self.target_identifier
        )
    }
}
