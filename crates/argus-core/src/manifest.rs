//! Control manifest types.
//!
//! A manifest is a YAML document listing the controls a detection run
//! evaluates. Each control pairs a collector (service, list operation and the
//! page field holding the resources) with a predicate expression.
//!
//! # Example
//!
//! ```yaml
//! controls:
//!   - controlID: RDS-001
//!     description: RDS instance does not have automated backups enabled.
//!     severity: HIGH
//!     detection:
//!       service: rds
//!       listOperation: describeDBInstances
//!       resourceListField: DBInstances
//!       resourceIdentifierField: DBInstanceIdentifier
//!       evaluation:
//!         expression: BackupRetentionPeriod > 0
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::Severity;
use crate::config::ConfigError;

/// The set of controls loaded for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlManifest {
    /// Manifest version (free-form).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    pub controls: Vec<Control>,
}

impl ControlManifest {
    /// Load and validate a manifest from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a manifest from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let manifest: Self = serde_yaml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Structural validation. Expressions are compiled separately by the
    /// runtime, which owns the predicate language.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.controls.is_empty() {
            return Err(ConfigError::Config(
                "control manifest contains no controls".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for control in &self.controls {
            if control.control_id.trim().is_empty() {
                return Err(ConfigError::Config(
                    "control with empty controlID".to_string(),
                ));
            }
            if !seen.insert(control.control_id.as_str()) {
                return Err(ConfigError::Config(format!(
                    "duplicate controlID '{}'",
                    control.control_id
                )));
            }
            control.detection.validate(&control.control_id)?;
        }

        Ok(())
    }

    /// Get a control by ID.
    pub fn get(&self, control_id: &str) -> Option<&Control> {
        self.controls.iter().find(|c| c.control_id == control_id)
    }
}

/// One declarative compliance rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Control {
    #[serde(rename = "controlID")]
    pub control_id: String,

    pub description: String,

    pub severity: Severity,

    pub detection: DetectionSpec,
}

/// How to enumerate resources for a control and what to evaluate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionSpec {
    /// Provider service name (e.g., "rds", "s3").
    pub service: String,

    /// Paginated list operation on the service.
    #[serde(alias = "listMethod")]
    pub list_operation: String,

    /// Field in each page holding the resource list.
    pub resource_list_field: String,

    /// Field in each resource record holding its identifier.
    #[serde(alias = "resourceIdentifier")]
    pub resource_identifier_field: String,

    /// Optional per-resource detail fetch. When present its result replaces
    /// the record as the predicate input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_call: Option<SubCallSpec>,

    pub evaluation: Evaluation,
}

impl DetectionSpec {
    fn validate(&self, control_id: &str) -> Result<(), ConfigError> {
        let required = [
            ("service", &self.service),
            ("listOperation", &self.list_operation),
            ("resourceListField", &self.resource_list_field),
            ("resourceIdentifierField", &self.resource_identifier_field),
            ("evaluation.expression", &self.evaluation.expression),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Config(format!(
                    "control '{}': detection.{} must not be empty",
                    control_id, field
                )));
            }
        }

        if let Some(sub_call) = &self.sub_call {
            if sub_call.operation.trim().is_empty() {
                return Err(ConfigError::Config(format!(
                    "control '{}': subCall.operation must not be empty",
                    control_id
                )));
            }
            let mut names = HashSet::new();
            for param in &sub_call.parameters {
                if !names.insert(param.name.as_str()) {
                    return Err(ConfigError::Config(format!(
                        "control '{}': subCall parameter '{}' declared twice",
                        control_id, param.name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Compliance predicate for a control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub expression: String,
}

/// Secondary per-resource fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubCallSpec {
    /// Operation on the same service as the collector.
    #[serde(alias = "method")]
    pub operation: String,

    /// Parameters, bound in declaration order.
    #[serde(default)]
    pub parameters: Vec<SubCallParameter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubCallParameter {
    pub name: String,
    pub source: ParameterSource,
}

/// Where a sub-call parameter takes its value from.
///
/// Only the resource's own identifier is supported; anything else is
/// rejected when the manifest is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ParameterSource {
    ResourceIdentifier,
}

impl TryFrom<String> for ParameterSource {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "RESOURCE_IDENTIFIER" | "resourceIdentifier" => Ok(ParameterSource::ResourceIdentifier),
            other => Err(format!(
                "unsupported sub-call parameter source '{}' (only RESOURCE_IDENTIFIER is supported)",
                other
            )),
        }
    }
}

impl From<ParameterSource> for String {
    fn from(source: ParameterSource) -> Self {
        match source {
            ParameterSource::ResourceIdentifier => "RESOURCE_IDENTIFIER".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
controls:
  - controlID: RDS-001
    description: RDS instance does not have automated backups enabled.
    severity: HIGH
    detection:
      service: rds
      listOperation: describeDBInstances
      resourceListField: DBInstances
      resourceIdentifierField: DBInstanceIdentifier
      evaluation:
        expression: BackupRetentionPeriod > 0
  - controlID: S3-001
    description: S3 bucket has no default encryption.
    severity: MEDIUM
    detection:
      service: s3
      listOperation: listBuckets
      resourceListField: Buckets
      resourceIdentifierField: Name
      subCall:
        operation: getBucketEncryption
        parameters:
          - name: Bucket
            source: RESOURCE_IDENTIFIER
      evaluation:
        expression: exists(ServerSideEncryptionConfiguration.Rules)
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = ControlManifest::from_yaml(MANIFEST).unwrap();
        assert_eq!(manifest.controls.len(), 2);

        let rds = manifest.get("RDS-001").unwrap();
        assert_eq!(rds.severity, Severity::High);
        assert_eq!(rds.detection.resource_list_field, "DBInstances");
        assert!(rds.detection.sub_call.is_none());

        let s3 = manifest.get("S3-001").unwrap();
        let sub_call = s3.detection.sub_call.as_ref().unwrap();
        assert_eq!(sub_call.operation, "getBucketEncryption");
        assert_eq!(sub_call.parameters[0].name, "Bucket");
        assert_eq!(
            sub_call.parameters[0].source,
            ParameterSource::ResourceIdentifier
        );
    }

    #[test]
    fn test_legacy_field_names_are_accepted() {
        let yaml = r#"
controls:
  - controlID: S3-001
    description: encryption
    severity: LOW
    detection:
      service: s3
      listMethod: list_buckets
      resourceListField: Buckets
      resourceIdentifier: Name
      subCall:
        method: get_bucket_encryption
        parameters:
          - name: Bucket
            source: resourceIdentifier
      evaluation:
        expression: exists(ServerSideEncryptionConfiguration)
"#;
        let manifest = ControlManifest::from_yaml(yaml).unwrap();
        let detection = &manifest.controls[0].detection;
        assert_eq!(detection.list_operation, "list_buckets");
        assert_eq!(detection.resource_identifier_field, "Name");
        assert_eq!(
            detection.sub_call.as_ref().unwrap().operation,
            "get_bucket_encryption"
        );
    }

    #[test]
    fn test_unsupported_parameter_source_is_rejected() {
        let yaml = MANIFEST.replace("source: RESOURCE_IDENTIFIER", "source: LITERAL");
        let err = ControlManifest::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("unsupported sub-call parameter source"));
    }

    #[test]
    fn test_missing_resource_list_field_is_rejected() {
        let yaml = MANIFEST.replace("      resourceListField: DBInstances\n", "");
        assert!(ControlManifest::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_duplicate_control_ids_are_rejected() {
        let yaml = MANIFEST.replace("S3-001", "RDS-001");
        let err = ControlManifest::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate controlID"));
    }

    #[test]
    fn test_empty_manifest_is_rejected() {
        assert!(ControlManifest::from_yaml("controls: []").is_err());
    }

    #[test]
    fn test_empty_expression_is_rejected() {
        let yaml = MANIFEST.replace("expression: BackupRetentionPeriod > 0", "expression: \"\"");
        let err = ControlManifest::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("evaluation.expression"));
    }
}
