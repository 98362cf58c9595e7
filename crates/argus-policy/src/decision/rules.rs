//! Ordered YAML rule sets.
//!
//! Rules are tried top to bottom and the first whose `match` block holds
//! for the finding supplies the actions:
//!
//! ```yaml
//! rules:
//!   - name: block-public-buckets
//!     match:
//!       controlID: S3-002
//!       Severity: [HIGH, CRITICAL]
//!     actions:
//!       - service: s3
//!         apiCall: putPublicAccessBlock
//!         parameters:
//!           PublicAccessBlockConfiguration:
//!             BlockPublicAcls: true
//! ```
//!
//! Match keys are top-level fields of the finding as it was received, so
//! fields outside the standard finding shape can be matched too. String
//! values in an action template may reference finding fields as `${Field}`.
//! `targetIdentifier` defaults to `${InstanceIdentifier}`.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use argus_core::Action;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{FindingDocument, PolicyEngine, field_str};
use crate::error::DecisionError;
use crate::predicate::values_equal;

static TEMPLATE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("template reference pattern is valid")
});

/// Rule set file layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSetFile {
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

/// One rule as written in YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,

    /// Field conditions, all of which must hold. An empty block matches
    /// every finding.
    #[serde(default, rename = "match")]
    pub conditions: BTreeMap<String, FieldCondition>,

    #[serde(default)]
    pub actions: Vec<ActionTemplate>,
}

/// Condition on one finding field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldCondition {
    /// Field must be one of these values.
    OneOf(Vec<Value>),

    /// Operator form.
    Operators(ConditionOperators),

    /// Field must equal this value.
    Equals(Value),
}

/// Operator form of a field condition. Every operator given must hold.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionOperators {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_equals: Option<Value>,

    #[serde(default, rename = "in", skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_in: Option<Vec<Value>>,

    /// Regex the field's string value must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<String>,

    /// Whether the field must be present (and non-null).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
}

/// Action with `${Field}` references still unresolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionTemplate {
    pub service: String,
    pub api_call: String,

    #[serde(default = "default_target_identifier")]
    pub target_identifier: String,

    #[serde(default)]
    pub parameters: Map<String, Value>,
}

fn default_target_identifier() -> String {
    "${InstanceIdentifier}".to_string()
}

#[derive(Debug)]
enum Check {
    Equals(Value),
    NotEquals(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Matches(Regex),
    Exists(bool),
}

impl Check {
    fn holds(&self, value: Option<&Value>) -> bool {
        let present = value.filter(|v| !v.is_null());
        match self {
            Check::Exists(expected) => present.is_some() == *expected,
            Check::Equals(expected) => present.is_some_and(|v| values_equal(v, expected)),
            Check::NotEquals(expected) => present.is_some_and(|v| !values_equal(v, expected)),
            Check::In(values) => present.is_some_and(|v| contains(values, v)),
            Check::NotIn(values) => present.is_some_and(|v| !contains(values, v)),
            Check::Matches(re) => present
                .and_then(Value::as_str)
                .is_some_and(|s| re.is_match(s)),
        }
    }
}

fn contains(values: &[Value], value: &Value) -> bool {
    values.iter().any(|candidate| values_equal(candidate, value))
}

#[derive(Debug)]
struct CompiledRule {
    name: String,
    checks: Vec<(String, Vec<Check>)>,
    actions: Vec<ActionTemplate>,
}

impl CompiledRule {
    fn compile(spec: RuleSpec) -> Result<Self, DecisionError> {
        let mut checks = Vec::with_capacity(spec.conditions.len());
        for (field, condition) in spec.conditions {
            checks.push((field.clone(), compile_condition(&spec.name, &field, condition)?));
        }

        for template in &spec.actions {
            validate_template(&spec.name, template)?;
        }

        Ok(Self {
            name: spec.name,
            checks,
            actions: spec.actions,
        })
    }

    fn matches(&self, finding: &FindingDocument) -> bool {
        self.checks.iter().all(|(field, checks)| {
            let value = finding.get(field);
            checks.iter().all(|check| check.holds(value))
        })
    }
}

fn compile_condition(
    rule: &str,
    field: &str,
    condition: FieldCondition,
) -> Result<Vec<Check>, DecisionError> {
    let ops = match condition {
        FieldCondition::OneOf(values) => return Ok(vec![Check::In(values)]),
        FieldCondition::Equals(value) => return Ok(vec![Check::Equals(value)]),
        FieldCondition::Operators(ops) => ops,
    };

    let mut checks = Vec::new();
    if let Some(value) = ops.equals {
        checks.push(Check::Equals(value));
    }
    if let Some(value) = ops.not_equals {
        checks.push(Check::NotEquals(value));
    }
    if let Some(values) = ops.one_of {
        checks.push(Check::In(values));
    }
    if let Some(values) = ops.not_in {
        checks.push(Check::NotIn(values));
    }
    if let Some(pattern) = ops.matches {
        let re = Regex::new(&pattern).map_err(|e| {
            DecisionError::InvalidRuleSet(format!(
                "rule '{}': invalid pattern for '{}': {}",
                rule, field, e
            ))
        })?;
        checks.push(Check::Matches(re));
    }
    if let Some(expected) = ops.exists {
        checks.push(Check::Exists(expected));
    }
    Ok(checks)
}

fn validate_template(rule: &str, template: &ActionTemplate) -> Result<(), DecisionError> {
    if template.service.trim().is_empty() || template.api_call.trim().is_empty() {
        return Err(DecisionError::InvalidRuleSet(format!(
            "rule '{}': actions need a service and an apiCall",
            rule
        )));
    }
    if template.target_identifier.trim().is_empty() {
        return Err(DecisionError::InvalidRuleSet(format!(
            "rule '{}': targetIdentifier must not be empty",
            rule
        )));
    }
    Ok(())
}

/// Replace every `${Field}` in `template` with the finding's value.
fn render_str(template: &str, finding: &FindingDocument) -> Result<String, DecisionError> {
    let mut missing = None;
    let rendered = TEMPLATE_REF.replace_all(template, |caps: &regex::Captures<'_>| {
        match finding.get(&caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => {
                missing.get_or_insert_with(|| caps[1].to_string());
                String::new()
            }
            Some(other) => other.to_string(),
        }
    });

    match missing {
        Some(field) => Err(DecisionError::Evaluation(format!(
            "finding has no value for '{}'",
            field
        ))),
        None => Ok(rendered.into_owned()),
    }
}

fn render_value(value: &Value, finding: &FindingDocument) -> Result<Value, DecisionError> {
    Ok(match value {
        Value::String(s) => Value::String(render_str(s, finding)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| render_value(v, finding))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), render_value(v, finding)?)))
                .collect::<Result<_, DecisionError>>()?,
        ),
        other => other.clone(),
    })
}

impl ActionTemplate {
    fn render(&self, finding: &FindingDocument) -> Result<Action, DecisionError> {
        let parameters = self
            .parameters
            .iter()
            .map(|(k, v)| Ok((k.clone(), render_value(v, finding)?)))
            .collect::<Result<Map<String, Value>, DecisionError>>()?;

        Ok(Action {
            service: self.service.clone(),
            api_call: self.api_call.clone(),
            target_identifier: render_str(&self.target_identifier, finding)?,
            parameters,
        })
    }
}

/// First-match YAML rule set.
#[derive(Debug)]
pub struct RuleSetPolicy {
    rules: Vec<CompiledRule>,
}

impl RuleSetPolicy {
    /// Load a rule set from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DecisionError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| DecisionError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a rule set from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, DecisionError> {
        let file: RuleSetFile = serde_yaml::from_str(content)
            .map_err(|e| DecisionError::InvalidRuleSet(e.to_string()))?;
        Self::new(file.rules)
    }

    /// Compile rules in evaluation order.
    pub fn new(rules: Vec<RuleSpec>) -> Result<Self, DecisionError> {
        let mut names = HashSet::new();
        for rule in &rules {
            if rule.name.trim().is_empty() {
                return Err(DecisionError::InvalidRuleSet(
                    "rule with empty name".to_string(),
                ));
            }
            if !names.insert(rule.name.clone()) {
                return Err(DecisionError::InvalidRuleSet(format!(
                    "duplicate rule name '{}'",
                    rule.name
                )));
            }
        }

        let rules = rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[async_trait]
impl PolicyEngine for RuleSetPolicy {
    async fn decide(&self, finding: &FindingDocument) -> Result<Vec<Action>, DecisionError> {
        let control_id = field_str(finding, "controlID");
        let resource = field_str(finding, "InstanceIdentifier");

        let Some(rule) = self.rules.iter().find(|rule| rule.matches(finding)) else {
            tracing::debug!(control_id, resource, "No remediation rule matched");
            return Ok(Vec::new());
        };

        tracing::debug!(rule = %rule.name, control_id, resource, "Remediation rule matched");
        rule.actions.iter().map(|t| t.render(finding)).collect()
    }

    fn name(&self) -> &str {
        "rules"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RULES: &str = r#"
rules:
  - name: block-public-buckets
    match:
      controlID: S3-002
    actions:
      - service: s3
        apiCall: putPublicAccessBlock
        parameters:
          PublicAccessBlockConfiguration:
            BlockPublicAcls: true
            IgnorePublicAcls: true
            BlockPublicPolicy: true
            RestrictPublicBuckets: true
  - name: enable-rds-backups
    match:
      controlID:
        matches: "^RDS-00[1-3]$"
      Severity: [HIGH, CRITICAL]
    actions:
      - service: rds
        apiCall: modifyDBInstance
        parameters:
          BackupRetentionPeriod: 7
          ApplyImmediately: true
          Tags:
            - Key: remediated-by
              Value: "argus/${controlID}"
  - name: catch-all-rds
    match:
      controlID:
        matches: "^RDS-"
    actions: []
"#;

    fn document(value: Value) -> FindingDocument {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {}", other),
        }
    }

    fn finding(control_id: &str, resource: &str, severity: Option<&str>) -> FindingDocument {
        let mut doc = document(json!({
            "controlID": control_id,
            "AccountId": "123456789012",
            "Region": "us-east-1",
            "InstanceIdentifier": resource,
            "Status": "NON_COMPLIANT",
        }));
        if let Some(severity) = severity {
            doc.insert("Severity".to_string(), json!(severity));
        }
        doc
    }

    #[tokio::test]
    async fn test_first_matching_rule_supplies_actions() {
        let policy = RuleSetPolicy::from_yaml(RULES).unwrap();
        assert_eq!(policy.len(), 3);

        let actions = policy
            .decide(&finding("S3-002", "public-bucket", None))
            .await
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].api_call, "putPublicAccessBlock");
        assert_eq!(actions[0].target_identifier, "public-bucket");
        assert_eq!(
            actions[0].parameters["PublicAccessBlockConfiguration"]["RestrictPublicBuckets"],
            json!(true)
        );
    }

    #[tokio::test]
    async fn test_templates_render_nested_parameters() {
        let policy = RuleSetPolicy::from_yaml(RULES).unwrap();
        let actions = policy
            .decide(&finding("RDS-001", "db-prod", Some("HIGH")))
            .await
            .unwrap();

        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].target_identifier, "db-prod");
        assert_eq!(actions[0].parameters["BackupRetentionPeriod"], json!(7));
        assert_eq!(
            actions[0].parameters["Tags"][0]["Value"],
            json!("argus/RDS-001")
        );
    }

    #[tokio::test]
    async fn test_earlier_rule_shadows_later_ones() {
        let policy = RuleSetPolicy::from_yaml(RULES).unwrap();

        // Severity LOW skips the backup rule and lands on the catch-all.
        let actions = policy
            .decide(&finding("RDS-002", "db-dev", Some("LOW")))
            .await
            .unwrap();
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn test_no_match_is_empty() {
        let policy = RuleSetPolicy::from_yaml(RULES).unwrap();
        let actions = policy
            .decide(&finding("EC2-001", "i-0abc", None))
            .await
            .unwrap();
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn test_operator_conditions() {
        let yaml = r#"
rules:
  - name: prod-only
    match:
      Region:
        in: [us-east-1, eu-west-1]
        not_equals: eu-west-1
      Severity:
        exists: false
    actions:
      - service: ec2
        apiCall: stopInstances
        targetIdentifier: "${AccountId}/${InstanceIdentifier}"
"#;
        let policy = RuleSetPolicy::from_yaml(yaml).unwrap();

        let actions = policy
            .decide(&finding("EC2-001", "i-1", None))
            .await
            .unwrap();
        assert_eq!(actions[0].target_identifier, "123456789012/i-1");

        let actions = policy
            .decide(&finding("EC2-001", "i-1", Some("LOW")))
            .await
            .unwrap();
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn test_empty_match_block_is_catch_all() {
        let yaml = r#"
rules:
  - name: everything
    actions:
      - service: s3
        apiCall: putPublicAccessBlock
        targetIdentifier: fixed-bucket
"#;
        let policy = RuleSetPolicy::from_yaml(yaml).unwrap();
        let actions = policy
            .decide(&finding("ANY-1", "resource", None))
            .await
            .unwrap();
        assert_eq!(actions[0].target_identifier, "fixed-bucket");
    }

    #[tokio::test]
    async fn test_absent_template_field_is_an_error() {
        let yaml = r#"
rules:
  - name: severity-tag
    actions:
      - service: s3
        apiCall: putBucketTagging
        parameters:
          Tag: "${Severity}"
"#;
        let policy = RuleSetPolicy::from_yaml(yaml).unwrap();
        let result = policy.decide(&finding("S3-001", "b", None)).await;
        assert!(matches!(result, Err(DecisionError::Evaluation(_))));
    }

    #[tokio::test]
    async fn test_rules_see_fields_beyond_the_finding_model() {
        let yaml = r#"
rules:
  - name: prod-buckets
    match:
      controlID: S3-002
      Environment: prod
    actions:
      - service: s3
        apiCall: putPublicAccessBlock
        parameters:
          ExpectedBucketOwner: "${Owner}"
"#;
        let policy = RuleSetPolicy::from_yaml(yaml).unwrap();

        let prod = document(json!({
            "controlID": "S3-002",
            "InstanceIdentifier": "my-bucket",
            "Environment": "prod",
            "Owner": "111122223333",
        }));
        let actions = policy.decide(&prod).await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].target_identifier, "my-bucket");
        assert_eq!(actions[0].parameters["ExpectedBucketOwner"], json!("111122223333"));

        let untagged = document(json!({
            "controlID": "S3-002",
            "InstanceIdentifier": "my-bucket",
        }));
        assert!(policy.decide(&untagged).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_numbers_match_by_value() {
        let yaml = r#"
rules:
  - name: retention
    match:
      RetentionDays: 1
      Tier:
        in: [2, 3]
    actions:
      - service: rds
        apiCall: modifyDBInstance
"#;
        let policy = RuleSetPolicy::from_yaml(yaml).unwrap();

        let doc = document(json!({
            "controlID": "RDS-001",
            "InstanceIdentifier": "db-1",
            "RetentionDays": 1.0,
            "Tier": 3.0,
        }));
        assert_eq!(policy.decide(&doc).await.unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_rule_sets_are_rejected() {
        let bad_regex = "rules:\n  - name: r\n    match:\n      controlID:\n        matches: \"(\"\n";
        assert!(RuleSetPolicy::from_yaml(bad_regex).is_err());

        let no_api_call = "rules:\n  - name: r\n    actions:\n      - service: s3\n        apiCall: \"\"\n";
        assert!(RuleSetPolicy::from_yaml(no_api_call).is_err());

        let duplicate = "rules:\n  - name: r\n  - name: r\n";
        assert!(RuleSetPolicy::from_yaml(duplicate).is_err());
    }

    #[test]
    fn test_empty_rule_set_is_valid() {
        let policy = RuleSetPolicy::from_yaml("rules: []").unwrap();
        assert!(policy.is_empty());
    }
}
