//! Remediation rule set configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which decision engine evaluates the rule set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// A Rego module.
    #[default]
    Rego,
    /// An ordered YAML rule list, first match wins.
    Rules,
}

/// Configuration for the remediation rule set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub kind: PolicyKind,

    /// Rule set file.
    #[serde(default = "default_policy_path")]
    pub path: PathBuf,

    /// Rego rule holding the decision (ignored for `rules`).
    #[serde(default = "default_rule")]
    pub rule: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            kind: PolicyKind::default(),
            path: default_policy_path(),
            rule: default_rule(),
        }
    }
}

fn default_policy_path() -> PathBuf {
    PathBuf::from("remediation.rego")
}

fn default_rule() -> String {
    "data.remediation.decision".to_string()
}
