//! Configuration types for Argus.
//!
//! The main configuration file (`argus.yaml`) points at the declarative
//! inputs of a run and names the account being audited.
//!
//! # Configuration Files
//!
//! - **argus.yaml**: account, manifest, policy, capabilities, notifications
//! - **controls.yaml**: the control manifest (see [`crate::manifest`])
//! - **remediation.rego** or **remediation.yaml**: the remediation rule set
//! - **capabilities.yaml**: optional capability table extensions
//!
//! Relative paths are resolved against the directory holding `argus.yaml`.

pub mod notifications;
pub mod policy;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::AccountContext;

pub use notifications::{NotificationConfig, SinkKind};
pub use policy::{PolicyConfig, PolicyKind};

/// Environment variable overriding `account.id`.
pub const ENV_ACCOUNT_ID: &str = "ARGUS_ACCOUNT_ID";
/// Environment variable overriding `account.region`.
pub const ENV_REGION: &str = "ARGUS_REGION";
/// Region fallback honoured when `ARGUS_REGION` is unset.
pub const ENV_AWS_REGION: &str = "AWS_REGION";

/// Complete Argus configuration loaded from `argus.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgusConfig {
    /// Project name.
    #[serde(default)]
    pub project: Option<String>,

    /// Account being audited.
    #[serde(default)]
    pub account: AccountConfig,

    /// Control manifest path.
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,

    /// Remediation rule set.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Capability table extensions (merged over the built-in table).
    #[serde(default)]
    pub capabilities: Option<PathBuf>,

    /// Where findings are published.
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Recorded provider responses to serve instead of a live provider.
    #[serde(default)]
    pub inventory: Option<PathBuf>,
}

impl Default for ArgusConfig {
    fn default() -> Self {
        Self {
            project: None,
            account: AccountConfig::default(),
            manifest: default_manifest(),
            policy: PolicyConfig::default(),
            capabilities: None,
            notifications: NotificationConfig::default(),
            inventory: None,
        }
    }
}

/// Account identity stamped into findings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccountConfig {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub region: Option<String>,
}

fn default_manifest() -> PathBuf {
    PathBuf::from("controls.yaml")
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ArgusConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// Load configuration, resolve relative paths against the file's
    /// directory and apply environment overrides.
    pub fn load_with_context(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = Self::from_file(path)?;

        let base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        config.resolve_paths(&base_dir);
        config.apply_overrides(|key| std::env::var(key).ok());

        Ok(config)
    }

    /// Make every configured path absolute relative to `base_dir`.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                base_dir.join(p)
            }
        };

        self.manifest = resolve(&self.manifest);
        self.policy.path = resolve(&self.policy.path);
        self.capabilities = self.capabilities.as_ref().map(resolve);
        self.inventory = self.inventory.as_ref().map(resolve);
        self.notifications.path = self.notifications.path.as_ref().map(resolve);
    }

    /// Apply account overrides from a variable lookup (the process
    /// environment in production). `AWS_REGION` only fills a missing region.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup(ENV_ACCOUNT_ID).filter(|v| !v.is_empty()) {
            self.account.id = Some(id);
        }
        if let Some(region) = lookup(ENV_REGION).filter(|v| !v.is_empty()) {
            self.account.region = Some(region);
        } else if self.account.region.is_none() {
            self.account.region = lookup(ENV_AWS_REGION).filter(|v| !v.is_empty());
        }
    }

    /// The account context for a detection run. Both the account ID and
    /// region are required.
    pub fn account_context(&self) -> Result<AccountContext, ConfigError> {
        let id = self.account.id.as_deref().ok_or_else(|| {
            ConfigError::Config(format!(
                "account.id is not configured (set it in argus.yaml or {})",
                ENV_ACCOUNT_ID
            ))
        })?;
        let region = self.account.region.as_deref().ok_or_else(|| {
            ConfigError::Config(format!(
                "account.region is not configured (set it in argus.yaml, {} or {})",
                ENV_REGION, ENV_AWS_REGION
            ))
        })?;
        Ok(AccountContext::new(id, region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ArgusConfig::from_yaml("project: audit").unwrap();
        assert_eq!(config.project.as_deref(), Some("audit"));
        assert_eq!(config.manifest, PathBuf::from("controls.yaml"));
        assert_eq!(config.policy.kind, PolicyKind::Rego);
        assert_eq!(config.policy.rule, "data.remediation.decision");
        assert_eq!(config.notifications.sink, SinkKind::Stdout);
        assert!(config.account_context().is_err());
    }

    #[test]
    fn test_resolve_paths() {
        let yaml = r#"
manifest: controls.yaml
policy:
  kind: rules
  path: /etc/argus/remediation.yaml
capabilities: caps/capabilities.yaml
inventory: snapshot.json
"#;
        let mut config = ArgusConfig::from_yaml(yaml).unwrap();
        config.resolve_paths(Path::new("/srv/argus"));

        assert_eq!(config.manifest, PathBuf::from("/srv/argus/controls.yaml"));
        assert_eq!(
            config.policy.path,
            PathBuf::from("/etc/argus/remediation.yaml")
        );
        assert_eq!(
            config.capabilities,
            Some(PathBuf::from("/srv/argus/caps/capabilities.yaml"))
        );
        assert_eq!(
            config.inventory,
            Some(PathBuf::from("/srv/argus/snapshot.json"))
        );
    }

    #[test]
    fn test_environment_overrides() {
        let yaml = r#"
account:
  id: "111111111111"
  region: us-east-1
"#;
        let mut config = ArgusConfig::from_yaml(yaml).unwrap();
        let env: HashMap<&str, &str> = [
            (ENV_ACCOUNT_ID, "222222222222"),
            (ENV_AWS_REGION, "eu-central-1"),
        ]
        .into_iter()
        .collect();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        let account = config.account_context().unwrap();
        assert_eq!(account.account_id, "222222222222");
        assert_eq!(account.region, "us-east-1");
    }

    #[test]
    fn test_aws_region_fills_missing_region() {
        let mut config = ArgusConfig::from_yaml("account: { id: \"111111111111\" }").unwrap();
        let env: HashMap<&str, &str> = [(ENV_AWS_REGION, "eu-central-1")].into_iter().collect();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.account.region.as_deref(), Some("eu-central-1"));

        let mut config = ArgusConfig::from_yaml("account: { region: us-east-1 }").unwrap();
        let env: HashMap<&str, &str> = [(ENV_REGION, "ap-south-1")].into_iter().collect();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.account.region.as_deref(), Some("ap-south-1"));
    }

    #[test]
    fn test_argus_region_wins_over_aws_region() {
        let mut config = ArgusConfig::default();
        let env: HashMap<&str, &str> = [
            (ENV_ACCOUNT_ID, "333333333333"),
            (ENV_REGION, "ap-south-1"),
            (ENV_AWS_REGION, "us-west-2"),
        ]
        .into_iter()
        .collect();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.account.region.as_deref(), Some("ap-south-1"));
    }

    #[test]
    fn test_load_with_context_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("argus.yaml");
        fs::write(
            &path,
            "account:\n  id: \"123456789012\"\n  region: eu-west-1\nmanifest: controls.yaml\n",
        )
        .unwrap();

        let config = ArgusConfig::load_with_context(&path).unwrap();
        assert_eq!(config.manifest, dir.path().join("controls.yaml"));
    }
}
