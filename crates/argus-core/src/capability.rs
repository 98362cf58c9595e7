//! Capability table: which request parameter carries the target identifier
//! for a remediation `(service, apiCall)`.
//!
//! The table is configuration, not code. A YAML file extends or replaces the
//! built-in entries:
//!
//! ```yaml
//! capabilities:
//!   - service: ec2
//!     apiCall: modifyInstanceMetadataOptions
//!     identifierParameter: InstanceId
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::config::ConfigError;

/// One `(service, apiCall) -> identifierParameter` mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityEntry {
    pub service: String,
    pub api_call: String,
    pub identifier_parameter: String,
}

#[derive(Debug, Deserialize)]
struct CapabilityFile {
    #[serde(default)]
    capabilities: Vec<CapabilityEntry>,
}

/// Static lookup table used by the action dispatcher.
#[derive(Debug, Clone, Default)]
pub struct CapabilityTable {
    entries: BTreeMap<(String, String), String>,
}

impl CapabilityTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The remediation targets supported out of the box.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.insert("rds", "modifyDBInstance", "DBInstanceIdentifier");
        table.insert("s3", "putPublicAccessBlock", "Bucket");
        table
    }

    /// Build a table from entries. A `(service, apiCall)` listed twice with
    /// different keys is a configuration error.
    pub fn from_entries(
        entries: impl IntoIterator<Item = CapabilityEntry>,
    ) -> Result<Self, ConfigError> {
        let mut table = Self::new();
        table.extend(entries)?;
        Ok(table)
    }

    /// Load entries from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse entries from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let file: CapabilityFile = serde_yaml::from_str(content)?;
        Self::from_entries(file.capabilities)
    }

    /// Merge entries into this table. Entries replace existing mappings;
    /// within one batch a `(service, apiCall)` must map to a single key.
    pub fn extend(
        &mut self,
        entries: impl IntoIterator<Item = CapabilityEntry>,
    ) -> Result<(), ConfigError> {
        let mut added: BTreeMap<(String, String), String> = BTreeMap::new();
        for entry in entries {
            if entry.identifier_parameter.trim().is_empty() {
                return Err(ConfigError::Config(format!(
                    "capability {}.{} has an empty identifierParameter",
                    entry.service, entry.api_call
                )));
            }
            let key = (entry.service, entry.api_call);
            if let Some(existing) = added.get(&key) {
                if existing != &entry.identifier_parameter {
                    return Err(ConfigError::Config(format!(
                        "capability {}.{} declared with conflicting identifier parameters '{}' and '{}'",
                        key.0, key.1, existing, entry.identifier_parameter
                    )));
                }
            }
            added.insert(key, entry.identifier_parameter);
        }
        self.entries.extend(added);
        Ok(())
    }

    pub fn insert(
        &mut self,
        service: impl Into<String>,
        api_call: impl Into<String>,
        identifier_parameter: impl Into<String>,
    ) {
        self.entries.insert(
            (service.into(), api_call.into()),
            identifier_parameter.into(),
        );
    }

    /// The parameter key carrying the target identifier, if mapped.
    pub fn identifier_key(&self, service: &str, api_call: &str) -> Option<&str> {
        self.entries
            .get(&(service.to_string(), api_call.to_string()))
            .map(String::as_str)
    }

    /// Iterate all entries in `(service, apiCall)` order.
    pub fn entries(&self) -> impl Iterator<Item = CapabilityEntry> + '_ {
        self.entries
            .iter()
            .map(|((service, api_call), key)| CapabilityEntry {
                service: service.clone(),
                api_call: api_call.clone(),
                identifier_parameter: key.clone(),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
