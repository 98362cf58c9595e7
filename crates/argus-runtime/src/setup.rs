//! Assembling runtime components from an [`ArgusConfig`].

use std::sync::Arc;

use argus_core::{ArgusConfig, CapabilityTable, ConfigError};

use crate::dispatcher::ActionDispatcher;
use crate::provider::OperationRegistry;
use crate::remediation::{PolicyState, RemediationService};
use crate::snapshot::Snapshot;

/// The operation registry for this configuration. Without an inventory
/// snapshot the registry is empty.
pub fn build_registry(config: &ArgusConfig) -> Result<OperationRegistry, ConfigError> {
    let mut registry = OperationRegistry::new();
    match &config.inventory {
        Some(path) => {
            let snapshot = Snapshot::from_file(path).map_err(|e| {
                ConfigError::Config(format!("inventory snapshot {}: {}", path.display(), e))
            })?;
            snapshot.register_into(&mut registry);
            tracing::info!(
                path = %path.display(),
                operations = registry.len(),
                "Inventory snapshot loaded"
            );
        }
        None => {
            tracing::warn!("No inventory snapshot configured, provider has no operations");
        }
    }
    Ok(registry)
}

/// The built-in capability table extended with the configured file.
pub fn load_capabilities(config: &ArgusConfig) -> Result<CapabilityTable, ConfigError> {
    let mut table = CapabilityTable::builtin();
    if let Some(path) = &config.capabilities {
        let extra = CapabilityTable::from_file(path).map_err(|e| {
            ConfigError::Config(format!("capability table {}: {}", path.display(), e))
        })?;
        table.extend(extra.entries())?;
    }
    Ok(table)
}

/// Build the remediation service. The rule set is loaded here, once; if it
/// fails to load the service answers every request with an error.
pub fn remediation_service(
    config: &ArgusConfig,
    registry: Arc<OperationRegistry>,
) -> Result<RemediationService, ConfigError> {
    let capabilities = Arc::new(load_capabilities(config)?);
    let dispatcher = ActionDispatcher::new(registry, capabilities);

    for entry in dispatcher.unsupported_capabilities() {
        tracing::warn!(
            service = %entry.service,
            api_call = %entry.api_call,
            "Capability has no registered provider operation"
        );
    }

    Ok(RemediationService::new(
        PolicyState::load(&config.policy),
        dispatcher,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_capabilities_extend_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capabilities.yaml");
        fs::write(
            &path,
            "capabilities:\n  - service: kms\n    apiCall: enableKeyRotation\n    identifierParameter: KeyId\n",
        )
        .unwrap();

        let config = ArgusConfig {
            capabilities: Some(path),
            ..ArgusConfig::default()
        };
        let table = load_capabilities(&config).unwrap();
        assert_eq!(table.identifier_key("kms", "enableKeyRotation"), Some("KeyId"));
        assert_eq!(table.identifier_key("s3", "putPublicAccessBlock"), Some("Bucket"));
    }

    #[test]
    fn test_registry_without_snapshot_is_empty() {
        let registry = build_registry(&ArgusConfig::default()).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_missing_snapshot_is_an_error() {
        let config = ArgusConfig {
            inventory: Some("/nonexistent/snapshot.yaml".into()),
            ..ArgusConfig::default()
        };
        assert!(build_registry(&config).is_err());
    }
}
