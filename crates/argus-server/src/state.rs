use std::sync::Arc;

use argus_core::ArgusConfig;
use argus_runtime::RemediationService;
use argus_runtime::setup::{build_registry, remediation_service};

use crate::config::AppConfig;
use crate::error::ServerError;

/// Shared application state, built once at startup.
pub struct AppState {
    pub remediation: RemediationService,
}

impl AppState {
    pub fn init(cfg: &AppConfig) -> Result<Self, ServerError> {
        let argus = ArgusConfig::load_with_context(&cfg.server.argus_config)?;
        let registry = Arc::new(build_registry(&argus)?);
        let remediation = remediation_service(&argus, registry)?;

        if !remediation.policy().is_ready() {
            tracing::error!("Remediation rule set failed to load, every request will be rejected");
        }

        Ok(Self::new(remediation))
    }

    pub fn new(remediation: RemediationService) -> Self {
        Self { remediation }
    }
}
