//! `argus serve` command implementation.

use anyhow::{Context, Result};
use std::path::Path;

use argus_server::AppConfig;

pub async fn run(config_path: &Path, bind: Option<String>) -> Result<()> {
    let mut cfg = AppConfig::from_file(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    if let Some(bind) = bind {
        cfg.server.bind = bind;
    }

    tracing::info!(
        bind = %cfg.server.bind,
        argus_config = %cfg.server.argus_config.display(),
        "Starting remediation server"
    );
    argus_server::serve(cfg).await
}
