use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf};

use crate::error::ServerError;

/// Environment variable naming the server configuration file.
pub const ENV_SERVER_CONFIG: &str = "ARGUS_SERVER_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "argus-server.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address, e.g. "0.0.0.0:8080"
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Path to `argus.yaml`. Relative paths resolve against the directory
    /// of the server configuration file.
    #[serde(default = "default_argus_config")]
    pub argus_config: PathBuf,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_argus_config() -> PathBuf {
    PathBuf::from("argus.yaml")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            argus_config: default_argus_config(),
        }
    }
}

impl AppConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ServerError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No server configuration file, using defaults");
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)?;
        let mut cfg: AppConfig = toml::from_str(&raw)?;
        if cfg.server.argus_config.is_relative() {
            if let Some(dir) = path.parent() {
                cfg.server.argus_config = dir.join(&cfg.server.argus_config);
            }
        }
        Ok(cfg)
    }
}

pub fn load_config() -> Result<AppConfig, ServerError> {
    AppConfig::from_file(&config_path())
}

fn config_path() -> PathBuf {
    if let Ok(p) = env::var(ENV_SERVER_CONFIG) {
        return PathBuf::from(p);
    }
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = AppConfig::from_file(Path::new("/nonexistent/argus-server.toml")).unwrap();
        assert_eq!(cfg.server.bind, "0.0.0.0:8080");
        assert_eq!(cfg.server.argus_config, PathBuf::from("argus.yaml"));
    }

    #[test]
    fn test_relative_argus_config_resolves_against_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("argus-server.toml");
        fs::write(
            &path,
            "[server]\nbind = \"127.0.0.1:9000\"\nargus_config = \"conf/argus.yaml\"\n",
        )
        .unwrap();

        let cfg = AppConfig::from_file(&path).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:9000");
        assert_eq!(cfg.server.argus_config, dir.path().join("conf/argus.yaml"));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("argus-server.toml");
        fs::write(&path, "[server\n").unwrap();
        assert!(AppConfig::from_file(&path).is_err());
    }
}
