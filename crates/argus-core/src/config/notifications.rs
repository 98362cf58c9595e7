//! Finding notification configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Notification sink type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// One JSON line per finding on stdout.
    #[default]
    Stdout,
    /// Append JSON lines to `path`.
    File,
    /// Discard findings (dry runs).
    None,
}

/// Configuration for publishing findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub sink: SinkKind,

    /// File path (for file sink).
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Prefix of the message subject.
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::default(),
            path: None,
            subject_prefix: default_subject_prefix(),
        }
    }
}

fn default_subject_prefix() -> String {
    "Argus-Watch Finding".to_string()
}
