//! Finding notification sinks.

use std::io::Write;
use std::path::{Path, PathBuf};

use argus_core::{Finding, NotificationConfig, SinkKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::NotificationError;

/// A published finding as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindingMessage {
    pub message_id: Uuid,
    pub subject: String,
    pub published_at: DateTime<Utc>,
    pub message: Finding,
}

impl FindingMessage {
    pub fn new(finding: &Finding, subject_prefix: &str) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            subject: finding.subject(subject_prefix),
            published_at: Utc::now(),
            message: finding.clone(),
        }
    }
}

/// Destination for findings produced by a detection run.
#[async_trait]
pub trait FindingSink: Send + Sync {
    /// Publish one finding, returning its message id.
    async fn publish(&self, finding: &Finding) -> Result<Uuid, NotificationError>;
}

/// Create a sink from configuration.
pub fn create_sink(config: &NotificationConfig) -> Result<Box<dyn FindingSink>, NotificationError> {
    let prefix = config.subject_prefix.clone();
    match config.sink {
        SinkKind::Stdout => Ok(Box::new(StdoutSink::new(prefix))),
        SinkKind::File => {
            let path = config
                .path
                .clone()
                .unwrap_or_else(|| PathBuf::from("findings.jsonl"));
            Ok(Box::new(FileSink::new(path, prefix)))
        }
        SinkKind::None => Ok(Box::new(NullSink)),
    }
}

/// Prints one JSON message per line on stdout.
pub struct StdoutSink {
    subject_prefix: String,
}

impl StdoutSink {
    pub fn new(subject_prefix: impl Into<String>) -> Self {
        Self {
            subject_prefix: subject_prefix.into(),
        }
    }
}

#[async_trait]
impl FindingSink for StdoutSink {
    async fn publish(&self, finding: &Finding) -> Result<Uuid, NotificationError> {
        let message = FindingMessage::new(finding, &self.subject_prefix);
        let json = serde_json::to_string(&message)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", json)?;
        Ok(message.message_id)
    }
}

/// Appends JSON messages to a file.
pub struct FileSink {
    path: PathBuf,
    subject_prefix: String,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>, subject_prefix: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            subject_prefix: subject_prefix.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FindingSink for FileSink {
    async fn publish(&self, finding: &Finding) -> Result<Uuid, NotificationError> {
        let message = FindingMessage::new(finding, &self.subject_prefix);
        let json = serde_json::to_string(&message)?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", json)?;

        Ok(message.message_id)
    }
}

/// Discards findings.
pub struct NullSink;

#[async_trait]
impl FindingSink for NullSink {
    async fn publish(&self, finding: &Finding) -> Result<Uuid, NotificationError> {
        tracing::debug!(
            control_id = %finding.control_id,
            resource_id = %finding.resource_identifier,
            "Finding discarded"
        );
        Ok(Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::{ComplianceStatus, Severity};

    fn finding(resource: &str) -> Finding {
        Finding {
            control_id: "RDS-001".to_string(),
            account_id: "123456789012".to_string(),
            region: "us-east-1".to_string(),
            resource_identifier: resource.to_string(),
            description: "RDS instance does not have automated backups enabled.".to_string(),
            status: ComplianceStatus::NonCompliant,
            severity: Some(Severity::High),
        }
    }

    #[tokio::test]
    async fn test_file_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("findings.jsonl"), "Argus-Watch Finding");

        let first = sink.publish(&finding("db-1")).await.unwrap();
        let second = sink.publish(&finding("db-2")).await.unwrap();
        assert_ne!(first, second);

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let messages: Vec<FindingMessage> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message_id, first);
        assert_eq!(messages[0].subject, "Argus-Watch Finding: RDS-001 - db-1");
        assert_eq!(messages[1].message.resource_identifier, "db-2");
    }

    #[tokio::test]
    async fn test_file_sink_reports_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("missing").join("findings.jsonl"), "x");
        let err = sink.publish(&finding("db-1")).await.unwrap_err();
        assert!(matches!(err, NotificationError::Io(_)));
    }

    #[test]
    fn test_create_sink_defaults() {
        let config = NotificationConfig::default();
        assert!(create_sink(&config).is_ok());

        let config = NotificationConfig {
            sink: SinkKind::None,
            ..NotificationConfig::default()
        };
        assert!(create_sink(&config).is_ok());
    }
}
