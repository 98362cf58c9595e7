//! `argus detect` command implementation.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use argus_core::{ArgusConfig, ControlManifest};
use argus_runtime::setup::build_registry;
use argus_runtime::{ControlOutcome, ControlSet, DetectionRun, FindingSink, Provider, RunSummary, create_sink};

/// Run every control in the configured manifest and publish the findings.
///
/// Returns an error when the configuration is invalid or when any finding
/// could not be published. Controls that fail to evaluate are reported in
/// the summary but do not fail the run.
pub async fn run(config_path: &Path, summary_path: Option<&Path>) -> Result<()> {
    let summary = execute(config_path).await?;

    print_summary(&summary);

    if let Some(path) = summary_path {
        let json = serde_json::to_string_pretty(&summary)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write run summary to {}", path.display()))?;
    }

    summary.into_result()?;
    Ok(())
}

async fn execute(config_path: &Path) -> Result<RunSummary> {
    let config = ArgusConfig::load_with_context(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    detect(&config).await
}

async fn detect(config: &ArgusConfig) -> Result<RunSummary> {
    let account = config.account_context()?;

    let manifest = ControlManifest::from_file(&config.manifest).with_context(|| {
        format!("Failed to load control manifest {}", config.manifest.display())
    })?;
    let controls = ControlSet::compile(&manifest)?;

    let provider: Arc<dyn Provider> = Arc::new(build_registry(config)?);
    controls
        .validate_against(provider.as_ref())
        .context("Control manifest does not match the provider")?;

    let sink: Arc<dyn FindingSink> = Arc::from(create_sink(&config.notifications)?);

    let run = DetectionRun::new(provider, sink, account);
    Ok(run.execute(&controls).await)
}

fn print_summary(summary: &RunSummary) {
    eprintln!();
    eprintln!(
        "Detection run {} ({} / {})",
        summary.run_id, summary.account.account_id, summary.account.region
    );
    eprintln!("{}", "─".repeat(60));
    for outcome in &summary.controls {
        match outcome {
            ControlOutcome::Evaluated {
                control_id,
                findings,
            } => eprintln!("  ✓ {:<16} {} finding(s)", control_id, findings),
            ControlOutcome::Failed { control_id, error } => {
                eprintln!("  ✗ {:<16} not evaluated: {}", control_id, error)
            }
        }
    }
    eprintln!("{}", "─".repeat(60));
    eprintln!(
        "Findings: {}, published: {}, publish failures: {}",
        summary.findings.len(),
        summary.published,
        summary.publish_failures
    );

    let degraded: Vec<_> = summary.degraded_controls().collect();
    if !degraded.is_empty() {
        eprintln!("Degraded controls: {}", degraded.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    const CONTROLS: &str = r#"
controls:
  - controlID: RDS-001
    description: RDS instance does not have automated backups enabled.
    severity: HIGH
    detection:
      service: rds
      listOperation: describeDBInstances
      resourceListField: DBInstances
      resourceIdentifierField: DBInstanceIdentifier
      evaluation:
        expression: BackupRetentionPeriod > 0
"#;

    const SNAPSHOT: &str = r#"
services:
  rds:
    describeDBInstances:
      response:
        DBInstances:
          - { DBInstanceIdentifier: db-prod, BackupRetentionPeriod: 7 }
          - { DBInstanceIdentifier: db-scratch, BackupRetentionPeriod: 0 }
"#;

    fn write_project(dir: &Path, argus_yaml: &str) -> std::path::PathBuf {
        fs::write(dir.join("controls.yaml"), CONTROLS).unwrap();
        fs::write(dir.join("snapshot.yaml"), SNAPSHOT).unwrap();
        let config = dir.join("argus.yaml");
        fs::write(&config, argus_yaml).unwrap();
        config
    }

    #[tokio::test]
    async fn test_detect_publishes_findings_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_project(
            dir.path(),
            r#"
account: { id: "123456789012", region: us-east-1 }
inventory: snapshot.yaml
notifications:
  sink: file
  path: findings.jsonl
"#,
        );
        let summary_path = dir.path().join("summary.json");

        run(&config, Some(&summary_path)).await.unwrap();

        let published = fs::read_to_string(dir.path().join("findings.jsonl")).unwrap();
        let lines: Vec<Value> = published
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["message"]["InstanceIdentifier"], "db-scratch");

        let summary: Value =
            serde_json::from_str(&fs::read_to_string(&summary_path).unwrap()).unwrap();
        assert_eq!(summary["published"], 1);
        assert_eq!(summary["publishFailures"], 0);
    }

    #[tokio::test]
    async fn test_detect_requires_account() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_project(
            dir.path(),
            "inventory: snapshot.yaml\nnotifications: { sink: none }\n",
        );

        let mut config = ArgusConfig::from_file(&config).unwrap();
        config.resolve_paths(dir.path());
        config.apply_overrides(|_| None);

        let err = detect(&config).await.unwrap_err();
        assert!(err.to_string().contains("account"));
    }

    #[tokio::test]
    async fn test_detect_rejects_uncovered_operation() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_project(
            dir.path(),
            "account: { id: \"123456789012\", region: us-east-1 }\nnotifications: { sink: none }\n",
        );

        let err = run(&config, None).await.unwrap_err();
        assert!(err.to_string().contains("does not match the provider"));
    }
}
