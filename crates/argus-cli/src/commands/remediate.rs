//! `argus remediate` command implementation.

use anyhow::{Context, Result, bail};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use argus_core::ArgusConfig;
use argus_runtime::RemediationResponse;
use argus_runtime::setup::{build_registry, remediation_service};

/// Remediate one finding, printing the response body to stdout.
pub async fn run(config_path: &Path, finding_path: &Path) -> Result<()> {
    let body = read_finding(finding_path)?;
    let response = execute(config_path, &body).await?;

    println!("{}", serde_json::to_string_pretty(&response.body)?);

    if !response.is_success() {
        bail!("Remediation failed with status {}", response.status);
    }
    Ok(())
}

async fn execute(config_path: &Path, body: &[u8]) -> Result<RemediationResponse> {
    let config = ArgusConfig::load_with_context(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let registry = Arc::new(build_registry(&config)?);
    let service = remediation_service(&config, registry)?;

    Ok(service.handle(body).await)
}

fn read_finding(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read finding from stdin")?;
        return Ok(buf);
    }
    std::fs::read(path).with_context(|| format!("Failed to read finding {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const RULES: &str = r#"
rules:
  - name: block-public-buckets
    match:
      controlID: S3-002
    actions:
      - service: s3
        apiCall: putPublicAccessBlock
"#;

    const SNAPSHOT: &str = r#"
services:
  s3:
    putPublicAccessBlock:
      response:
        ResponseMetadata: { RequestId: abc }
"#;

    fn write_project(dir: &Path) -> std::path::PathBuf {
        fs::write(dir.join("remediation.yaml"), RULES).unwrap();
        fs::write(dir.join("snapshot.yaml"), SNAPSHOT).unwrap();
        let config = dir.join("argus.yaml");
        fs::write(
            &config,
            "policy: { kind: rules, path: remediation.yaml }\ninventory: snapshot.yaml\n",
        )
        .unwrap();
        config
    }

    #[tokio::test]
    async fn test_remediate_dispatches_matching_rule() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_project(dir.path());

        let response = execute(
            &config,
            br#"{"controlID": "S3-002", "InstanceIdentifier": "my-bucket"}"#,
        )
        .await
        .unwrap();

        assert_eq!(response.status, 200);
        let result = &response.body["results"][0];
        assert_eq!(result["status"], "SUCCESS");
        assert_eq!(result["action"]["targetIdentifier"], "my-bucket");
        assert!(result["result"].get("ResponseMetadata").is_none());
    }

    #[tokio::test]
    async fn test_remediate_reports_bad_finding() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_project(dir.path());
        let finding = dir.path().join("finding.json");
        fs::write(&finding, "not json").unwrap();

        let err = run(&config, &finding).await.unwrap_err();
        assert!(err.to_string().contains("400"));
    }
}
