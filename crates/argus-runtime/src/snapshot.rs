//! Recorded provider responses.
//!
//! A snapshot lets a detection run or a remediation request execute
//! without live cloud credentials. Each operation gets one fixture:
//!
//! ```yaml
//! services:
//!   rds:
//!     describeDBInstances:
//!       pagination: { inputToken: Marker, outputToken: Marker }
//!       pages:
//!         - DBInstances: [{ DBInstanceIdentifier: db-1, BackupRetentionPeriod: 7 }]
//!         - DBInstances: [{ DBInstanceIdentifier: db-2, BackupRetentionPeriod: 0 }]
//!     modifyDBInstance:
//!       response: { DBInstance: { DBInstanceIdentifier: db-2 } }
//!   s3:
//!     getBucketEncryption:
//!       keyParameter: Bucket
//!       responses:
//!         logs: { ServerSideEncryptionConfiguration: { Rules: [] } }
//!       errors:
//!         scratch: ServerSideEncryptionConfigurationNotFoundError
//! ```
//!
//! Tokens for paged fixtures are generated when a page does not carry one.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use argus_core::ConfigError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ProviderError;
use crate::provider::{OperationHandler, OperationRegistry, Pagination, Request};

#[derive(Debug, Deserialize)]
struct SnapshotFile {
    #[serde(default)]
    services: BTreeMap<String, BTreeMap<String, FixtureSpec>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FixtureSpec {
    #[serde(default)]
    pages: Option<Vec<Value>>,
    #[serde(default)]
    pagination: Option<Pagination>,
    #[serde(default)]
    key_parameter: Option<String>,
    #[serde(default)]
    responses: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    errors: Option<BTreeMap<String, String>>,
    #[serde(default)]
    response: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug)]
enum Fixture {
    Pages {
        pages: Vec<Value>,
        input_token: String,
        tokens: HashMap<String, usize>,
    },
    Keyed {
        key_parameter: String,
        responses: BTreeMap<String, Value>,
        errors: BTreeMap<String, String>,
    },
    Fixed(Value),
    Error(String),
}

impl Fixture {
    fn compile(label: &str, spec: FixtureSpec) -> Result<(Self, Option<Pagination>), ConfigError> {
        let invalid = |msg: &str| ConfigError::Config(format!("snapshot fixture {}: {}", label, msg));

        let kinds = [
            spec.pages.is_some(),
            spec.responses.is_some() || spec.errors.is_some(),
            spec.response.is_some(),
            spec.error.is_some(),
        ];
        if kinds.iter().filter(|k| **k).count() != 1 {
            return Err(invalid(
                "exactly one of pages, responses/errors, response or error is required",
            ));
        }
        if spec.pagination.is_some() && spec.pages.is_none() {
            return Err(invalid("pagination is only valid with pages"));
        }

        if let Some(pages) = spec.pages {
            return match spec.pagination {
                Some(pagination) => {
                    let (pages, tokens) = link_pages(label, pages, &pagination)?;
                    let fixture = Fixture::Pages {
                        pages,
                        input_token: pagination.input_token.clone(),
                        tokens,
                    };
                    Ok((fixture, Some(pagination)))
                }
                None => match <[Value; 1]>::try_from(pages) {
                    Ok([page]) => Ok((Fixture::Fixed(page), None)),
                    Err(_) => Err(invalid("more than one page requires pagination")),
                },
            };
        }

        if spec.responses.is_some() || spec.errors.is_some() {
            let key_parameter = spec
                .key_parameter
                .ok_or_else(|| invalid("responses require keyParameter"))?;
            return Ok((
                Fixture::Keyed {
                    key_parameter,
                    responses: spec.responses.unwrap_or_default(),
                    errors: spec.errors.unwrap_or_default(),
                },
                None,
            ));
        }

        if let Some(response) = spec.response {
            return Ok((Fixture::Fixed(response), None));
        }

        match spec.error {
            Some(message) => Ok((Fixture::Error(message), None)),
            None => Err(invalid("empty fixture")),
        }
    }
}

/// Give every page but the last an output token and index the tokens.
fn link_pages(
    label: &str,
    mut pages: Vec<Value>,
    pagination: &Pagination,
) -> Result<(Vec<Value>, HashMap<String, usize>), ConfigError> {
    if pages.is_empty() {
        return Err(ConfigError::Config(format!(
            "snapshot fixture {}: pages must not be empty",
            label
        )));
    }

    let last = pages.len() - 1;
    let mut tokens = HashMap::new();
    for (index, page) in pages.iter_mut().enumerate() {
        let Value::Object(page) = page else {
            return Err(ConfigError::Config(format!(
                "snapshot fixture {}: page {} is not an object",
                label, index
            )));
        };

        if index == last {
            page.remove(&pagination.output_token);
            continue;
        }

        let token = match page.get(&pagination.output_token) {
            Some(Value::String(token)) if !token.is_empty() => token.clone(),
            _ => format!("page-{}", index + 1),
        };
        if tokens.insert(token.clone(), index + 1).is_some() {
            return Err(ConfigError::Config(format!(
                "snapshot fixture {}: token '{}' used by two pages",
                label, token
            )));
        }
        page.insert(pagination.output_token.clone(), Value::String(token));
    }

    Ok((pages, tokens))
}

struct FixtureHandler {
    label: String,
    fixture: Fixture,
}

#[async_trait]
impl OperationHandler for FixtureHandler {
    async fn call(&self, request: Request) -> Result<Value, ProviderError> {
        match &self.fixture {
            Fixture::Fixed(response) => Ok(response.clone()),
            Fixture::Error(message) => Err(ProviderError::CallFailed(message.clone())),
            Fixture::Pages {
                pages,
                input_token,
                tokens,
            } => {
                let index = match request.get(input_token) {
                    None | Some(Value::Null) => 0,
                    Some(Value::String(token)) => *tokens.get(token).ok_or_else(|| {
                        ProviderError::CallFailed(format!(
                            "{}: invalid pagination token '{}'",
                            self.label, token
                        ))
                    })?,
                    Some(other) => {
                        return Err(ProviderError::CallFailed(format!(
                            "{}: invalid pagination token {}",
                            self.label, other
                        )));
                    }
                };
                Ok(pages[index].clone())
            }
            Fixture::Keyed {
                key_parameter,
                responses,
                errors,
            } => {
                let key = match request.get(key_parameter) {
                    Some(Value::String(key)) => key,
                    _ => {
                        return Err(ProviderError::CallFailed(format!(
                            "{}: missing required parameter '{}'",
                            self.label, key_parameter
                        )));
                    }
                };
                if let Some(message) = errors.get(key) {
                    return Err(ProviderError::CallFailed(message.clone()));
                }
                responses
                    .get(key)
                    .cloned()
                    .ok_or_else(|| ProviderError::NotFound(format!("{} '{}'", key_parameter, key)))
            }
        }
    }
}

/// Parsed snapshot, ready to register.
#[derive(Debug)]
pub struct Snapshot {
    operations: Vec<(String, String, Fixture, Option<Pagination>)>,
}

impl Snapshot {
    /// Load a snapshot from a YAML or JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse a snapshot. JSON documents are accepted as YAML.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let file: SnapshotFile = serde_yaml::from_str(content)?;

        let mut operations = Vec::new();
        for (service, ops) in file.services {
            for (operation, spec) in ops {
                let label = format!("{}.{}", service, operation);
                let (fixture, pagination) = Fixture::compile(&label, spec)?;
                operations.push((service.clone(), operation, fixture, pagination));
            }
        }
        Ok(Self { operations })
    }

    /// `(service, operation)` pairs the snapshot covers.
    pub fn operations(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.operations
            .iter()
            .map(|(service, operation, _, _)| (service.as_str(), operation.as_str()))
    }

    /// Register every fixture as an operation handler.
    pub fn register_into(self, registry: &mut OperationRegistry) {
        for (service, operation, fixture, pagination) in self.operations {
            let handler = FixtureHandler {
                label: format!("{}.{}", service, operation),
                fixture,
            };
            registry.insert(&service, &operation, Arc::new(handler), pagination);
        }
    }

    /// A registry serving only this snapshot.
    pub fn into_registry(self) -> OperationRegistry {
        let mut registry = OperationRegistry::new();
        self.register_into(&mut registry);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;
    use serde_json::json;

    const SNAPSHOT: &str = r#"
services:
  rds:
    describeDBInstances:
      pagination: { inputToken: Marker, outputToken: Marker }
      pages:
        - DBInstances: [{ DBInstanceIdentifier: db-1 }]
        - DBInstances: [{ DBInstanceIdentifier: db-2 }]
          Marker: custom-token
        - DBInstances: [{ DBInstanceIdentifier: db-3 }]
    modifyDBInstance:
      response: { DBInstance: { DBInstanceIdentifier: db-2 } }
  s3:
    getBucketEncryption:
      keyParameter: Bucket
      responses:
        logs: { ServerSideEncryptionConfiguration: { Rules: [] } }
      errors:
        scratch: ServerSideEncryptionConfigurationNotFoundError
    putPublicAccessBlock:
      error: AccessDenied
"#;

    fn request(pairs: &[(&str, &str)]) -> Request {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[tokio::test]
    async fn test_paged_fixture_follows_tokens() {
        let registry = Snapshot::from_yaml(SNAPSHOT).unwrap().into_registry();
        assert_eq!(
            registry.pagination("rds", "describeDBInstances"),
            Some(Pagination::new("Marker", "Marker"))
        );

        let first = registry
            .invoke("rds", "describeDBInstances", Request::new())
            .await
            .unwrap();
        assert_eq!(first["Marker"], json!("page-1"));

        let second = registry
            .invoke("rds", "describeDBInstances", request(&[("Marker", "page-1")]))
            .await
            .unwrap();
        assert_eq!(second["DBInstances"][0]["DBInstanceIdentifier"], json!("db-2"));
        assert_eq!(second["Marker"], json!("custom-token"));

        let third = registry
            .invoke(
                "rds",
                "describeDBInstances",
                request(&[("Marker", "custom-token")]),
            )
            .await
            .unwrap();
        assert!(third.get("Marker").is_none());
    }

    #[tokio::test]
    async fn test_keyed_fixture() {
        let registry = Snapshot::from_yaml(SNAPSHOT).unwrap().into_registry();

        let found = registry
            .invoke("s3", "getBucketEncryption", request(&[("Bucket", "logs")]))
            .await
            .unwrap();
        assert!(found["ServerSideEncryptionConfiguration"].is_object());

        let err = registry
            .invoke("s3", "getBucketEncryption", request(&[("Bucket", "scratch")]))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ProviderError::CallFailed("ServerSideEncryptionConfigurationNotFoundError".to_string())
        );

        let err = registry
            .invoke("s3", "getBucketEncryption", request(&[("Bucket", "other")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_error_fixture() {
        let registry = Snapshot::from_yaml(SNAPSHOT).unwrap().into_registry();
        let err = registry
            .invoke("s3", "putPublicAccessBlock", request(&[("Bucket", "logs")]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "call failed: AccessDenied");
    }

    #[test]
    fn test_invalid_fixtures() {
        let ambiguous = "services:\n  s3:\n    listBuckets:\n      response: {}\n      error: boom\n";
        assert!(Snapshot::from_yaml(ambiguous).is_err());

        let unpaged = "services:\n  s3:\n    listBuckets:\n      pages: [{}, {}]\n";
        assert!(Snapshot::from_yaml(unpaged).is_err());

        let keyless = "services:\n  s3:\n    getBucketEncryption:\n      responses: {}\n";
        assert!(Snapshot::from_yaml(keyless).is_err());
    }

    #[test]
    fn test_operations_listing() {
        let snapshot = Snapshot::from_yaml(SNAPSHOT).unwrap();
        assert_eq!(snapshot.operations().count(), 4);
    }
}
