//! Per-resource detail fetches.

use argus_core::{ParameterSource, SubCallSpec};
use serde_json::Value;

use crate::error::SubCallError;
use crate::provider::{Provider, Request};

/// Build the sub-call request for one resource, binding parameters in
/// declaration order.
pub fn bind_parameters(sub_call: &SubCallSpec, resource_id: &str) -> Request {
    sub_call
        .parameters
        .iter()
        .map(|param| {
            let value = match param.source {
                ParameterSource::ResourceIdentifier => Value::String(resource_id.to_string()),
            };
            (param.name.clone(), value)
        })
        .collect()
}

/// Fetch the detail object for `resource_id` via `service.sub_call`.
pub async fn resolve(
    provider: &dyn Provider,
    service: &str,
    sub_call: &SubCallSpec,
    resource_id: &str,
) -> Result<Value, SubCallError> {
    let request = bind_parameters(sub_call, resource_id);
    provider
        .invoke(service, &sub_call.operation, request)
        .await
        .map_err(|source| SubCallError {
            service: service.to_string(),
            operation: sub_call.operation.clone(),
            resource_id: resource_id.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::OperationRegistry;
    use argus_core::SubCallParameter;
    use serde_json::json;

    fn sub_call() -> SubCallSpec {
        SubCallSpec {
            operation: "getBucketEncryption".to_string(),
            parameters: vec![SubCallParameter {
                name: "Bucket".to_string(),
                source: ParameterSource::ResourceIdentifier,
            }],
        }
    }

    #[test]
    fn test_bind_parameters() {
        let mut spec = sub_call();
        spec.parameters.push(SubCallParameter {
            name: "ExpectedBucketOwner".to_string(),
            source: ParameterSource::ResourceIdentifier,
        });

        let request = bind_parameters(&spec, "logs");
        let keys: Vec<&String> = request.keys().collect();
        assert_eq!(keys.len(), 2);
        assert_eq!(request["Bucket"], json!("logs"));
        assert_eq!(request["ExpectedBucketOwner"], json!("logs"));
    }

    #[tokio::test]
    async fn test_resolve_passes_identifier() {
        let mut registry = OperationRegistry::new();
        registry.register("s3", "getBucketEncryption", |request: Request| async move {
            Ok::<_, ProviderError>(json!({ "for": request["Bucket"].clone() }))
        });

        let detail = resolve(&registry, "s3", &sub_call(), "logs").await.unwrap();
        assert_eq!(detail, json!({"for": "logs"}));
    }

    #[tokio::test]
    async fn test_resolve_failure_names_resource() {
        let mut registry = OperationRegistry::new();
        registry.register("s3", "getBucketEncryption", |_: Request| async {
            Err::<Value, _>(ProviderError::CallFailed("AccessDenied".to_string()))
        });

        let err = resolve(&registry, "s3", &sub_call(), "scratch")
            .await
            .unwrap_err();
        assert_eq!(err.resource_id, "scratch");
        assert!(err.to_string().contains("s3.getBucketEncryption"));
    }
}
