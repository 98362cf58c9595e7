//! Provider operation registry.
//!
//! Every cloud operation Argus may call (list, detail and remediation
//! calls alike) is registered under `(service, operation)` together with an
//! async handler. Manifests and capability tables are checked against the
//! registry before anything runs, so a misspelled operation is a load-time
//! error rather than a failure halfway through an audit.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProviderError;

/// Request parameters for one provider call.
pub type Request = Map<String, Value>;

/// Continuation-token fields of a paginated list operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Request parameter carrying the token of the page to fetch.
    pub input_token: String,
    /// Response field carrying the token of the next page.
    pub output_token: String,
}

impl Pagination {
    pub fn new(input_token: impl Into<String>, output_token: impl Into<String>) -> Self {
        Self {
            input_token: input_token.into(),
            output_token: output_token.into(),
        }
    }
}

/// Handler for a single operation.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn call(&self, request: Request) -> Result<Value, ProviderError>;
}

#[async_trait]
impl<F, Fut> OperationHandler for F
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ProviderError>> + Send + 'static,
{
    async fn call(&self, request: Request) -> Result<Value, ProviderError> {
        (self)(request).await
    }
}

/// The surface the walker, resolver and dispatcher call through.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Whether `(service, operation)` can be invoked.
    fn supports(&self, service: &str, operation: &str) -> bool;

    /// Pagination fields for a list operation, if it pages.
    fn pagination(&self, service: &str, operation: &str) -> Option<Pagination>;

    async fn invoke(
        &self,
        service: &str,
        operation: &str,
        request: Request,
    ) -> Result<Value, ProviderError>;
}

struct Registration {
    handler: Arc<dyn OperationHandler>,
    pagination: Option<Pagination>,
}

/// Registry from `(service, operation)` to handlers.
#[derive(Default)]
pub struct OperationRegistry {
    operations: BTreeMap<(String, String), Registration>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single-response operation. Re-registering replaces the
    /// previous handler.
    pub fn register<H>(&mut self, service: &str, operation: &str, handler: H) -> &mut Self
    where
        H: OperationHandler + 'static,
    {
        self.insert(service, operation, Arc::new(handler), None)
    }

    /// Register a list operation that pages with `pagination`.
    pub fn register_paginated<H>(
        &mut self,
        service: &str,
        operation: &str,
        pagination: Pagination,
        handler: H,
    ) -> &mut Self
    where
        H: OperationHandler + 'static,
    {
        self.insert(service, operation, Arc::new(handler), Some(pagination))
    }

    pub(crate) fn insert(
        &mut self,
        service: &str,
        operation: &str,
        handler: Arc<dyn OperationHandler>,
        pagination: Option<Pagination>,
    ) -> &mut Self {
        self.operations.insert(
            (service.to_string(), operation.to_string()),
            Registration {
                handler,
                pagination,
            },
        );
        self
    }

    /// Registered operations in `(service, operation)` order.
    pub fn operations(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.operations
            .keys()
            .map(|(service, operation)| (service.as_str(), operation.as_str()))
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    fn get(&self, service: &str, operation: &str) -> Option<&Registration> {
        self.operations
            .get(&(service.to_string(), operation.to_string()))
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.operations().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl Provider for OperationRegistry {
    fn supports(&self, service: &str, operation: &str) -> bool {
        self.get(service, operation).is_some()
    }

    fn pagination(&self, service: &str, operation: &str) -> Option<Pagination> {
        self.get(service, operation)
            .and_then(|registration| registration.pagination.clone())
    }

    async fn invoke(
        &self,
        service: &str,
        operation: &str,
        request: Request,
    ) -> Result<Value, ProviderError> {
        let registration =
            self.get(service, operation)
                .ok_or_else(|| ProviderError::UnknownOperation {
                    service: service.to_string(),
                    operation: operation.to_string(),
                })?;

        tracing::debug!(service, operation, "Invoking provider operation");
        registration.handler.call(request).await
    }
}
