//! Error types for the runtime crate.

use thiserror::Error;

/// Errors returned by a provider operation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// No handler is registered for the operation.
    #[error("operation {service}.{operation} is not registered")]
    UnknownOperation { service: String, operation: String },

    /// The addressed resource does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The provider rejected or failed the call.
    #[error("call failed: {0}")]
    CallFailed(String),

    /// The provider answered with something other than a JSON object.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Enumeration of one control's resources failed.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// A list call failed.
    #[error("listing {service}.{operation} failed: {source}")]
    Provider {
        service: String,
        operation: String,
        #[source]
        source: ProviderError,
    },

    /// A page did not carry the declared resource list.
    #[error("page from {service}.{operation} has no array field '{field}'")]
    MissingResourceList {
        service: String,
        operation: String,
        field: String,
    },

    /// The provider returned the same continuation token twice in a row.
    #[error("{service}.{operation} repeated pagination token '{token}'")]
    PaginationLoop {
        service: String,
        operation: String,
        token: String,
    },
}

/// A per-resource detail fetch failed.
#[derive(Debug, Error)]
#[error("sub-call {service}.{operation} for '{resource_id}' failed: {source}")]
pub struct SubCallError {
    pub service: String,
    pub operation: String,
    pub resource_id: String,
    #[source]
    pub source: ProviderError,
}

/// A remediation action could not be carried out.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The action targets something this deployment cannot address.
    /// Raised before any provider call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The provider call was made and failed.
    #[error("action {action} failed: {source}")]
    Execution {
        action: String,
        #[source]
        source: ProviderError,
    },
}

/// Publishing a finding failed.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("failed to encode finding: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write finding: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink rejected finding: {0}")]
    Rejected(String),
}

/// A detection run finished but could not publish every finding.
#[derive(Debug, Error)]
#[error("{failed} of {total} findings could not be published")]
pub struct PublishFailures {
    pub failed: usize,
    pub total: usize,
}
