//! Argus Runtime
//!
//! Everything that talks to a provider lives here:
//!
//! - [`provider`]: the `(service, operation)` registry all calls go through
//! - [`snapshot`]: recorded responses registered as operations
//! - [`walker`] / [`resolver`] / [`detector`]: control evaluation
//! - [`notify`]: where findings are published
//! - [`dispatcher`] / [`remediation`]: turning a finding into provider calls

pub mod detector;
pub mod dispatcher;
pub mod error;
pub mod notify;
pub mod provider;
pub mod remediation;
pub mod resolver;
pub mod setup;
pub mod snapshot;
pub mod walker;

pub use detector::{
    CompiledControl, ControlOutcome, ControlSet, DetectionRun, RunSummary, evaluate_all,
    evaluate_control,
};
pub use dispatcher::{ActionDispatcher, ActionResult, ActionStatus, DispatchOutcome};
pub use error::{
    CollectorError, DispatchError, NotificationError, ProviderError, PublishFailures,
    SubCallError,
};
pub use notify::{FileSink, FindingMessage, FindingSink, NullSink, StdoutSink, create_sink};
pub use provider::{OperationHandler, OperationRegistry, Pagination, Provider, Request};
pub use remediation::{PolicyState, RemediationResponse, RemediationService};
pub use snapshot::Snapshot;
pub use walker::{Collector, walk};
