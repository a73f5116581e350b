//! Error types for the Application operator

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Kinds of objects the operator reads or writes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Application,
    ConfigMap,
    Deployment,
    Service,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Application => "Application",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Service => "Service",
        };
        f.write_str(s)
    }
}

/// Object store operations, attached to errors for context
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Create,
    Update,
    UpdateStatus,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoreOp::Get => "get",
            StoreOp::Create => "create",
            StoreOp::Update => "update",
            StoreOp::UpdateStatus => "update status",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// A store call did not finish within the configured bound
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    /// Conflicts and other failures expected to clear on retry
    #[error("Transient store failure: {0}")]
    Transient(String),

    /// The Application cannot be converged until its spec is fixed
    #[error("Invalid Application spec: {0}")]
    InvalidSpec(String),

    /// The owner reference could not be attached to a derived resource
    #[error("Failed to assign ownership: {0}")]
    OwnershipAssignmentFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A store failure with the reconcile step it happened in
    #[error("{op} {kind} {name} failed: {source}")]
    Step {
        kind: ResourceKind,
        op: StoreOp,
        name: String,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Wrap this error with the step that produced it
    pub fn in_step(self, kind: ResourceKind, op: StoreOp, name: impl Into<String>) -> Self {
        Error::Step {
            kind,
            op,
            name: name.into(),
            source: Box::new(self),
        }
    }

    /// Whether re-running the reconciliation can succeed without user action
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::KubeError(kube::Error::Api(resp)) => {
                matches!(resp.code, 408 | 409 | 429) || resp.code >= 500
            }
            Error::KubeError(_) => true,
            Error::Timeout(_) | Error::Transient(_) => true,
            Error::InvalidSpec(_)
            | Error::OwnershipAssignmentFailed(_)
            | Error::SerializationError(_)
            | Error::ConfigError(_) => false,
            Error::Step { source, .. } => source.is_retriable(),
        }
    }

    /// Short, stable name used as a metric label
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::Timeout(_) => "timeout",
            Error::Transient(_) => "transient",
            Error::InvalidSpec(_) => "invalid_spec",
            Error::OwnershipAssignmentFailed(_) => "ownership",
            Error::SerializationError(_) => "serialization",
            Error::ConfigError(_) => "config",
            Error::Step { source, .. } => source.metric_label(),
        }
    }
}
