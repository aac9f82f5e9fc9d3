//! Error types for a benchmark session
//!
//! Every fatal condition of a run maps to one variant. Variants are grouped
//! into categories so the binary can label the failure and pick an exit code.

use std::time::Duration;
use thiserror::Error;

/// Result type used across the crate
pub type BenchResult<T> = Result<T, BenchError>;

/// Broad class of a failure, used for labelling and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ErrorCategory {
    Precondition,
    Provisioning,
    Readiness,
    Artifact,
    Benchmark,
    Internal,
}

impl ErrorCategory {
    /// Process exit code for this category
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorCategory::Internal => 1,
            ErrorCategory::Precondition => 2,
            ErrorCategory::Provisioning => 3,
            ErrorCategory::Readiness => 4,
            ErrorCategory::Artifact => 5,
            ErrorCategory::Benchmark => 6,
        }
    }
}

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("no usable cluster credentials: {0}")]
    AuthMissing(String),

    #[error("not permitted to {verb} {resource}{}", scope_suffix(.namespace))]
    AuthorizationDenied {
        verb: String,
        resource: String,
        namespace: Option<String>,
    },

    #[error("node '{node}' is unavailable: {reason}")]
    NodeUnavailable { node: String, reason: String },

    #[error("not enough ready nodes: {required} more needed, {available} available")]
    InsufficientCapacity { available: usize, required: usize },

    #[error("server and client node are both '{0}'; they must differ")]
    NodeCollision(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("aborted by operator")]
    Aborted,

    #[error("failed to create {resource}: {source}")]
    Provisioning {
        resource: String,
        #[source]
        source: kube::Error,
    },

    #[error("rolebinding '{binding}' already exists and grants '{found}' instead of '{expected}'")]
    GrantConflict {
        binding: String,
        expected: String,
        found: String,
    },

    #[error("pod '{pod}' failed{}; inspect it with: kubectl logs -n {namespace} {pod}", reason_suffix(.reason))]
    WorkloadFailed {
        namespace: String,
        pod: String,
        reason: Option<String>,
    },

    #[error("pod '{pod}' not running after {waited:?}; inspect it with: kubectl logs -n {namespace} {pod}")]
    ReadinessTimeout {
        namespace: String,
        pod: String,
        waited: Duration,
    },

    #[error("lost contact with the cluster while waiting for pod '{pod}' ({attempts} failed reads, last: {last_error}); inspect it with: kubectl logs -n {namespace} {pod}")]
    ClusterUnreachable {
        namespace: String,
        pod: String,
        attempts: u32,
        last_error: String,
    },

    #[error("could not retrieve bind address from pod '{pod}': {reason}; inspect it with: kubectl logs -n {namespace} {pod}")]
    ArtifactRetrieval {
        namespace: String,
        pod: String,
        reason: String,
    },

    #[error("benchmark in pod '{pod}' reported failure: {reason}")]
    BenchmarkFailed { pod: String, reason: String },

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

fn scope_suffix(namespace: &Option<String>) -> String {
    namespace
        .as_ref()
        .map(|ns| format!(" in namespace '{ns}'"))
        .unwrap_or_default()
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_ref()
        .map(|r| format!(" ({r})"))
        .unwrap_or_default()
}

impl BenchError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BenchError::AuthMissing(_)
            | BenchError::AuthorizationDenied { .. }
            | BenchError::NodeUnavailable { .. }
            | BenchError::InsufficientCapacity { .. }
            | BenchError::NodeCollision(_)
            | BenchError::InvalidArgument(_)
            | BenchError::Aborted => ErrorCategory::Precondition,
            BenchError::Provisioning { .. } | BenchError::GrantConflict { .. } => {
                ErrorCategory::Provisioning
            }
            BenchError::WorkloadFailed { .. }
            | BenchError::ReadinessTimeout { .. }
            | BenchError::ClusterUnreachable { .. } => ErrorCategory::Readiness,
            BenchError::ArtifactRetrieval { .. } => ErrorCategory::Artifact,
            BenchError::BenchmarkFailed { .. } => ErrorCategory::Benchmark,
            BenchError::Kube(_) | BenchError::Io(_) | BenchError::Config(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Wrap a rejected create call
    pub fn provisioning(resource: impl Into<String>, source: kube::Error) -> Self {
        BenchError::Provisioning {
            resource: resource.into(),
            source,
        }
    }

    pub fn node_unavailable(node: impl Into<String>, reason: impl Into<String>) -> Self {
        BenchError::NodeUnavailable {
            node: node.into(),
            reason: reason.into(),
        }
    }

    pub fn artifact(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        BenchError::ArtifactRetrieval {
            namespace: namespace.into(),
            pod: pod.into(),
            reason: reason.into(),
        }
    }
}
