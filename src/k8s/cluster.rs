//! The orchestration API as seen by a benchmark session
//!
//! Everything the session needs from the cluster goes through [`ClusterApi`],
//! so the coordinator and waiter can run against the real cluster through
//! [`super::K8sClient`] or against an in-memory fake in tests.

use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use k8s_openapi::api::rbac::v1::RoleBinding;

use crate::error::BenchResult;
use crate::models::{ClusterNode, PodObservation};

/// Stream of log lines from a followed pod
pub type LogLines = BoxStream<'static, BenchResult<String>>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Verify the current identity may create the session's resources
    async fn check_access(&self, namespace: &str) -> BenchResult<()>;

    /// All nodes with their Ready condition and InternalIP
    async fn list_nodes(&self) -> BenchResult<Vec<ClusterNode>>;

    /// Create the namespace or reuse an existing one
    async fn ensure_namespace(&self, namespace: &Namespace) -> BenchResult<()>;

    /// Create the privilege grant or reuse an existing one
    async fn ensure_role_binding(&self, binding: &RoleBinding) -> BenchResult<()>;

    async fn create_pod(&self, pod: &Pod) -> BenchResult<()>;

    /// Current phase and readiness of a pod
    async fn observe_pod(&self, namespace: &str, name: &str) -> BenchResult<PodObservation>;

    /// Run a command in a pod and return its stdout
    async fn exec(&self, namespace: &str, pod: &str, command: Vec<String>) -> BenchResult<String>;

    /// Follow a pod's log until the pod terminates
    async fn follow_logs(&self, namespace: &str, pod: &str) -> BenchResult<LogLines>;
}
