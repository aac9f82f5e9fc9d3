//! Kubernetes client wrapper for NetBench

use async_trait::async_trait;
use futures::{AsyncBufReadExt, StreamExt, TryStreamExt};
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    api::{Api, AttachParams, ListParams, LogParams, Patch, PatchParams, PostParams},
    Client, Config,
};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument, warn};

use super::cluster::{ClusterApi, LogLines};
use crate::error::{BenchError, BenchResult};
use crate::models::{ClusterNode, PodObservation, PodPhase};

/// Verbs and resources a session needs, checked before any mutation
const REQUIRED_ACCESS: &[(&str, &str, &str, bool)] = &[
    // (verb, group, resource, namespaced)
    ("create", "", "namespaces", false),
    ("patch", "", "namespaces", false),
    ("create", "rbac.authorization.k8s.io", "rolebindings", true),
    ("create", "", "pods", true),
    ("create", "", "pods/exec", true),
    ("get", "", "pods/log", true),
];

/// Wrapper around kube::Client implementing [`ClusterApi`]
#[derive(Clone)]
pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    /// Create a new K8sClient using the default kubeconfig or in-cluster config
    #[instrument(skip_all)]
    pub async fn new() -> BenchResult<Self> {
        let config = Config::infer()
            .await
            .map_err(|e| BenchError::AuthMissing(e.to_string()))?;
        let client =
            Client::try_from(config).map_err(|e| BenchError::AuthMissing(e.to_string()))?;

        info!("Kubernetes client configured");

        Ok(Self { client })
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    #[instrument(skip(self))]
    async fn access_allowed(
        &self,
        verb: &str,
        group: &str,
        resource: &str,
        namespace: Option<&str>,
    ) -> BenchResult<bool> {
        let reviews: Api<SelfSubjectAccessReview> = Api::all(self.client.clone());

        let (resource, subresource) = match resource.split_once('/') {
            Some((r, sub)) => (r, Some(sub.to_string())),
            None => (resource, None),
        };
        let review = SelfSubjectAccessReview {
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(ResourceAttributes {
                    verb: Some(verb.to_string()),
                    group: Some(group.to_string()),
                    resource: Some(resource.to_string()),
                    subresource,
                    namespace: namespace.map(str::to_string),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        match reviews.create(&PostParams::default(), &review).await {
            Ok(result) => Ok(result.status.map(|s| s.allowed).unwrap_or(false)),
            Err(kube::Error::Api(e)) if e.code == 401 => Err(BenchError::AuthMissing(e.message)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Ready condition and InternalIP of a node
fn cluster_node(node: &Node) -> Option<ClusterNode> {
    let name = node.metadata.name.clone()?;
    let status = node.status.as_ref();

    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false);

    let internal_ip = status
        .and_then(|s| s.addresses.as_ref())
        .and_then(|addresses| {
            addresses
                .iter()
                .filter(|a| a.type_ == "InternalIP")
                .find_map(|a| a.address.parse().ok())
        });

    Some(ClusterNode {
        name,
        ready,
        internal_ip,
    })
}

/// Merge patch carrying only the labels of a desired namespace
fn namespace_label_patch(namespace: &Namespace) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            labels: namespace.metadata.labels.clone(),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn describe_role_ref(role_ref: &RoleRef) -> String {
    format!("{}/{}", role_ref.kind, role_ref.name)
}

/// An existing binding can be reused only if it grants the same role
fn check_existing_grant(existing: &RoleBinding, desired: &RoleBinding) -> BenchResult<()> {
    if existing.role_ref == desired.role_ref {
        return Ok(());
    }
    Err(BenchError::GrantConflict {
        binding: desired.metadata.name.clone().unwrap_or_default(),
        expected: describe_role_ref(&desired.role_ref),
        found: describe_role_ref(&existing.role_ref),
    })
}

/// Phase, Ready condition and first container reason of a pod
fn pod_observation(pod: &Pod) -> PodObservation {
    let status = pod.status.as_ref();

    let phase = status
        .and_then(|s| s.phase.as_deref())
        .map(PodPhase::from)
        .unwrap_or(PodPhase::Unknown);

    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false);

    let reason = status
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|cs| cs.first())
        .and_then(|c| c.state.as_ref())
        .and_then(|state| {
            state
                .waiting
                .as_ref()
                .and_then(|w| w.reason.clone())
                .or_else(|| state.terminated.as_ref().and_then(|t| t.reason.clone()))
        })
        .or_else(|| status.and_then(|s| s.reason.clone()));

    PodObservation {
        phase,
        ready,
        reason,
    }
}

#[async_trait]
impl ClusterApi for K8sClient {
    #[instrument(skip(self))]
    async fn check_access(&self, namespace: &str) -> BenchResult<()> {
        for (verb, group, resource, namespaced) in REQUIRED_ACCESS {
            let scope = namespaced.then_some(namespace);
            if !self.access_allowed(verb, group, resource, scope).await? {
                return Err(BenchError::AuthorizationDenied {
                    verb: verb.to_string(),
                    resource: resource.to_string(),
                    namespace: scope.map(str::to_string),
                });
            }
        }
        info!("Access review passed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_nodes(&self) -> BenchResult<Vec<ClusterNode>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes.list(&ListParams::default()).await.map_err(|e| match e {
            kube::Error::Api(ref ae) if ae.code == 401 => {
                BenchError::AuthMissing(ae.message.clone())
            }
            other => other.into(),
        })?;
        let nodes: Vec<ClusterNode> = list.items.iter().filter_map(cluster_node).collect();
        debug!(count = nodes.len(), "Listed nodes");
        Ok(nodes)
    }

    #[instrument(skip(self, namespace), fields(namespace = %namespace.metadata.name.as_deref().unwrap_or("unknown")))]
    async fn ensure_namespace(&self, namespace: &Namespace) -> BenchResult<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());

        match namespaces.create(&PostParams::default(), namespace).await {
            Ok(_) => {
                info!("Created namespace");
            }
            Err(kube::Error::Api(e)) if e.code == 409 => {
                // Already exists, make sure it still admits privileged pods
                let name = namespace.metadata.name.as_deref().unwrap_or_default();
                let patch = namespace_label_patch(namespace);
                namespaces
                    .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await
                    .map_err(|e| BenchError::provisioning("namespace labels", e))?;
                info!("Namespace already exists, labels refreshed");
            }
            Err(e) => return Err(BenchError::provisioning("namespace", e)),
        }

        Ok(())
    }

    #[instrument(skip(self, binding), fields(binding = %binding.metadata.name.as_deref().unwrap_or("unknown")))]
    async fn ensure_role_binding(&self, binding: &RoleBinding) -> BenchResult<()> {
        let namespace = binding.metadata.namespace.as_deref().unwrap_or("default");
        let bindings: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);

        match bindings.create(&PostParams::default(), binding).await {
            Ok(_) => info!("Created role binding"),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                let name = binding.metadata.name.as_deref().unwrap_or_default();
                let existing = bindings
                    .get(name)
                    .await
                    .map_err(|e| BenchError::provisioning("role binding", e))?;
                if let Err(conflict) = check_existing_grant(&existing, binding) {
                    warn!(error = %conflict, "Existing role binding grants another role");
                    return Err(conflict);
                }
                info!("Role binding already exists");
            }
            Err(e) => return Err(BenchError::provisioning("role binding", e)),
        }

        Ok(())
    }

    #[instrument(skip(self, pod), fields(pod_name = %pod.metadata.name.as_deref().unwrap_or("unknown")))]
    async fn create_pod(&self, pod: &Pod) -> BenchResult<()> {
        let namespace = pod.metadata.namespace.as_deref().unwrap_or("default");
        self.pods(namespace)
            .create(&PostParams::default(), pod)
            .await
            .map_err(|e| {
                let name = pod.metadata.name.as_deref().unwrap_or("unknown");
                BenchError::provisioning(format!("pod {name}"), e)
            })?;
        info!("Created pod");
        Ok(())
    }

    async fn observe_pod(&self, namespace: &str, name: &str) -> BenchResult<PodObservation> {
        let pod = self.pods(namespace).get(name).await?;
        Ok(pod_observation(&pod))
    }

    #[instrument(skip(self))]
    async fn exec(&self, namespace: &str, pod: &str, command: Vec<String>) -> BenchResult<String> {
        let ap = AttachParams::default().stdin(false).stdout(true).stderr(false);

        let mut attached = self
            .pods(namespace)
            .exec(pod, command, &ap)
            .await
            .map_err(|e| BenchError::artifact(namespace, pod, e.to_string()))?;

        let status = attached.take_status();
        let mut output = String::new();
        if let Some(mut stdout) = attached.stdout() {
            stdout.read_to_string(&mut output).await?;
        }

        if let Some(status) = status {
            if let Some(status) = status.await {
                if status.status.as_deref() == Some("Failure") {
                    let reason = status
                        .message
                        .unwrap_or_else(|| "command failed".to_string());
                    return Err(BenchError::artifact(namespace, pod, reason));
                }
            }
        }
        attached
            .join()
            .await
            .map_err(|e| BenchError::artifact(namespace, pod, e.to_string()))?;

        debug!(bytes = output.len(), "Exec finished");
        Ok(output)
    }

    #[instrument(skip(self))]
    async fn follow_logs(&self, namespace: &str, pod: &str) -> BenchResult<LogLines> {
        let log_params = LogParams {
            follow: true,
            ..Default::default()
        };

        let reader = self.pods(namespace).log_stream(pod, &log_params).await?;
        let lines = reader.lines().map_err(BenchError::from).boxed();
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cluster_node_from_api_object() {
        let node: Node = serde_json::from_value(json!({
            "metadata": {"name": "worker-1"},
            "status": {
                "conditions": [
                    {"type": "MemoryPressure", "status": "False"},
                    {"type": "Ready", "status": "True"}
                ],
                "addresses": [
                    {"type": "Hostname", "address": "worker-1"},
                    {"type": "InternalIP", "address": "10.0.0.5"}
                ]
            }
        }))
        .unwrap();

        let parsed = cluster_node(&node).unwrap();
        assert_eq!(parsed.name, "worker-1");
        assert!(parsed.ready);
        assert_eq!(parsed.internal_ip, Some("10.0.0.5".parse().unwrap()));
    }

    #[test]
    fn test_cluster_node_not_ready() {
        let node: Node = serde_json::from_value(json!({
            "metadata": {"name": "worker-2"},
            "status": {"conditions": [{"type": "Ready", "status": "Unknown"}]}
        }))
        .unwrap();

        let parsed = cluster_node(&node).unwrap();
        assert!(!parsed.ready);
        assert_eq!(parsed.internal_ip, None);
    }

    #[test]
    fn test_pod_observation_waiting_reason() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {"name": "iperf-server-1"},
            "status": {
                "phase": "Pending",
                "containerStatuses": [{
                    "name": "iperf",
                    "image": "netshoot",
                    "imageID": "",
                    "ready": false,
                    "restartCount": 0,
                    "state": {"waiting": {"reason": "ErrImagePull"}}
                }]
            }
        }))
        .unwrap();

        let obs = pod_observation(&pod);
        assert_eq!(obs.phase, PodPhase::Pending);
        assert!(!obs.ready);
        assert_eq!(obs.reason, Some("ErrImagePull".to_string()));
    }

    #[test]
    fn test_pod_observation_running_ready() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {"name": "iperf-server-1"},
            "status": {
                "phase": "Running",
                "conditions": [{"type": "Ready", "status": "True"}]
            }
        }))
        .unwrap();

        let obs = pod_observation(&pod);
        assert_eq!(obs.phase, PodPhase::Running);
        assert!(obs.ready);
        assert_eq!(obs.reason, None);
    }

    #[test]
    fn test_namespace_label_patch_carries_only_labels() {
        let namespace: Namespace = serde_json::from_value(json!({
            "metadata": {
                "name": "iperf-test",
                "labels": {"pod-security.kubernetes.io/enforce": "privileged"}
            }
        }))
        .unwrap();

        let patch = serde_json::to_value(namespace_label_patch(&namespace)).unwrap();
        assert_eq!(
            patch["metadata"],
            json!({"labels": {"pod-security.kubernetes.io/enforce": "privileged"}})
        );
        assert!(patch.get("spec").is_none());
    }

    fn binding_to(kind: &str, role: &str) -> RoleBinding {
        serde_json::from_value(json!({
            "metadata": {"name": "netbench-privileged", "namespace": "iperf-test"},
            "roleRef": {"apiGroup": "rbac.authorization.k8s.io", "kind": kind, "name": role}
        }))
        .unwrap()
    }

    #[test]
    fn test_existing_grant_with_same_role_is_reused() {
        let desired = binding_to("ClusterRole", "system:openshift:scc:privileged");
        let existing = binding_to("ClusterRole", "system:openshift:scc:privileged");
        assert!(check_existing_grant(&existing, &desired).is_ok());
    }

    #[test]
    fn test_existing_grant_with_other_role_conflicts() {
        let desired = binding_to("ClusterRole", "system:openshift:scc:privileged");
        let existing = binding_to("ClusterRole", "view");

        let err = check_existing_grant(&existing, &desired).unwrap_err();
        assert!(matches!(
            err,
            BenchError::GrantConflict { ref found, .. } if found == "ClusterRole/view"
        ));
    }
}
