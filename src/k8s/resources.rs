//! Kubernetes resource builders for a benchmark session
//!
//! Pure functions that turn a resolved [`Session`] into the Namespace,
//! RoleBinding and Pod objects the coordinator submits.

use k8s_openapi::api::core::v1::{Container, Namespace, Pod, PodSpec, SecurityContext};
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::models::{BindTarget, Protocol, Role, Session};

/// Where the server pod writes the address it bound to
pub const BIND_ADDRESS_PATH: &str = "/tmp/iperf-server-address";

/// ClusterRole granting the `privileged` SCC on OpenShift
pub const PRIVILEGED_CLUSTER_ROLE: &str = "system:openshift:scc:privileged";

/// Name of the grant bound to the namespace's default service account
pub const PRIVILEGED_BINDING_NAME: &str = "netbench-privileged";

const MANAGED_BY: &str = "netbench";
const CONTAINER_NAME: &str = "iperf";

/// Create labels for a session resource
pub fn session_labels(suffix: &str, role: Option<Role>) -> BTreeMap<String, String> {
    let mut labels: BTreeMap<String, String> = [
        (
            "app.kubernetes.io/managed-by".to_string(),
            MANAGED_BY.to_string(),
        ),
        ("netbench.io/session".to_string(), suffix.to_string()),
    ]
    .into_iter()
    .collect();
    if let Some(role) = role {
        labels.insert("netbench.io/role".to_string(), role.to_string());
    }
    labels
}

/// Namespace admitting privileged, host-network pods
pub fn session_namespace(session: &Session) -> Namespace {
    let mut labels = session_labels(session.suffix(), None);
    for mode in ["enforce", "audit", "warn"] {
        labels.insert(
            format!("pod-security.kubernetes.io/{mode}"),
            "privileged".to_string(),
        );
    }

    Namespace {
        metadata: ObjectMeta {
            name: Some(session.namespace().to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Bind the privileged grant to the namespace's default service account
pub fn privileged_role_binding(namespace: &str) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(PRIVILEGED_BINDING_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(
                [(
                    "app.kubernetes.io/managed-by".to_string(),
                    MANAGED_BY.to_string(),
                )]
                .into_iter()
                .collect(),
            ),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: PRIVILEGED_CLUSTER_ROLE.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: "default".to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    }
}

/// Shell body of the server pod
///
/// The address is either known up front or read from the interface when the
/// pod starts. It is written to [`BIND_ADDRESS_PATH`] before iperf3 starts in
/// one-off mode.
pub fn server_command(bind: &BindTarget) -> String {
    let resolve = match bind {
        BindTarget::Address(ip) => format!("ADDR='{ip}'"),
        BindTarget::Interface(iface) => format!(
            "ADDR=$(ip -4 -o addr show dev '{iface}' 2>/dev/null | awk '{{print $4}}' | cut -d/ -f1 | head -n 1)"
        ),
    };
    let source = match bind {
        BindTarget::Address(ip) => format!("address {ip}"),
        BindTarget::Interface(iface) => format!("interface {iface}"),
    };

    format!(
        "{resolve}\n\
         if [ -z \"$ADDR\" ]; then echo 'no IPv4 address found for {source}' >&2; exit 1; fi\n\
         echo \"$ADDR\" > {BIND_ADDRESS_PATH}\n\
         echo \"iperf3 server binding to $ADDR\"\n\
         exec iperf3 -s -B \"$ADDR\" -1"
    )
}

/// Shell body of the client pod
///
/// Always exits 0; failure is judged from the log and phase instead.
pub fn client_command(server_address: IpAddr, protocol: Protocol, duration_secs: u32) -> String {
    let udp = match protocol {
        Protocol::Udp => " -u",
        Protocol::Tcp => "",
    };
    format!("iperf3 -c {server_address} -t {duration_secs}{udp}\nexit 0")
}

/// Pod for the server role
pub fn server_pod(session: &Session) -> Pod {
    benchmark_pod(session, Role::Server, server_command(session.bind()))
}

/// Pod for the client role, targeting the retrieved server address
pub fn client_pod(session: &Session, server_address: IpAddr) -> Pod {
    benchmark_pod(
        session,
        Role::Client,
        client_command(
            server_address,
            session.protocol(),
            session.duration_secs(),
        ),
    )
}

fn benchmark_pod(session: &Session, role: Role, script: String) -> Pod {
    let host_network = session.host_network();

    // Host network pods need privileges and the host-aware DNS policy
    let (security_context, dns_policy) = if host_network {
        (
            Some(SecurityContext {
                privileged: Some(true),
                ..Default::default()
            }),
            "ClusterFirstWithHostNet",
        )
    } else {
        (None, "ClusterFirst")
    };

    Pod {
        metadata: ObjectMeta {
            name: Some(session.workload_name(role)),
            namespace: Some(session.namespace().to_string()),
            labels: Some(session_labels(session.suffix(), Some(role))),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: CONTAINER_NAME.to_string(),
                image: Some(session.image().to_string()),
                image_pull_policy: Some("IfNotPresent".to_string()),
                command: Some(vec!["/bin/sh".to_string()]),
                args: Some(vec!["-c".to_string(), script]),
                security_context,
                ..Default::default()
            }],
            node_name: Some(session.endpoint(role).node.clone()),
            host_network: Some(host_network),
            dns_policy: Some(dns_policy.to_string()),
            restart_policy: Some("Never".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Endpoint, NetworkMode, SessionRequest};

    fn endpoint(name: &str) -> Endpoint {
        Endpoint {
            node: name.to_string(),
            ready: true,
            internal_ip: None,
        }
    }

    fn create_test_session(request: SessionRequest, bind: BindTarget, host_network: bool) -> Session {
        Session::new(
            &request,
            "20260101120000",
            endpoint("worker-1"),
            endpoint("worker-2"),
            bind,
            host_network,
        )
        .unwrap()
    }

    #[test]
    fn test_session_labels() {
        let labels = session_labels("20260101120000", Some(Role::Server));

        assert_eq!(
            labels.get("app.kubernetes.io/managed-by"),
            Some(&"netbench".to_string())
        );
        assert_eq!(
            labels.get("netbench.io/session"),
            Some(&"20260101120000".to_string())
        );
        assert_eq!(labels.get("netbench.io/role"), Some(&"server".to_string()));
    }

    #[test]
    fn test_server_pod_node_mode() {
        let session = create_test_session(
            SessionRequest::default(),
            BindTarget::Address("10.0.0.5".parse().unwrap()),
            true,
        );
        let pod = server_pod(&session);

        assert_eq!(
            pod.metadata.name,
            Some("iperf-server-20260101120000".to_string())
        );
        assert_eq!(pod.metadata.namespace, Some("iperf-test".to_string()));

        let spec = pod.spec.unwrap();
        assert_eq!(spec.node_name, Some("worker-1".to_string()));
        assert_eq!(spec.host_network, Some(true));
        assert_eq!(spec.restart_policy, Some("Never".to_string()));
        assert_eq!(spec.dns_policy, Some("ClusterFirstWithHostNet".to_string()));

        let container = &spec.containers[0];
        assert_eq!(
            container.security_context.as_ref().and_then(|s| s.privileged),
            Some(true)
        );
        let script = &container.args.as_ref().unwrap()[1];
        assert!(script.starts_with("ADDR='10.0.0.5'"));
        assert!(script.contains(BIND_ADDRESS_PATH));
        assert!(script.contains("iperf3 -s -B \"$ADDR\" -1"));
    }

    #[test]
    fn test_server_pod_pod_mode() {
        let request = SessionRequest {
            network_mode: NetworkMode::Pod,
            ..Default::default()
        };
        let session = create_test_session(request, BindTarget::Interface("eth0".to_string()), false);
        let spec = server_pod(&session).spec.unwrap();

        assert_eq!(spec.host_network, Some(false));
        assert_eq!(spec.dns_policy, Some("ClusterFirst".to_string()));
        assert!(spec.containers[0].security_context.is_none());
        let script = &spec.containers[0].args.as_ref().unwrap()[1];
        assert!(script.contains("ip -4 -o addr show dev 'eth0'"));
        assert!(script.contains("exit 1"));
    }

    #[test]
    fn test_server_command_fails_without_address() {
        let script = server_command(&BindTarget::Interface("bond0".to_string()));
        let check = script.lines().nth(1).unwrap();
        assert!(check.contains("[ -z \"$ADDR\" ]"));
        assert!(check.contains("echo 'no IPv4 address found for interface bond0' >&2"));
        // write happens only after the check
        let write_at = script.find(BIND_ADDRESS_PATH).unwrap();
        assert!(script.find("exit 1").unwrap() < write_at);
    }

    #[test]
    fn test_client_pod_targets_server_address() {
        let request = SessionRequest {
            protocol: Protocol::Udp,
            duration_secs: 15,
            ..Default::default()
        };
        let session = create_test_session(request, BindTarget::Interface("eth0".to_string()), true);
        let pod = client_pod(&session, "10.0.0.5".parse().unwrap());

        assert_eq!(
            pod.metadata.name,
            Some("iperf-client-20260101120000".to_string())
        );
        let spec = pod.spec.unwrap();
        assert_eq!(spec.node_name, Some("worker-2".to_string()));
        let script = &spec.containers[0].args.as_ref().unwrap()[1];
        assert_eq!(script, "iperf3 -c 10.0.0.5 -t 15 -u\nexit 0");
    }

    #[test]
    fn test_client_command_tcp_default() {
        let script = client_command("192.168.1.10".parse().unwrap(), Protocol::Tcp, 60);
        assert_eq!(script, "iperf3 -c 192.168.1.10 -t 60\nexit 0");
    }

    #[test]
    fn test_namespace_allows_privileged_pods() {
        let session = create_test_session(
            SessionRequest::default(),
            BindTarget::Interface("eth0".to_string()),
            true,
        );
        let ns = session_namespace(&session);
        let labels = ns.metadata.labels.unwrap();

        assert_eq!(ns.metadata.name, Some("iperf-test".to_string()));
        assert_eq!(
            labels.get("pod-security.kubernetes.io/enforce"),
            Some(&"privileged".to_string())
        );
    }

    #[test]
    fn test_privileged_role_binding() {
        let binding = privileged_role_binding("iperf-test");

        assert_eq!(binding.role_ref.name, PRIVILEGED_CLUSTER_ROLE);
        assert_eq!(binding.role_ref.kind, "ClusterRole");
        let subject = &binding.subjects.unwrap()[0];
        assert_eq!(subject.kind, "ServiceAccount");
        assert_eq!(subject.name, "default");
        assert_eq!(subject.namespace, Some("iperf-test".to_string()));
    }
}
