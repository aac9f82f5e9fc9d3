use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use strum::Display;

use crate::error::{BenchError, BenchResult};

/// Default namespace (OpenShift project) for benchmark workloads
pub const DEFAULT_NAMESPACE: &str = "iperf-test";

/// Default benchmark duration in seconds
pub const DEFAULT_DURATION_SECS: u32 = 60;

/// Default container image; needs `sh`, `ip` and `iperf3`
pub const DEFAULT_IMAGE: &str = "docker.io/nicolaka/netshoot:latest";

/// Interface every pod-network pod gets
pub const POD_DEFAULT_INTERFACE: &str = "eth0";

/// Which network the benchmark runs over
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NetworkMode {
    /// Host network of the nodes
    #[default]
    Node,
    /// Pod (overlay) network
    Pod,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    #[strum(serialize = "TCP")]
    Tcp,
    #[strum(serialize = "UDP")]
    Udp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Server,
    Client,
}

/// Operator input before any cluster lookup
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    pub server_node: Option<String>,
    pub client_node: Option<String>,
    pub network_mode: NetworkMode,
    pub interface: Option<String>,
    pub protocol: Protocol,
    pub namespace: String,
    pub duration_secs: u32,
    pub image: String,
    pub assume_yes: bool,
}

impl Default for SessionRequest {
    fn default() -> Self {
        Self {
            server_node: None,
            client_node: None,
            network_mode: NetworkMode::default(),
            interface: None,
            protocol: Protocol::default(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            duration_secs: DEFAULT_DURATION_SECS,
            image: DEFAULT_IMAGE.to_string(),
            assume_yes: false,
        }
    }
}

impl SessionRequest {
    /// Reject malformed arguments before the cluster is contacted
    pub fn validate(&self) -> BenchResult<()> {
        if self.duration_secs == 0 {
            return Err(BenchError::InvalidArgument(
                "duration must be a positive number of seconds".to_string(),
            ));
        }
        if !is_dns_label(&self.namespace) {
            return Err(BenchError::InvalidArgument(format!(
                "'{}' is not a valid namespace name",
                self.namespace
            )));
        }
        if self.image.trim().is_empty() {
            return Err(BenchError::InvalidArgument(
                "image reference must not be empty".to_string(),
            ));
        }
        // pod mode always binds to the pod's default interface
        if self.network_mode == NetworkMode::Node {
            if let Some(iface) = &self.interface {
                if !is_interface_name(iface) {
                    return Err(BenchError::InvalidArgument(format!(
                        "'{iface}' is not a valid interface name"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Kernel interface names: at most 15 bytes, no shell metacharacters
fn is_interface_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 15
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'@' | b':' | b'-'))
}

fn is_dns_label(name: &str) -> bool {
    let bytes = name.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 63
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes[0] != b'-'
        && bytes[bytes.len() - 1] != b'-'
}

/// A cluster node as reported by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNode {
    pub name: String,
    pub ready: bool,
    pub internal_ip: Option<IpAddr>,
}

/// One of the two participating nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub node: String,
    pub ready: bool,
    pub internal_ip: Option<IpAddr>,
}

impl From<&ClusterNode> for Endpoint {
    fn from(node: &ClusterNode) -> Self {
        Self {
            node: node.name.clone(),
            ready: node.ready,
            internal_ip: node.internal_ip,
        }
    }
}

/// What the server binds to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindTarget {
    /// Resolved inside the server pod from the interface's IPv4 address
    Interface(String),
    /// Known to the orchestrator up front
    Address(IpAddr),
}

impl std::fmt::Display for BindTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindTarget::Interface(name) => write!(f, "interface {name}"),
            BindTarget::Address(ip) => write!(f, "{ip}"),
        }
    }
}

/// One fully resolved benchmark run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    namespace: String,
    suffix: String,
    network_mode: NetworkMode,
    bind: BindTarget,
    host_network: bool,
    protocol: Protocol,
    duration_secs: u32,
    image: String,
    assume_yes: bool,
    server: Endpoint,
    client: Endpoint,
}

impl Session {
    pub fn new(
        request: &SessionRequest,
        suffix: impl Into<String>,
        server: Endpoint,
        client: Endpoint,
        bind: BindTarget,
        host_network: bool,
    ) -> BenchResult<Self> {
        request.validate()?;
        if server.node == client.node {
            return Err(BenchError::NodeCollision(server.node));
        }
        Ok(Self {
            namespace: request.namespace.clone(),
            suffix: suffix.into(),
            network_mode: request.network_mode,
            bind,
            host_network,
            protocol: request.protocol,
            duration_secs: request.duration_secs,
            image: request.image.clone(),
            assume_yes: request.assume_yes,
            server,
            client,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn network_mode(&self) -> NetworkMode {
        self.network_mode
    }

    pub fn bind(&self) -> &BindTarget {
        &self.bind
    }

    pub fn host_network(&self) -> bool {
        self.host_network
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn assume_yes(&self) -> bool {
        self.assume_yes
    }

    pub fn server(&self) -> &Endpoint {
        &self.server
    }

    pub fn client(&self) -> &Endpoint {
        &self.client
    }

    pub fn endpoint(&self, role: Role) -> &Endpoint {
        match role {
            Role::Server => &self.server,
            Role::Client => &self.client,
        }
    }

    /// Pod name for a role, unique per session
    pub fn workload_name(&self, role: Role) -> String {
        format!("iperf-{}-{}", role, self.suffix)
    }
}

/// Timestamp-derived suffix shared by every workload of a session
pub fn session_suffix(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

/// Pod lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl From<&str> for PodPhase {
    fn from(phase: &str) -> Self {
        match phase {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

/// A single read of a pod's status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodObservation {
    pub phase: PodPhase,
    pub ready: bool,
    /// Waiting or termination reason of the first container, if any
    pub reason: Option<String>,
}

impl PodObservation {
    pub fn phase(phase: PodPhase) -> Self {
        Self {
            phase,
            ready: phase == PodPhase::Running,
            reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn endpoint(name: &str) -> Endpoint {
        Endpoint {
            node: name.to_string(),
            ready: true,
            internal_ip: None,
        }
    }

    #[test]
    fn test_request_defaults() {
        let request = SessionRequest::default();
        assert_eq!(request.duration_secs, 60);
        assert_eq!(request.protocol, Protocol::Tcp);
        assert_eq!(request.network_mode, NetworkMode::Node);
        assert_eq!(request.namespace, "iperf-test");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_zero_duration_rejected() {
        let request = SessionRequest {
            duration_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            request.validate(),
            Err(BenchError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_namespace_must_be_dns_label() {
        for bad in ["", "Iperf", "-iperf", "iperf-", "iperf_test"] {
            let request = SessionRequest {
                namespace: bad.to_string(),
                ..Default::default()
            };
            assert!(request.validate().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_interface_name_charset() {
        for bad in ["", "eth0 ", "x$(id>&2)", "`id`", "a\"b", "a\\b", "a'b", "averyverylongname0"] {
            let request = SessionRequest {
                interface: Some(bad.to_string()),
                ..Default::default()
            };
            assert!(
                matches!(request.validate(), Err(BenchError::InvalidArgument(_))),
                "{bad:?} should be rejected"
            );
        }
        for good in ["eth0", "bond0.100", "br-ex", "enp0s31f6", "vlan@eth0"] {
            let request = SessionRequest {
                interface: Some(good.to_string()),
                ..Default::default()
            };
            assert!(request.validate().is_ok(), "{good} should be accepted");
        }
    }

    #[test]
    fn test_interface_ignored_in_pod_mode() {
        let request = SessionRequest {
            network_mode: NetworkMode::Pod,
            interface: Some("ens3 ".to_string()),
            ..Default::default()
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_session_rejects_same_node() {
        let request = SessionRequest::default();
        let result = Session::new(
            &request,
            "20260101000000",
            endpoint("worker-1"),
            endpoint("worker-1"),
            BindTarget::Interface("eth0".to_string()),
            true,
        );
        assert!(matches!(result, Err(BenchError::NodeCollision(n)) if n == "worker-1"));
    }

    #[test]
    fn test_workload_names() {
        let session = Session::new(
            &SessionRequest::default(),
            "20260101000000",
            endpoint("worker-1"),
            endpoint("worker-2"),
            BindTarget::Interface("eth0".to_string()),
            true,
        )
        .unwrap();
        assert_eq!(
            session.workload_name(Role::Server),
            "iperf-server-20260101000000"
        );
        assert_eq!(
            session.workload_name(Role::Client),
            "iperf-client-20260101000000"
        );
        assert_eq!(session.endpoint(Role::Client).node, "worker-2");
    }

    #[test]
    fn test_session_suffix_format() {
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 9, 5, 3).unwrap();
        assert_eq!(session_suffix(now), "20261014090503");
    }

    #[test]
    fn test_display_values() {
        assert_eq!(NetworkMode::Pod.to_string(), "pod");
        assert_eq!(Protocol::Udp.to_string(), "UDP");
        assert_eq!(Role::Server.to_string(), "server");
        assert_eq!(PodPhase::from("Running"), PodPhase::Running);
        assert_eq!(PodPhase::from("Weird"), PodPhase::Unknown);
    }
}
