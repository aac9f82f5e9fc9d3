use clap::Parser;

use crate::models::{
    NetworkMode, Protocol, SessionRequest, DEFAULT_DURATION_SECS, DEFAULT_IMAGE, DEFAULT_NAMESPACE,
};

/// Measure network bandwidth between two cluster nodes with iperf3
#[derive(Parser, Debug, Clone)]
#[command(name = "netbench", version, about)]
pub struct Cli {
    /// Node running the iperf3 server (random Ready node if omitted)
    #[arg(short = 's', long)]
    pub server_node: Option<String>,

    /// Node running the iperf3 client (random Ready node if omitted)
    #[arg(short = 'c', long)]
    pub client_node: Option<String>,

    /// Network to measure
    #[arg(short = 'm', long, value_enum, default_value_t = NetworkMode::Node)]
    pub mode: NetworkMode,

    /// Interface whose IPv4 address the server binds to (node mode only)
    #[arg(short = 'i', long)]
    pub interface: Option<String>,

    /// Use UDP instead of TCP
    #[arg(short = 'u', long)]
    pub udp: bool,

    /// Namespace (OpenShift project) for the benchmark pods
    #[arg(short = 'p', long, default_value = DEFAULT_NAMESPACE)]
    pub project: String,

    /// Benchmark duration in seconds
    #[arg(
        short = 't',
        long,
        default_value_t = DEFAULT_DURATION_SECS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub duration: u32,

    /// Container image providing sh, ip and iperf3
    #[arg(long, default_value = DEFAULT_IMAGE)]
    pub image: String,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

impl From<Cli> for SessionRequest {
    fn from(cli: Cli) -> Self {
        SessionRequest {
            server_node: cli.server_node,
            client_node: cli.client_node,
            network_mode: cli.mode,
            interface: cli.interface,
            protocol: if cli.udp { Protocol::Udp } else { Protocol::Tcp },
            namespace: cli.project,
            duration_secs: cli.duration,
            image: cli.image,
            assume_yes: cli.yes,
        }
    }
}
