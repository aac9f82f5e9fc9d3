//! Endpoint selection
//!
//! Picks the two participating nodes and what the server binds to.

use rand::Rng;

use crate::error::{BenchError, BenchResult};
use crate::models::{BindTarget, ClusterNode, Endpoint, NetworkMode, POD_DEFAULT_INTERFACE};

/// Resolve the server and client endpoints
///
/// Pinned names must exist and be Ready. Unpinned endpoints are drawn
/// uniformly from the remaining Ready nodes, server first, without
/// replacement, so the two endpoints never share a node.
pub fn resolve_endpoints<R: Rng + ?Sized>(
    server: Option<&str>,
    client: Option<&str>,
    nodes: &[ClusterNode],
    rng: &mut R,
) -> BenchResult<(Endpoint, Endpoint)> {
    if let (Some(s), Some(c)) = (server, client) {
        if s == c {
            return Err(BenchError::NodeCollision(s.to_string()));
        }
    }

    let pinned_server = server.map(|name| pinned(name, nodes)).transpose()?;
    let pinned_client = client.map(|name| pinned(name, nodes)).transpose()?;

    let mut pool: Vec<&ClusterNode> = nodes
        .iter()
        .filter(|n| n.ready)
        .filter(|n| Some(n.name.as_str()) != server && Some(n.name.as_str()) != client)
        .collect();

    let required = usize::from(server.is_none()) + usize::from(client.is_none());
    if pool.len() < required {
        return Err(BenchError::InsufficientCapacity {
            available: pool.len(),
            required,
        });
    }

    let server = match pinned_server {
        Some(endpoint) => endpoint,
        None => draw(&mut pool, rng),
    };
    let client = match pinned_client {
        Some(endpoint) => endpoint,
        None => draw(&mut pool, rng),
    };

    Ok((server, client))
}

fn pinned(name: &str, nodes: &[ClusterNode]) -> BenchResult<Endpoint> {
    let node = nodes
        .iter()
        .find(|n| n.name == name)
        .ok_or_else(|| BenchError::node_unavailable(name, "no such node"))?;
    if !node.ready {
        return Err(BenchError::node_unavailable(name, "node is not Ready"));
    }
    Ok(Endpoint::from(node))
}

/// Remove and return a random pool member; the caller checked the pool size
fn draw<R: Rng + ?Sized>(pool: &mut Vec<&ClusterNode>, rng: &mut R) -> Endpoint {
    let index = rng.random_range(0..pool.len());
    Endpoint::from(pool.swap_remove(index))
}

/// Decide the server bind target and whether pods use the host network
pub fn resolve_bind_target(
    mode: NetworkMode,
    interface: Option<&str>,
    server: &Endpoint,
) -> BenchResult<(BindTarget, bool)> {
    match mode {
        NetworkMode::Pod => Ok((BindTarget::Interface(POD_DEFAULT_INTERFACE.to_string()), false)),
        NetworkMode::Node => match interface {
            Some(iface) => Ok((BindTarget::Interface(iface.to_string()), true)),
            None => {
                let ip = server.internal_ip.ok_or_else(|| {
                    BenchError::node_unavailable(&server.node, "node reports no InternalIP")
                })?;
                Ok((BindTarget::Address(ip), true))
            }
        },
    }
}
