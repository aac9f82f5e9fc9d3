//! Kubernetes integration module for NetBench
//!
//! This module handles all interactions with the cluster:
//! - Reviewing access and listing nodes
//! - Preparing the session namespace and its privilege grant
//! - Building and creating the server and client pods
//! - Reading pod status, exec output and logs

mod client;
mod cluster;
pub mod resources;

pub use client::K8sClient;
pub use cluster::{ClusterApi, LogLines};
#[cfg(test)]
pub use cluster::MockClusterApi;
pub use resources::{
    client_pod, privileged_role_binding, server_pod, session_namespace, BIND_ADDRESS_PATH,
};
