//! NetBench Library
//!
//! Measures bandwidth between two cluster nodes, or their pod networks, by
//! running a one-off iperf3 server and client as ephemeral pods.

pub mod cli;
pub mod config;
pub mod error;
pub mod k8s;
pub mod models;
pub mod session;
