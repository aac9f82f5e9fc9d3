//! Benchmark session workflow
//!
//! - Resolving the two endpoints and the server bind target
//! - Waiting for pods to become ready
//! - Coordinating the server and client pods end to end
//! - Reporting the plan and the live benchmark output

mod coordinator;
mod reporter;
pub mod resolver;
mod waiter;

pub use coordinator::Coordinator;
pub use reporter::{Reporter, RunSummary};
pub use resolver::{resolve_bind_target, resolve_endpoints};
pub use waiter::{Readiness, ReadinessWaiter};
