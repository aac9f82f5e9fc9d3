//! Bounded polling of a pod's phase

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::{BenchError, BenchResult};
use crate::k8s::ClusterApi;
use crate::models::PodPhase;

/// How a wait that did not fail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The pod is running
    Running,
    /// The pod already ran to completion before a Running phase was seen
    Completed,
}

/// Polls a pod until it runs, fails, or the deadline passes
pub struct ReadinessWaiter<'a, C: ?Sized> {
    cluster: &'a C,
    poll_interval: Duration,
    max_read_failures: u32,
}

impl<'a, C: ClusterApi + ?Sized> ReadinessWaiter<'a, C> {
    pub fn new(cluster: &'a C, poll_interval: Duration, max_read_failures: u32) -> Self {
        Self {
            cluster,
            poll_interval,
            max_read_failures: max_read_failures.max(1),
        }
    }

    /// Wait for `pod` to reach Running
    ///
    /// A Failed phase returns immediately. Read errors count as "still
    /// waiting" until `max_read_failures` of them happen in a row.
    #[instrument(skip(self))]
    pub async fn await_running(
        &self,
        namespace: &str,
        pod: &str,
        timeout: Duration,
    ) -> BenchResult<Readiness> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut failures = 0u32;
        let mut last_reason: Option<String> = None;

        loop {
            match self.cluster.observe_pod(namespace, pod).await {
                Ok(obs) => {
                    failures = 0;
                    if obs.reason.is_some() && obs.reason != last_reason {
                        info!(phase = %obs.phase, reason = ?obs.reason, "Pod status changed");
                        last_reason = obs.reason.clone();
                    }
                    match obs.phase {
                        PodPhase::Running => {
                            if !obs.ready {
                                // no readiness probe is set, so Running is enough
                                debug!("Pod running, containers not ready yet");
                            }
                            info!(waited = ?started.elapsed(), "Pod is running");
                            return Ok(Readiness::Running);
                        }
                        PodPhase::Succeeded => {
                            info!("Pod already completed");
                            return Ok(Readiness::Completed);
                        }
                        PodPhase::Failed => {
                            return Err(BenchError::WorkloadFailed {
                                namespace: namespace.to_string(),
                                pod: pod.to_string(),
                                reason: obs.reason,
                            });
                        }
                        PodPhase::Pending | PodPhase::Unknown => {
                            debug!(phase = %obs.phase, "Pod not running yet");
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!(error = %e, failures, "Failed to read pod status");
                    if failures >= self.max_read_failures {
                        return Err(BenchError::ClusterUnreachable {
                            namespace: namespace.to_string(),
                            pod: pod.to_string(),
                            attempts: failures,
                            last_error: e.to_string(),
                        });
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(BenchError::ReadinessTimeout {
                    namespace: namespace.to_string(),
                    pod: pod.to_string(),
                    waited: now - started,
                });
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
