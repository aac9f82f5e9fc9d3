//! Session coordinator
//!
//! Sequences one benchmark run. Each step must succeed before the next
//! starts, and nothing is cleaned up on failure so the pods can be inspected.

use chrono::Utc;
use futures::StreamExt;
use std::io::{BufRead, Write};
use std::net::IpAddr;
use tracing::{info, instrument, warn};

use super::reporter::{Reporter, RunSummary};
use super::resolver::{resolve_bind_target, resolve_endpoints};
use super::waiter::{Readiness, ReadinessWaiter};
use crate::config::Config;
use crate::error::{BenchError, BenchResult};
use crate::k8s::{
    client_pod, privileged_role_binding, server_pod, session_namespace, ClusterApi,
    BIND_ADDRESS_PATH,
};
use crate::models::{session_suffix, PodPhase, Role, Session, SessionRequest};

/// Marker iperf3 prints before any fatal client error
const IPERF_ERROR_MARKER: &str = "iperf3: error";

const ABORT_ANSWERS: &[&str] = &["n", "no", "q", "quit", "abort"];

pub struct Coordinator<'a, C: ?Sized, W, R> {
    cluster: &'a C,
    config: &'a Config,
    reporter: Reporter<W>,
    input: R,
}

impl<'a, C, W, R> Coordinator<'a, C, W, R>
where
    C: ClusterApi + ?Sized,
    W: Write,
    R: BufRead,
{
    pub fn new(cluster: &'a C, config: &'a Config, reporter: Reporter<W>, input: R) -> Self {
        Self {
            cluster,
            config,
            reporter,
            input,
        }
    }

    pub fn into_reporter(self) -> Reporter<W> {
        self.reporter
    }

    /// Run the whole session end to end
    #[instrument(skip(self, request), fields(namespace = %request.namespace))]
    pub async fn run(&mut self, request: &SessionRequest) -> BenchResult<RunSummary> {
        let session = self.plan(request).await?;

        if !session.assume_yes() {
            self.confirm()?;
        }

        self.prepare_namespace(&session).await?;
        self.start_server(&session).await?;
        let server_address = self.retrieve_bind_address(&session).await?;
        self.start_client(&session, server_address).await?;
        let lines = self.stream_client(&session).await?;

        let summary = RunSummary {
            namespace: session.namespace().to_string(),
            server_pod: session.workload_name(Role::Server),
            client_pod: session.workload_name(Role::Client),
            server_address,
            lines,
        };
        self.reporter.finished(&summary)?;
        info!("Session complete");
        Ok(summary)
    }

    /// Check access, resolve endpoints and report the plan
    async fn plan(&mut self, request: &SessionRequest) -> BenchResult<Session> {
        request.validate()?;
        self.cluster.check_access(&request.namespace).await?;

        let nodes = self.cluster.list_nodes().await?;
        let (server, client) = resolve_endpoints(
            request.server_node.as_deref(),
            request.client_node.as_deref(),
            &nodes,
            &mut rand::rng(),
        )?;
        let (bind, host_network) =
            resolve_bind_target(request.network_mode, request.interface.as_deref(), &server)?;

        let session = Session::new(
            request,
            session_suffix(Utc::now()),
            server,
            client,
            bind,
            host_network,
        )?;
        info!(
            server = %session.server().node,
            client = %session.client().node,
            bind = %session.bind(),
            "Resolved session plan"
        );
        self.reporter.plan(&session)?;
        Ok(session)
    }

    fn confirm(&mut self) -> BenchResult<()> {
        self.reporter.prompt("Proceed? [Y/n] ")?;
        let mut answer = String::new();
        if self.input.read_line(&mut answer)? == 0 {
            return Err(BenchError::Aborted);
        }
        let answer = answer.trim().to_lowercase();
        if ABORT_ANSWERS.contains(&answer.as_str()) {
            return Err(BenchError::Aborted);
        }
        Ok(())
    }

    async fn prepare_namespace(&self, session: &Session) -> BenchResult<()> {
        self.cluster
            .ensure_namespace(&session_namespace(session))
            .await?;
        self.cluster
            .ensure_role_binding(&privileged_role_binding(session.namespace()))
            .await
    }

    fn waiter(&self) -> ReadinessWaiter<'_, C> {
        ReadinessWaiter::new(
            self.cluster,
            self.config.poll_interval(),
            self.config.max_read_failures,
        )
    }

    async fn start_server(&self, session: &Session) -> BenchResult<()> {
        let name = session.workload_name(Role::Server);
        self.cluster.create_pod(&server_pod(session)).await?;

        let readiness = self
            .waiter()
            .await_running(session.namespace(), &name, self.config.server_ready_timeout())
            .await?;
        if readiness == Readiness::Completed {
            // a one-off server that already exited cannot serve the client
            return Err(BenchError::WorkloadFailed {
                namespace: session.namespace().to_string(),
                pod: name,
                reason: Some("exited before the client started".to_string()),
            });
        }
        Ok(())
    }

    /// Read the address the server pod bound to
    #[instrument(skip(self, session))]
    async fn retrieve_bind_address(&self, session: &Session) -> BenchResult<IpAddr> {
        let namespace = session.namespace();
        let pod = session.workload_name(Role::Server);
        let command = vec!["cat".to_string(), BIND_ADDRESS_PATH.to_string()];

        let output = match self.cluster.exec(namespace, &pod, command).await {
            Ok(output) => output,
            Err(e @ BenchError::ArtifactRetrieval { .. }) => return Err(e),
            Err(e) => return Err(BenchError::artifact(namespace, &pod, e.to_string())),
        };

        let text = output.trim();
        if text.is_empty() {
            return Err(BenchError::artifact(
                namespace,
                &pod,
                format!("{BIND_ADDRESS_PATH} is empty"),
            ));
        }
        let address: IpAddr = text
            .parse()
            .map_err(|_| {
                BenchError::artifact(namespace, &pod, format!("'{text}' is not an IP address"))
            })?;

        info!(%address, "Server bound");
        Ok(address)
    }

    async fn start_client(&self, session: &Session, server_address: IpAddr) -> BenchResult<()> {
        let name = session.workload_name(Role::Client);
        self.cluster
            .create_pod(&client_pod(session, server_address))
            .await?;

        self.waiter()
            .await_running(session.namespace(), &name, self.config.client_ready_timeout())
            .await?;
        Ok(())
    }

    /// Relay the client log until the pod ends; returns the line count
    async fn stream_client(&mut self, session: &Session) -> BenchResult<usize> {
        let pod = session.workload_name(Role::Client);
        let mut lines = self.cluster.follow_logs(session.namespace(), &pod).await?;

        let mut count = 0;
        let mut first_error: Option<String> = None;
        while let Some(line) = lines.next().await {
            let line = line?;
            if first_error.is_none() && line.contains(IPERF_ERROR_MARKER) {
                first_error = Some(line.trim().to_string());
            }
            self.reporter.line(&line)?;
            count += 1;
        }

        if let Some(reason) = first_error {
            return Err(BenchError::BenchmarkFailed { pod, reason });
        }

        match self.cluster.observe_pod(session.namespace(), &pod).await {
            Ok(obs) if obs.phase == PodPhase::Failed => {
                return Err(BenchError::BenchmarkFailed {
                    pod,
                    reason: obs
                        .reason
                        .unwrap_or_else(|| "client pod failed".to_string()),
                });
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not read final client status"),
        }

        Ok(count)
    }
}
