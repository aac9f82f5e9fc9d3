//! Operator-facing output: the plan before a run, the benchmark stream during it

use std::io::{self, Write};

use crate::models::{Role, Session};

/// Outcome of a completed session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub namespace: String,
    pub server_pod: String,
    pub client_pod: String,
    pub server_address: std::net::IpAddr,
    pub lines: usize,
}

pub struct Reporter<W> {
    out: W,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Human-readable summary of the resolved plan
    pub fn plan(&mut self, session: &Session) -> io::Result<()> {
        let network = if session.host_network() {
            format!("{} (host network)", session.network_mode())
        } else {
            format!("{} (pod network)", session.network_mode())
        };

        writeln!(self.out, "Benchmark plan")?;
        writeln!(self.out, "  namespace:    {}", session.namespace())?;
        writeln!(
            self.out,
            "  server:       {} on node {}",
            session.workload_name(Role::Server),
            session.server().node
        )?;
        writeln!(
            self.out,
            "  client:       {} on node {}",
            session.workload_name(Role::Client),
            session.client().node
        )?;
        writeln!(self.out, "  network:      {network}")?;
        writeln!(self.out, "  bind target:  {}", session.bind())?;
        writeln!(self.out, "  protocol:     {}", session.protocol())?;
        writeln!(self.out, "  duration:     {}s", session.duration_secs())?;
        writeln!(self.out, "  image:        {}", session.image())?;
        self.out.flush()
    }

    pub fn prompt(&mut self, text: &str) -> io::Result<()> {
        write!(self.out, "{text}")?;
        self.out.flush()
    }

    /// Relay one line of benchmark output
    pub fn line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.out, "{line}")?;
        self.out.flush()
    }

    pub fn finished(&mut self, summary: &RunSummary) -> io::Result<()> {
        writeln!(
            self.out,
            "Benchmark finished: {} -> {} ({}). Pods remain in namespace {}.",
            summary.client_pod, summary.server_pod, summary.server_address, summary.namespace
        )?;
        self.out.flush()
    }
}
