use anyhow::Context;
use clap::Parser;
use std::io::{self, BufReader};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use netbench::{
    cli::Cli,
    config::{Config, LogFormat},
    error::BenchResult,
    k8s::K8sClient,
    models::SessionRequest,
    session::{Coordinator, Reporter},
};

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    // stdout carries the plan and the benchmark stream
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .try_init(),
    }
    .context("Failed to initialize tracing")
}

async fn run(request: SessionRequest, config: Config) -> BenchResult<()> {
    let k8s = K8sClient::new().await?;

    let reporter = Reporter::new(io::stdout());
    let input = BufReader::new(io::stdin());
    let mut coordinator = Coordinator::new(&k8s, &config, reporter, input);
    coordinator.run(&request).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error [{}]: {}", e.category(), e);
            return ExitCode::from(e.category().exit_code());
        }
    };

    if let Err(e) = init_tracing(config.log_format) {
        eprintln!("error: {e:#}");
        return ExitCode::FAILURE;
    }

    tracing::info!("Starting NetBench");

    match run(SessionRequest::from(cli), config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(category = %e.category(), "Session failed");
            eprintln!("error [{}]: {}", e.category(), e);
            ExitCode::from(e.category().exit_code())
        }
    }
}
