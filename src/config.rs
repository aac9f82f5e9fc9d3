use serde::Deserialize;
use std::time::Duration;

use crate::error::BenchResult;

/// Runtime tuning, read from `NETBENCH_*` environment variables
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_ready_timeout_secs")]
    pub server_ready_timeout_secs: u64,

    #[serde(default = "default_ready_timeout_secs")]
    pub client_ready_timeout_secs: u64,

    #[serde(default = "default_max_read_failures")]
    pub max_read_failures: u32,

    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_ready_timeout_secs() -> u64 {
    // image pulls on fresh nodes can be slow
    3600
}

fn default_max_read_failures() -> u32 {
    10
}

impl Config {
    pub fn load() -> BenchResult<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("NETBENCH").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn server_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.server_ready_timeout_secs)
    }

    pub fn client_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.client_ready_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            server_ready_timeout_secs: default_ready_timeout_secs(),
            client_ready_timeout_secs: default_ready_timeout_secs(),
            max_read_failures: default_max_read_failures(),
            log_format: LogFormat::default(),
        }
    }
}
