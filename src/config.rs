use anyhow::{anyhow, Context};
use config::{Config as CConfig, Environment, Source};
use tokio::time::Duration;

const ENV_PREFIX: &str = "KINESIS_PRODUCER";

// Kinesis rejects partition keys longer than this.
const MAX_PARTITION_KEY_LEN: usize = 256;

// What the dispatcher does after a failed `put_record`: keep consuming, or stop the
// whole run. There is no retry variant, a retry after a lost answer would append the
// same identifier twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Continue,
    Abort,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub worker_threads: usize,
    pub profile: String,
    pub region: String,
    pub identifier_count: usize,
    pub interval_ms: u64,
    pub stream_name: String,
    pub partition_key: String,
    pub failure_policy: FailurePolicy,
    pub operation_timeout_ms: u64,
}

impl Config {
    // The file is optional: without it we run with the defaults below. Environment
    // variables (KINESIS_PRODUCER_STREAM_NAME, ...) are merged last, so they win
    // over whatever the file says.
    pub fn new(path: &str) -> anyhow::Result<Self> {
        Self::from_sources(
            config::File::with_name(path).required(false),
            Environment::with_prefix(ENV_PREFIX).try_parsing(true),
        )
    }

    fn from_sources<F, E>(file: F, env: E) -> anyhow::Result<Self>
    where
        F: Source + Send + Sync + 'static,
        E: Source + Send + Sync + 'static,
    {
        let config: Self = CConfig::builder()
            .add_source(file)
            .add_source(env)
            .build()
            .context("Error reading config sources")?
            .try_deserialize()
            .context("Error deserializing config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_threads == 0 {
            return Err(anyhow!("worker_threads must be greater than 0"));
        }
        if self.stream_name.is_empty() {
            return Err(anyhow!("stream_name must not be empty"));
        }
        if self.operation_timeout_ms == 0 {
            return Err(anyhow!("operation_timeout_ms must be greater than 0"));
        }
        if self.partition_key.is_empty() {
            return Err(anyhow!("partition_key must not be empty"));
        }
        if self.partition_key.chars().count() > MAX_PARTITION_KEY_LEN {
            return Err(anyhow!(
                "partition_key must have at most {} characters",
                MAX_PARTITION_KEY_LEN
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            // One thread for the generator, one for the dispatcher.
            worker_threads: 2,
            profile: "personal-account".to_string(),
            region: "us-east-1".to_string(),
            identifier_count: 5,
            interval_ms: 2000,
            stream_name: "KinesisLearning".to_string(),
            partition_key: "agenda-builder".to_string(),
            failure_policy: FailurePolicy::Continue,
            // Upper bound for one PutRecord, retries by the SDK included. Without it a
            // hanging request would keep the dispatcher in `submit` forever.
            operation_timeout_ms: 10_000,
        }
    }
}
