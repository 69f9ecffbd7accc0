use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

mod config;
mod dispatcher;
mod error;
mod generator;
mod handoff;
mod identifier;
mod pipeline;
mod stream;

use crate::config::Config;
use crate::identifier::Uuids;
use crate::pipeline::Pipeline;
use crate::stream::KinesisStreamClient;

const CONFIG_FILE: &str = "config.toml";

fn main() -> anyhow::Result<()> {
    let config = Config::new(CONFIG_FILE).context("Error loading config")?;

    // RUST_LOG wins over the configured level so a single run can be made noisier
    // without touching the config file.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    // The runtime is built by hand because the worker count comes from the config.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()
        .context("Error building tokio runtime")?;
    runtime.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!("Running Kinesis Producer...");
    tracing::debug!("Loaded config: {:?}", config);

    let client =
        KinesisStreamClient::new(&config.profile, &config.region, config.operation_timeout())
            .await;
    let pipeline = Pipeline::new(config, Arc::new(client));

    let _exit_signal = {
        // The first Ctrl-C cancels the run: the generator stops emitting and the
        // dispatcher stops after the record it is currently streaming, if any. If that
        // record hangs, a second Ctrl-C halts the dispatcher right away and the record
        // is reported with an unknown outcome.
        let token = pipeline.cancellation_token();
        let halt = pipeline.halt_token();
        tokio::spawn(async move {
            loop {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    // The OS failed to register the handler, the run can still
                    // finish on its own.
                    tracing::debug!("{}", err);
                    break;
                }
                if token.is_cancelled() {
                    tracing::warn!("Ctrl-C received again, halting the run");
                    halt.cancel();
                    break;
                }
                tracing::info!("Ctrl-C received, cancelling the run (again to stop immediately)");
                token.cancel();
            }
        })
    };

    let report = pipeline.run(Uuids).await.context("Pipeline run failed")?;
    for delivery in &report.deliveries {
        tracing::debug!(
            "{} -> {} #{}",
            delivery.identifier,
            delivery.shard_id,
            delivery.sequence_number
        );
    }
    for failure in &report.failures {
        tracing::warn!("{} was not streamed: {:#}", failure.identifier, failure.error);
    }
    tracing::info!("{}", report);
    Ok(())
}
