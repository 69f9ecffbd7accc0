use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dispatcher::{Delivery, DispatchReport, Dispatcher, SubmissionFailure};
use crate::error::PipelineError;
use crate::generator::{Generator, GeneratorReport};
use crate::handoff;
use crate::identifier::IdentifierSource;
use crate::stream::StreamClient;

#[derive(Debug)]
pub struct RunReport {
    pub emitted: usize,
    pub deliveries: Vec<Delivery>,
    pub failures: Vec<SubmissionFailure>,
}

impl RunReport {
    fn new(generated: GeneratorReport, dispatched: DispatchReport) -> Self {
        Self {
            emitted: generated.emitted,
            deliveries: dispatched.deliveries,
            failures: dispatched.failures,
        }
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Generated {} identifiers, {} streamed, {} failed",
            self.emitted,
            self.deliveries.len(),
            self.failures.len()
        )
    }
}

// Wires one generator to one dispatcher through a rendezvous channel and waits for
// both of them.
//
// Stopping early goes through two tokens. `token` is the graceful one: both tasks
// stop at their next suspension point but a `put_record` already on the wire gets
// its answer. `halt` is its parent, so cancelling it also cancels `token`, and on
// top of that it drops the in-flight `put_record`, whose record is then reported as
// a failure with an unknown outcome.
pub struct Pipeline {
    config: Config,
    client: Arc<dyn StreamClient>,
    token: CancellationToken,
    halt: CancellationToken,
}

impl Pipeline {
    pub fn new(config: Config, client: Arc<dyn StreamClient>) -> Self {
        let halt = CancellationToken::new();
        Self {
            config,
            client,
            token: halt.child_token(),
            halt,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn halt_token(&self) -> CancellationToken {
        self.halt.clone()
    }

    pub async fn run<S>(self, source: S) -> Result<RunReport, PipelineError>
    where
        S: IdentifierSource + 'static,
    {
        let (tx, rx) = handoff::channel();
        let generator = Generator::new(
            self.config.identifier_count,
            self.config.interval(),
            source,
        );
        let dispatcher = Dispatcher::new(
            self.client,
            self.config.stream_name,
            self.config.partition_key,
            self.config.failure_policy,
        );

        let generated = tokio::spawn(generator.run(tx, self.token.clone()));
        let dispatched = tokio::spawn(dispatcher.run(rx, self.token.clone(), self.halt.clone()));
        let (generated, dispatched) = tokio::join!(generated, dispatched);

        // We look at the dispatcher first. When it aborts the run it cancels the token,
        // and the generator either stops quietly or finds the channel closed because the
        // receiver went away with the dispatcher. In both cases the submission error is
        // the one worth reporting, the generator's view of it is just a consequence.
        let dispatched = dispatched??;
        let generated = generated??;
        Ok(RunReport::new(generated, dispatched))
    }
}
