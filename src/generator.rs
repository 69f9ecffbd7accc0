use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::handoff::{HandoffClosed, HandoffSender};
use crate::identifier::{Identifier, IdentifierSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorReport {
    pub emitted: usize,
}

// Produces `count` identifiers, one every `interval`. We pause after each send and
// not before it, so the first identifier goes out immediately and a full run takes
// roughly `count * interval`.
pub struct Generator<S> {
    count: usize,
    interval: Duration,
    source: S,
}

impl<S: IdentifierSource> Generator<S> {
    pub fn new(count: usize, interval: Duration, source: S) -> Self {
        Self {
            count,
            interval,
            source,
        }
    }

    pub async fn run(
        mut self,
        tx: HandoffSender<Identifier>,
        token: CancellationToken,
    ) -> Result<GeneratorReport, PipelineError> {
        tracing::debug!(
            "Starting generator [count={}, interval={:?}]",
            self.count,
            self.interval
        );
        // `tx` is owned by this future, so returning from here (finished, cancelled or
        // failed) is what closes the channel and lets the dispatcher drain and stop.
        let mut emitted = 0;
        while emitted < self.count {
            let identifier = self
                .source
                .next_identifier()
                .map_err(|source| PipelineError::Generation { source })?;

            tracing::info!("##### STARTED PROCESSING MESSAGE");
            tracing::info!(index = emitted, "Inserting {} into channel", identifier);

            // Once the identifier is in the slot the dispatcher may take it at any
            // time, even after the token fires, so that is where we count it. This
            // keeps `emitted` an upper bound of what the dispatcher handled.
            let taken = tokio::select! {
                biased;
                offered = tx.offer(identifier) => match offered {
                    Ok(taken) => taken,
                    Err(err) => return stopped_or_failed(err, &token, emitted),
                },
                _ = token.cancelled() => {
                    tracing::warn!("Generator cancelled while waiting for a free slot");
                    break;
                }
            };
            emitted += 1;

            tokio::select! {
                biased;
                waited = taken.wait() => {
                    if let Err(err) = waited {
                        return stopped_or_failed(err, &token, emitted);
                    }
                }
                _ = token.cancelled() => {
                    tracing::warn!("Generator cancelled while waiting for the dispatcher");
                    break;
                }
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::warn!("Generator cancelled while pacing");
                    break;
                }
                _ = sleep(self.interval) => {}
            }
        }
        tracing::info!("Generator finished [emitted={}]", emitted);
        Ok(GeneratorReport { emitted })
    }
}

// A dispatcher that went away during a cancelled run is the expected way for the
// run to end, not an error of its own.
fn stopped_or_failed(
    err: HandoffClosed,
    token: &CancellationToken,
    emitted: usize,
) -> Result<GeneratorReport, PipelineError> {
    if token.is_cancelled() {
        tracing::warn!("Generator cancelled, dispatcher already gone [emitted={}]", emitted);
        Ok(GeneratorReport { emitted })
    } else {
        Err(err.into())
    }
}
