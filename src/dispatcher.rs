use std::sync::Arc;

use anyhow::anyhow;

use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::FailurePolicy;
use crate::error::PipelineError;
use crate::handoff::HandoffReceiver;
use crate::identifier::Identifier;
use crate::stream::{PutRecordRequest, StreamClient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub identifier: Identifier,
    pub shard_id: String,
    pub sequence_number: String,
}

#[derive(Debug)]
pub struct SubmissionFailure {
    pub identifier: Identifier,
    pub error: anyhow::Error,
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub deliveries: Vec<Delivery>,
    pub failures: Vec<SubmissionFailure>,
}

// Single consumer of the handoff channel. Each identifier is submitted and awaited
// before the next one is taken, so the stream sees records in generation order and
// the generator is held back while a submission is in flight.
//
// We stop on two different signals. The regular cancellation token is only checked
// between records, so a record that is already on its way to the service gets its
// answer and ends up in the report either as a delivery or as a failure. The halt
// token also interrupts the in-flight `put_record`: the record is then reported as
// a failure whose outcome is unknown, since the service may or may not have
// appended it.
pub struct Dispatcher {
    client: Arc<dyn StreamClient>,
    stream_name: String,
    partition_key: String,
    failure_policy: FailurePolicy,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn StreamClient>,
        stream_name: String,
        partition_key: String,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            client,
            stream_name,
            partition_key,
            failure_policy,
        }
    }

    pub async fn run(
        self,
        rx: HandoffReceiver<Identifier>,
        token: CancellationToken,
        halt: CancellationToken,
    ) -> Result<DispatchReport, PipelineError> {
        tracing::debug!(
            "Starting dispatcher [stream={}, partition_key={}]",
            self.stream_name,
            self.partition_key
        );
        let mut report = DispatchReport::default();
        let mut identifiers = rx.into_stream();
        loop {
            // The token goes first: once it fired we don't take anything else out of
            // the channel, even if the generator left an identifier in the slot.
            let identifier = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::warn!("Dispatcher cancelled");
                    break;
                }
                next = identifiers.next() => match next {
                    Some(identifier) => identifier,
                    None => {
                        tracing::debug!("Handoff channel closed and drained");
                        break;
                    }
                },
            };
            tracing::info!("Channel received a new message: {}", identifier);

            let submitted = tokio::select! {
                biased;
                submitted = self.submit(&identifier) => submitted,
                _ = halt.cancelled() => {
                    tracing::warn!("Dispatcher halted while streaming {}, outcome unknown", identifier);
                    let error = anyhow!("interrupted before the service answered, outcome unknown");
                    report.failures.push(SubmissionFailure { identifier, error });
                    break;
                }
            };
            match submitted {
                Ok(delivery) => report.deliveries.push(delivery),
                Err(error) => {
                    tracing::error!("Streaming {} failed: {:#}", identifier, error);
                    match self.failure_policy {
                        FailurePolicy::Continue => {
                            report.failures.push(SubmissionFailure { identifier, error });
                        }
                        FailurePolicy::Abort => {
                            // Cancelling stops the generator too, and the error we
                            // return is what the pipeline reports for the whole run.
                            token.cancel();
                            return Err(PipelineError::Submission {
                                identifier,
                                source: error,
                            });
                        }
                    }
                }
            }
            tracing::info!("##### FINISHED PROCESSING MESSAGE");
        }
        tracing::info!(
            "Dispatcher finished [delivered={}, failed={}]",
            report.deliveries.len(),
            report.failures.len()
        );
        Ok(report)
    }

    async fn submit(&self, identifier: &Identifier) -> anyhow::Result<Delivery> {
        let request = PutRecordRequest {
            payload: identifier.as_bytes().to_vec(),
            partition_key: self.partition_key.clone(),
            stream_name: self.stream_name.clone(),
        };
        tracing::debug!(
            "Streaming {} to the partition key {} from the {} stream",
            identifier,
            self.partition_key,
            self.stream_name
        );
        let result = self.client.put_record(request).await?;
        tracing::info!(
            "{} streamed to shard {} with SequenceNumber {}",
            identifier,
            result.shard_id,
            result.sequence_number
        );
        Ok(Delivery {
            identifier: identifier.clone(),
            shard_id: result.shard_id,
            sequence_number: result.sequence_number,
        })
    }
}
