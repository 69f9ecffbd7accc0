use crate::handoff::HandoffClosed;
use crate::identifier::Identifier;

// The messages below never repeat their source: callers print the whole chain with
// `{:#}`, which already appends it.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("identifier generation failed")]
    Generation { source: anyhow::Error },

    #[error("submission of {identifier} failed")]
    Submission {
        identifier: Identifier,
        source: anyhow::Error,
    },

    #[error(transparent)]
    HandoffClosed(#[from] HandoffClosed),

    #[error("pipeline task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn chain_mentions_the_cause_once() {
        let err = PipelineError::Submission {
            identifier: Identifier::new("a"),
            source: anyhow!("ProvisionedThroughputExceededException"),
        };
        assert_eq!(err.to_string(), "submission of a failed");

        let chain = format!("{:#}", anyhow::Error::new(err).context("Pipeline run failed"));
        assert_eq!(
            chain,
            "Pipeline run failed: submission of a failed: ProvisionedThroughputExceededException"
        );
        assert_eq!(chain.matches("ProvisionedThroughputExceededException").count(), 1);
    }

    #[test]
    fn generation_keeps_its_source() {
        let err = PipelineError::Generation {
            source: anyhow!("entropy source unavailable"),
        };
        assert_eq!(err.to_string(), "identifier generation failed");
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("entropy source unavailable"));
    }
}
