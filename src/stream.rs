use anyhow::{anyhow, Context};
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_kinesis::config::Region;
use aws_sdk_kinesis::error::DisplayErrorContext;
use aws_sdk_kinesis::primitives::Blob;
use tokio::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecordRequest {
    pub payload: Vec<u8>,
    pub partition_key: String,
    pub stream_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecordResult {
    pub shard_id: String,
    pub sequence_number: String,
}

// The only thing the dispatcher needs from the remote stream. We keep it behind a
// trait so the pipeline can be driven by an in-memory client in tests, the real one
// talks to Kinesis through the AWS SDK.
#[async_trait::async_trait]
pub trait StreamClient: Send + Sync {
    async fn put_record(&self, request: PutRecordRequest) -> anyhow::Result<PutRecordResult>;
}

pub struct KinesisStreamClient {
    client: aws_sdk_kinesis::Client,
}

impl KinesisStreamClient {
    // Credentials come from the given shared-config profile. The loader is lazy, so a
    // missing profile only shows up when the first record is sent. The operation
    // timeout covers the whole call, retries included, so a request that never gets
    // an answer turns into a failed submission instead of blocking the dispatcher.
    pub async fn new(profile: &str, region: &str, operation_timeout: Duration) -> Self {
        tracing::debug!(profile, region, ?operation_timeout, "Loading AWS shared config");
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(profile)
            .region(Region::new(region.to_string()))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(operation_timeout)
                    .build(),
            )
            .load()
            .await;
        Self::from_client(aws_sdk_kinesis::Client::new(&shared))
    }

    pub fn from_client(client: aws_sdk_kinesis::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl StreamClient for KinesisStreamClient {
    async fn put_record(&self, request: PutRecordRequest) -> anyhow::Result<PutRecordResult> {
        let stream_name = request.stream_name.clone();
        let output = self
            .client
            .put_record()
            .stream_name(request.stream_name)
            .partition_key(request.partition_key)
            .data(Blob::new(request.payload))
            .send()
            .await
            .map_err(|err| anyhow!("{}", DisplayErrorContext(err)))
            .with_context(|| format!("PutRecord to stream {} failed", stream_name))?;
        Ok(PutRecordResult {
            shard_id: output.shard_id().to_string(),
            sequence_number: output.sequence_number().to_string(),
        })
    }
}


#[cfg(test)]
mod tests {
    use aws_sdk_kinesis::config::Credentials;
    use aws_smithy_runtime::client::http::test_util::{NeverClient, ReplayEvent, StaticReplayClient};
    use aws_smithy_runtime_api::client::http::HttpClient;
    use aws_smithy_runtime_api::http::{Request, Response, StatusCode};
    use aws_smithy_types::body::SdkBody;

    use super::*;

    fn kinesis(http_client: impl HttpClient + 'static, operation_timeout: Duration) -> KinesisStreamClient {
        let config = aws_sdk_kinesis::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("akid", "secret", None, None, "test"))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(operation_timeout)
                    .build(),
            )
            .http_client(http_client)
            .build();
        KinesisStreamClient::from_client(aws_sdk_kinesis::Client::from_conf(config))
    }

    fn replay(status: u16, body: &'static str) -> StaticReplayClient {
        // Requests are recorded, not matched, so the expected one is only a placeholder.
        let request = Request::new(SdkBody::empty());
        let mut response = Response::new(StatusCode::try_from(status).unwrap(), SdkBody::from(body));
        response
            .headers_mut()
            .insert("content-type", "application/x-amz-json-1.1");
        StaticReplayClient::new(vec![ReplayEvent::new(request, response)])
    }

    fn request(payload: &str) -> PutRecordRequest {
        PutRecordRequest {
            payload: payload.as_bytes().to_vec(),
            partition_key: "agenda-builder".to_string(),
            stream_name: "KinesisLearning".to_string(),
        }
    }

    #[tokio::test]
    async fn put_record_sends_stream_key_and_payload() {
        let http = replay(
            200,
            r#"{"ShardId":"shardId-000000000001","SequenceNumber":"49590338271490256608559692538361571095921575989136588898"}"#,
        );
        let client = kinesis(http.clone(), Duration::from_secs(5));

        let result = client.put_record(request("abc")).await.unwrap();
        assert_eq!(result.shard_id, "shardId-000000000001");
        assert_eq!(
            result.sequence_number,
            "49590338271490256608559692538361571095921575989136588898"
        );

        let sent = http.actual_requests().collect::<Vec<_>>();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].headers().get("x-amz-target"),
            Some("Kinesis_20131202.PutRecord")
        );
        let body: serde_json::Value =
            serde_json::from_slice(sent[0].body().bytes().unwrap()).unwrap();
        assert_eq!(body["StreamName"], "KinesisLearning");
        assert_eq!(body["PartitionKey"], "agenda-builder");
        // Blobs travel base64 encoded.
        assert_eq!(body["Data"], "YWJj");
    }

    #[tokio::test]
    async fn service_error_names_the_stream() {
        let http = replay(
            400,
            r#"{"__type":"ResourceNotFoundException","message":"Stream KinesisLearning under account 123456789012 not found."}"#,
        );
        let client = kinesis(http, Duration::from_secs(5));

        let err = client.put_record(request("abc")).await.unwrap_err();
        let chain = format!("{:#}", err);
        assert!(chain.starts_with("PutRecord to stream KinesisLearning failed"));
        assert!(chain.contains("ResourceNotFoundException"));
    }

    #[tokio::test]
    async fn unanswered_request_hits_the_operation_timeout() {
        let client = kinesis(NeverClient::new(), Duration::from_millis(50));

        let err = client.put_record(request("abc")).await.unwrap_err();
        assert!(format!("{:#}", err).contains("timed out"));
    }

    #[tokio::test]
    async fn shared_config_carries_the_operation_timeout() {
        let client =
            KinesisStreamClient::new("personal-account", "eu-west-1", Duration::from_millis(1500))
                .await;
        let config = client.client.config();
        assert_eq!(config.region().map(|r| r.as_ref()), Some("eu-west-1"));
        assert_eq!(
            config.timeout_config().and_then(|t| t.operation_timeout()),
            Some(Duration::from_millis(1500))
        );
    }
}
