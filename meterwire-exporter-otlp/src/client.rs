//! The OTLP/gRPC metric export client.
//!
//! [`MetricsClient`] owns (or borrows) a gRPC channel to a collector and
//! ships one metric batch per [`MetricsClient::upload_metrics`] call, bounded
//! by a per-export deadline and carrying the configured outgoing headers.
//! Retry behavior is delegated to the injected [`Retry`] strategy.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::metrics_service_client::MetricsServiceClient;
use opentelemetry_proto::tonic::metrics::v1::ResourceMetrics;
use parking_lot::RwLock;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Request};
use tracing::{debug, info};

use meterwire_common::{
    Aggregation, AggregationSelector, InstrumentKind, Scope, Temporality, TemporalitySelector,
    default_aggregation, default_temporality,
};

use crate::config::OtlpConfig;
use crate::error::{ExportError, Result};
use crate::retry::{NoRetry, Retry};

/// The contract the export pipeline consumes.
///
/// The pipeline decides what to export and when; it serializes `shutdown`
/// against every other method and calls it at most once. `upload_metrics`
/// may run concurrently with itself and with the read-only methods.
pub trait Client: Send + Sync {
    /// Ship one metric batch to the collector.
    fn upload_metrics(
        &self,
        scope: &Scope,
        metrics: ResourceMetrics,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Flush buffered state. The client buffers nothing, so this only
    /// reports the scope's current error state.
    fn force_flush(&self, scope: &Scope) -> Result<()>;

    /// Release the client's resources. Closes the connection only when this
    /// client dialed it itself.
    fn shutdown(&self, scope: &Scope) -> Result<()>;

    /// The temporality to use for an instrument kind.
    fn temporality(&self, kind: InstrumentKind) -> Temporality;

    /// The aggregation to use for an instrument kind.
    fn aggregation(&self, kind: InstrumentKind) -> Aggregation;
}

/// Transport handle tagged with who owns its lifecycle.
///
/// Exactly one of the two owners ever exists: either this client dialed the
/// channel itself, or the caller supplied one and keeps responsibility for
/// closing it.
enum Connection {
    /// Dialed by this client; torn down on shutdown.
    Owned(Channel),
    /// Supplied by the caller; never torn down here.
    Borrowed(Channel),
}

impl Connection {
    fn channel(&self) -> &Channel {
        match self {
            Connection::Owned(channel) | Connection::Borrowed(channel) => channel,
        }
    }

    fn is_owned(&self) -> bool {
        matches!(self, Connection::Owned(_))
    }
}

/// Builder for [`MetricsClient`].
pub struct ClientBuilder<R = NoRetry> {
    config: OtlpConfig,
    retry: R,
    temporality: TemporalitySelector,
    aggregation: AggregationSelector,
    channel: Option<Channel>,
}

impl ClientBuilder<NoRetry> {
    /// Start a builder from configuration, with no retry strategy and the
    /// default selectors.
    pub fn new(config: OtlpConfig) -> Self {
        Self {
            config,
            retry: NoRetry,
            temporality: default_temporality,
            aggregation: default_aggregation,
            channel: None,
        }
    }
}

impl<R> ClientBuilder<R> {
    /// Replace the retry strategy.
    pub fn with_retry<S: Retry>(self, retry: S) -> ClientBuilder<S> {
        ClientBuilder {
            config: self.config,
            retry,
            temporality: self.temporality,
            aggregation: self.aggregation,
            channel: self.channel,
        }
    }

    /// Use an already-established channel instead of dialing the configured
    /// endpoint. The caller keeps ownership of the channel's lifecycle;
    /// shutdown will never close it.
    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Replace the temporality selector.
    pub fn with_temporality_selector(mut self, selector: TemporalitySelector) -> Self {
        self.temporality = selector;
        self
    }

    /// Replace the aggregation selector.
    pub fn with_aggregation_selector(mut self, selector: AggregationSelector) -> Self {
        self.aggregation = selector;
        self
    }

    /// Build the client, dialing the collector unless a channel was supplied.
    ///
    /// Dialing is bounded by `scope`; failure to establish the connection is
    /// fatal and no client is returned.
    pub async fn connect(self, scope: &Scope) -> Result<MetricsClient<R>>
    where
        R: Retry,
    {
        let headers = build_metadata(&self.config.headers)?;

        let connection = match self.channel {
            Some(channel) => {
                debug!("Using caller-supplied channel");
                Connection::Borrowed(channel)
            }
            None => {
                info!(endpoint = %self.config.endpoint, "Connecting to collector");
                let endpoint = Endpoint::from_shared(self.config.endpoint.clone())?
                    .connect_timeout(self.config.connect_timeout());
                let channel = scope.run(endpoint.connect()).await??;
                Connection::Owned(channel)
            }
        };

        let service = MetricsServiceClient::new(connection.channel().clone());

        Ok(MetricsClient {
            export_timeout: self.config.timeout(),
            retry: self.retry,
            temporality: self.temporality,
            aggregation: self.aggregation,
            state: RwLock::new(ClientState {
                headers,
                connection: Some(connection),
                service: Some(service),
            }),
        })
    }
}

/// Validate and convert configured headers into gRPC metadata.
fn build_metadata(headers: &HashMap<String, String>) -> Result<MetadataMap> {
    let mut metadata = MetadataMap::with_capacity(headers.len());
    for (name, value) in headers {
        let key: AsciiMetadataKey = name.parse().map_err(|_| ExportError::InvalidHeader {
            name: name.clone(),
        })?;
        let value: AsciiMetadataValue = value.parse().map_err(|_| ExportError::InvalidHeader {
            name: name.clone(),
        })?;
        metadata.insert(key, value);
    }
    Ok(metadata)
}

/// Per-upload execution context: a bounded child scope plus the outgoing
/// metadata every attempt carries. One context is derived per upload and
/// shared by all retry attempts; it never outlives the call.
struct ExportContext {
    scope: Scope,
    headers: MetadataMap,
}

impl ExportContext {
    /// Build one attempt's request. Metadata is attached when present and
    /// the remaining deadline is propagated to the server as grpc-timeout.
    fn request(&self, message: ExportMetricsServiceRequest) -> Request<ExportMetricsServiceRequest> {
        let mut request = Request::new(message);
        if !self.headers.is_empty() {
            *request.metadata_mut() = self.headers.clone();
        }
        if let Some(remaining) = self.scope.remaining() {
            request.set_timeout(remaining);
        }
        request
    }
}

/// State released on shutdown. Everything here is cleared unconditionally so
/// a dangling use after shutdown is immediately observable as
/// [`ExportError::Shutdown`].
struct ClientState {
    headers: MetadataMap,
    connection: Option<Connection>,
    service: Option<MetricsServiceClient<Channel>>,
}

/// OTLP/gRPC metric export client.
///
/// Construct with [`MetricsClient::builder`]. The caller is responsible for
/// serializing [`MetricsClient::shutdown`] against all other methods and
/// invoking it at most once; uploads may otherwise run concurrently, the
/// channel multiplexes them.
pub struct MetricsClient<R = NoRetry> {
    export_timeout: Option<Duration>,
    retry: R,
    temporality: TemporalitySelector,
    aggregation: AggregationSelector,
    state: RwLock<ClientState>,
}

impl MetricsClient<NoRetry> {
    /// Start building a client from configuration.
    pub fn builder(config: OtlpConfig) -> ClientBuilder<NoRetry> {
        ClientBuilder::new(config)
    }
}

impl<R: Retry> MetricsClient<R> {
    /// Derive the execution context for one upload: deadline of
    /// `now + export timeout` bounded by the parent's own deadline, or pure
    /// cancellation inheritance when the timeout is disabled.
    fn export_context(&self, parent: &Scope) -> ExportContext {
        let scope = match self.export_timeout {
            Some(timeout) => parent.child_with_timeout(timeout),
            None => parent.child(),
        };
        ExportContext {
            scope,
            headers: self.state.read().headers.clone(),
        }
    }

    /// Ship one metric batch to the collector through the retry strategy.
    ///
    /// Fails fast with the scope's error if `scope` has already given out,
    /// without touching the network. Every retry attempt reuses the same
    /// derived deadline; it is not re-derived per attempt.
    pub async fn upload_metrics(&self, scope: &Scope, metrics: ResourceMetrics) -> Result<()> {
        scope.check()?;

        let service = self
            .state
            .read()
            .service
            .clone()
            .ok_or(ExportError::Shutdown)?;
        let context = self.export_context(scope);
        let message = ExportMetricsServiceRequest {
            resource_metrics: vec![metrics],
        };

        debug!(deadline = ?context.scope.deadline(), "Uploading metric batch");

        self.retry
            .execute(&context.scope, || {
                let mut service = service.clone();
                let request = context.request(message.clone());
                let scope = &context.scope;
                async move {
                    match scope.run(service.export(request)).await {
                        Ok(Ok(_response)) => Ok(()),
                        // An error status carrying the OK code is no error.
                        Ok(Err(status)) if status.code() == Code::Ok => Ok(()),
                        Ok(Err(status)) => Err(ExportError::Rpc(status)),
                        Err(scope_err) => Err(scope_err.into()),
                    }
                }
            })
            .await
    }

    /// The client holds no buffered state; this reports only the scope's
    /// current error state and never performs I/O.
    pub fn force_flush(&self, scope: &Scope) -> Result<()> {
        scope.check().map_err(ExportError::from)
    }

    /// Release all resources the client holds.
    ///
    /// Headers and the service stub are cleared unconditionally. The
    /// connection is torn down only when this client dialed it; a
    /// caller-supplied channel is left untouched no matter how often this is
    /// called. A scope cancellation error takes precedence in the result,
    /// since it means the shutdown deadline itself was violated; transport
    /// teardown here is by drop and cannot fail.
    pub fn shutdown(&self, scope: &Scope) -> Result<()> {
        let connection = {
            let mut state = self.state.write();
            state.headers = MetadataMap::new();
            state.service = None;
            state.connection.take()
        };

        let result = scope.check();

        if let Some(connection) = connection
            && connection.is_owned()
        {
            info!("Closing owned collector connection");
            drop(connection);
        }

        result.map_err(ExportError::from)
    }

    /// The temporality to use for an instrument kind. Pure delegation to the
    /// configured selector; valid even after shutdown.
    pub fn temporality(&self, kind: InstrumentKind) -> Temporality {
        (self.temporality)(kind)
    }

    /// The aggregation to use for an instrument kind. Pure delegation to the
    /// configured selector; valid even after shutdown.
    pub fn aggregation(&self, kind: InstrumentKind) -> Aggregation {
        (self.aggregation)(kind)
    }
}

impl<R: Retry> Client for MetricsClient<R> {
    async fn upload_metrics(&self, scope: &Scope, metrics: ResourceMetrics) -> Result<()> {
        MetricsClient::upload_metrics(self, scope, metrics).await
    }

    fn force_flush(&self, scope: &Scope) -> Result<()> {
        MetricsClient::force_flush(self, scope)
    }

    fn shutdown(&self, scope: &Scope) -> Result<()> {
        MetricsClient::shutdown(self, scope)
    }

    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        MetricsClient::temporality(self, kind)
    }

    fn aggregation(&self, kind: InstrumentKind) -> Aggregation {
        MetricsClient::aggregation(self, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meterwire_common::ScopeError;

    fn lazy_channel() -> Channel {
        Endpoint::from_static("http://127.0.0.1:4317").connect_lazy()
    }

    async fn test_client(config: OtlpConfig) -> MetricsClient<NoRetry> {
        MetricsClient::builder(config)
            .with_channel(lazy_channel())
            .connect(&Scope::new())
            .await
            .unwrap()
    }

    #[test]
    fn test_build_metadata() {
        let mut headers = HashMap::new();
        headers.insert("authorization".to_string(), "Bearer abc".to_string());
        headers.insert("x-tenant".to_string(), "team-a".to_string());

        let metadata = build_metadata(&headers).unwrap();
        assert_eq!(metadata.len(), 2);
        assert_eq!(
            metadata.get("authorization").unwrap().to_str().unwrap(),
            "Bearer abc"
        );
    }

    #[test]
    fn test_build_metadata_rejects_invalid_name() {
        let mut headers = HashMap::new();
        headers.insert("bad header name".to_string(), "value".to_string());

        let result = build_metadata(&headers);
        assert!(matches!(
            result,
            Err(ExportError::InvalidHeader { name }) if name == "bad header name"
        ));
    }

    #[tokio::test]
    async fn test_connection_ownership_tags() {
        let owned = Connection::Owned(lazy_channel());
        let borrowed = Connection::Borrowed(lazy_channel());

        assert!(owned.is_owned());
        assert!(!borrowed.is_owned());
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_context_deadline_from_timeout() {
        let mut config = OtlpConfig::default();
        config.timeout_secs = 2;
        let client = test_client(config).await;

        let context = client.export_context(&Scope::new());
        assert_eq!(
            context.scope.deadline(),
            Some(tokio::time::Instant::now() + Duration::from_secs(2))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_context_bounded_by_parent_deadline() {
        let mut config = OtlpConfig::default();
        config.timeout_secs = 30;
        let client = test_client(config).await;

        let parent = Scope::with_timeout(Duration::from_secs(1));
        let context = client.export_context(&parent);
        assert_eq!(context.scope.deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn test_export_context_without_timeout_inherits_only_cancellation() {
        let mut config = OtlpConfig::default();
        config.timeout_secs = 0;
        let client = test_client(config).await;

        let context = client.export_context(&Scope::new());
        assert!(context.scope.deadline().is_none());
    }

    #[tokio::test]
    async fn test_request_carries_headers() {
        let context = ExportContext {
            scope: Scope::new(),
            headers: build_metadata(
                &[("x-tenant".to_string(), "team-a".to_string())]
                    .into_iter()
                    .collect(),
            )
            .unwrap(),
        };

        let request = context.request(ExportMetricsServiceRequest::default());
        assert_eq!(
            request.metadata().get("x-tenant").unwrap().to_str().unwrap(),
            "team-a"
        );
    }

    #[tokio::test]
    async fn test_upload_fails_fast_on_cancelled_scope() {
        let client = test_client(OtlpConfig::default()).await;

        let scope = Scope::new();
        scope.cancel();

        let result = client
            .upload_metrics(&scope, ResourceMetrics::default())
            .await;
        assert!(matches!(
            result,
            Err(ExportError::Scope(ScopeError::Cancelled))
        ));
    }

    #[tokio::test]
    async fn test_force_flush_reports_scope_state() {
        let client = test_client(OtlpConfig::default()).await;

        assert!(client.force_flush(&Scope::new()).is_ok());

        let cancelled = Scope::new();
        cancelled.cancel();
        assert!(matches!(
            client.force_flush(&cancelled),
            Err(ExportError::Scope(ScopeError::Cancelled))
        ));
    }

    #[tokio::test]
    async fn test_upload_after_shutdown_is_observable() {
        let client = test_client(OtlpConfig::default()).await;

        client.shutdown(&Scope::new()).unwrap();

        let result = client
            .upload_metrics(&Scope::new(), ResourceMetrics::default())
            .await;
        assert!(matches!(result, Err(ExportError::Shutdown)));
    }

    #[tokio::test]
    async fn test_shutdown_with_cancelled_scope_reports_cancellation() {
        let client = test_client(OtlpConfig::default()).await;

        let scope = Scope::new();
        scope.cancel();

        let result = client.shutdown(&scope);
        assert!(matches!(
            result,
            Err(ExportError::Scope(ScopeError::Cancelled))
        ));
    }

    #[tokio::test]
    async fn test_selectors_remain_valid_after_shutdown() {
        let client = test_client(OtlpConfig::default()).await;
        client.shutdown(&Scope::new()).unwrap();

        assert_eq!(
            client.temporality(InstrumentKind::Counter),
            Temporality::Cumulative
        );
        assert_eq!(client.aggregation(InstrumentKind::Counter), Aggregation::Sum);
    }
}
