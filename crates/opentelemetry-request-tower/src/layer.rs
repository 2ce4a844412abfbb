//! Tower layers for HTTP and gRPC request tracing.

use crate::attributes::NoAttributes;
use crate::config::TracingConfig;
use crate::lifecycle::TraceSettings;
use crate::service::{GrpcTraceService, HttpTraceService};
use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::sync::Arc;
use tower::Layer;

/// Instrumentation scope of spans created for HTTP requests.
pub const HTTP_TRACER_NAME: &str = "otel-tracer";

/// Instrumentation scope of spans created for gRPC calls.
pub const GRPC_TRACER_NAME: &str = "otel-grpc-tracer";

/// Tower layer that traces inbound HTTP requests.
///
/// Every request gets a server span named after its URI path, parented to
/// the context propagated by the caller. The caller's correlation header is
/// copied onto the span and, together with the trace id, exposed to logging
/// through [`log_context`](crate::log_context) for as long as the request is
/// being handled.
///
/// # Example
///
/// ```
/// use opentelemetry_request_tower::HttpTraceLayer;
/// use tower::ServiceBuilder;
///
/// let layer = HttpTraceLayer::builder()
///     .correlation_id_header("x-correlation-id")
///     .build_http();
///
/// let _builder = ServiceBuilder::new().layer(layer);
/// ```
#[derive(Clone, Debug)]
pub struct HttpTraceLayer<P = NoAttributes> {
    settings: TraceSettings,
    provider: P,
}

impl HttpTraceLayer {
    /// Creates a layer using the global tracer provider and propagator and
    /// the default configuration.
    pub fn new() -> Self {
        TraceLayerBuilder::new().build_http()
    }

    /// Creates a builder for more detailed configuration.
    pub fn builder() -> TraceLayerBuilder {
        TraceLayerBuilder::new()
    }
}

impl Default for HttpTraceLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, P> Layer<S> for HttpTraceLayer<P>
where
    P: Clone,
{
    type Service = HttpTraceService<S, P>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpTraceService::new(inner, self.settings.clone(), self.provider.clone())
    }
}

/// Tower layer that traces inbound gRPC calls.
///
/// Spans are named after the fully-qualified method (`package.Service/Method`)
/// and are active only while the wrapped service constructs its response
/// future.
///
/// ```
/// use opentelemetry_request_tower::GrpcTraceLayer;
///
/// let _layer = GrpcTraceLayer::new();
/// ```
#[derive(Clone, Debug)]
pub struct GrpcTraceLayer<P = NoAttributes> {
    settings: TraceSettings,
    provider: P,
}

impl GrpcTraceLayer {
    /// Creates a layer using the global tracer provider and propagator and
    /// the default configuration.
    pub fn new() -> Self {
        TraceLayerBuilder::new().build_grpc()
    }

    /// Creates a builder for more detailed configuration.
    pub fn builder() -> TraceLayerBuilder {
        TraceLayerBuilder::new()
    }
}

impl Default for GrpcTraceLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, P> Layer<S> for GrpcTraceLayer<P>
where
    P: Clone,
{
    type Service = GrpcTraceService<S, P>;

    fn layer(&self, inner: S) -> Self::Service {
        GrpcTraceService::new(inner, self.settings.clone(), self.provider.clone())
    }
}

/// Builder for [`HttpTraceLayer`] and [`GrpcTraceLayer`].
///
/// The tracer and propagator are resolved when `build_*` is called. Anything
/// left unset falls back to the globally registered provider or propagator
/// at that moment.
///
/// ```
/// use opentelemetry_request_tower::{AttributeError, Attributes, TraceLayerBuilder};
/// use opentelemetry_sdk::propagation::TraceContextPropagator;
/// use opentelemetry_sdk::trace::SdkTracerProvider;
///
/// let layer = TraceLayerBuilder::new()
///     .tracer_provider(SdkTracerProvider::builder().build())
///     .propagator(TraceContextPropagator::new())
///     .attribute_provider(|parts: &http::request::Parts| -> Result<Attributes, AttributeError> {
///         Ok(Attributes::from([("http.route".to_string(), parts.uri.path().to_string())]))
///     })
///     .build_http();
/// # let _ = layer;
/// ```
#[must_use = "builders do nothing unless a build method is called"]
pub struct TraceLayerBuilder<P = NoAttributes> {
    config: TracingConfig,
    provider: P,
    tracer_provider: Option<SdkTracerProvider>,
    propagator: Option<Arc<dyn TextMapPropagator + Send + Sync>>,
}

impl TraceLayerBuilder {
    /// Creates a builder with the default configuration and no attribute
    /// provider.
    pub fn new() -> Self {
        Self {
            config: TracingConfig::default(),
            provider: NoAttributes,
            tracer_provider: None,
            propagator: None,
        }
    }
}

impl Default for TraceLayerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> TraceLayerBuilder<P> {
    /// Replaces the whole configuration, e.g. with one from
    /// [`TracingConfig::load`].
    pub fn config(mut self, config: TracingConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the header (or metadata key) carrying the correlation identifier.
    ///
    /// Default: `correlationId`. A blank value keeps the default.
    pub fn correlation_id_header(mut self, header: impl Into<String>) -> Self {
        self.config.correlation_id_header = header.into();
        self
    }

    /// Sets the tracer provider spans are created with.
    ///
    /// If not set, the global tracer provider is used.
    pub fn tracer_provider(mut self, provider: SdkTracerProvider) -> Self {
        self.tracer_provider = Some(provider);
        self
    }

    /// Sets the propagator used to extract the upstream context.
    ///
    /// If not set, the global text map propagator is consulted on each call.
    pub fn propagator<T>(mut self, propagator: T) -> Self
    where
        T: TextMapPropagator + Send + Sync + 'static,
    {
        self.propagator = Some(Arc::new(propagator));
        self
    }

    /// Sets the provider of custom span attributes.
    ///
    /// Use an [`HttpAttributeProvider`](crate::HttpAttributeProvider) with
    /// [`build_http`](Self::build_http) and a
    /// [`GrpcAttributeProvider`](crate::GrpcAttributeProvider) with
    /// [`build_grpc`](Self::build_grpc).
    pub fn attribute_provider<Q>(self, provider: Q) -> TraceLayerBuilder<Q> {
        TraceLayerBuilder {
            config: self.config,
            provider,
            tracer_provider: self.tracer_provider,
            propagator: self.propagator,
        }
    }

    /// Builds the HTTP layer.
    pub fn build_http(self) -> HttpTraceLayer<P> {
        HttpTraceLayer {
            settings: self.settings(HTTP_TRACER_NAME),
            provider: self.provider,
        }
    }

    /// Builds the gRPC layer.
    pub fn build_grpc(self) -> GrpcTraceLayer<P> {
        GrpcTraceLayer {
            settings: self.settings(GRPC_TRACER_NAME),
            provider: self.provider,
        }
    }

    fn settings(&self, tracer_name: &'static str) -> TraceSettings {
        let tracer = match &self.tracer_provider {
            Some(provider) => BoxedTracer::new(Box::new(provider.tracer(tracer_name))),
            None => global::tracer(tracer_name),
        };
        TraceSettings::new(tracer, self.propagator.clone(), &self.config)
    }
}
