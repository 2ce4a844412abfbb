//! Tower services that wrap HTTP and gRPC handlers with tracing.

use crate::attributes::{GrpcAttributeProvider, HttpAttributeProvider};
use crate::carrier::{HeaderCarrier, MetadataCarrier};
use crate::future::HttpTraceFuture;
use crate::lifecycle::{ActiveCall, TraceSettings};
use http::{Request, Response};
use opentelemetry::KeyValue;
use opentelemetry_semantic_conventions::attribute::{
    HTTP_REQUEST_METHOD, RPC_METHOD, RPC_SERVICE, RPC_SYSTEM, URL_PATH,
};
use std::fmt::Display;
use std::task::{Context, Poll};
use tonic::metadata::MetadataMap;
use tower::Service;

/// Tower service that traces HTTP requests.
///
/// For each request this service:
/// 1. Extracts the upstream trace context from the headers
/// 2. Starts a server span named after the URI path
/// 3. Records the correlation header and provider attributes on the span
/// 4. Calls the inner service with the span and log entries current
///
/// The returned [`HttpTraceFuture`] ends the span once the response is ready.
#[derive(Clone, Debug)]
pub struct HttpTraceService<S, P> {
    inner: S,
    settings: TraceSettings,
    provider: P,
}

impl<S, P> HttpTraceService<S, P> {
    pub(crate) fn new(inner: S, settings: TraceSettings, provider: P) -> Self {
        Self {
            inner,
            settings,
            provider,
        }
    }
}

impl<S, P, ReqBody, ResBody> Service<Request<ReqBody>> for HttpTraceService<S, P>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: Display,
    P: HttpAttributeProvider,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = HttpTraceFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let (parts, body) = request.into_parts();

        let path = parts.uri.path().to_string();
        let transport = vec![
            KeyValue::new(HTTP_REQUEST_METHOD, parts.method.as_str().to_string()),
            KeyValue::new(URL_PATH, path.clone()),
        ];

        let provider = &self.provider;
        let call = ActiveCall::begin(
            &self.settings,
            path,
            &HeaderCarrier::new(&parts.headers),
            transport,
            || HttpAttributeProvider::attributes(provider, &parts),
        );

        let request = Request::from_parts(parts, body);
        let future = {
            let _active = call.activate();
            self.inner.call(request)
        };

        HttpTraceFuture::new(future, call)
    }
}

/// Tower service that traces gRPC calls.
///
/// The span covers the inner service's `call`, i.e. the construction of the
/// response future. It is ended before the future is returned, so work done
/// while that future is polled is not part of the span.
#[derive(Clone, Debug)]
pub struct GrpcTraceService<S, P> {
    inner: S,
    settings: TraceSettings,
    provider: P,
}

impl<S, P> GrpcTraceService<S, P> {
    pub(crate) fn new(inner: S, settings: TraceSettings, provider: P) -> Self {
        Self {
            inner,
            settings,
            provider,
        }
    }
}

impl<S, P, ReqBody> Service<Request<ReqBody>> for GrpcTraceService<S, P>
where
    S: Service<Request<ReqBody>>,
    P: GrpcAttributeProvider,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let metadata = MetadataMap::from_headers(request.headers().clone());
        let method = full_method_name(request.uri().path());

        let mut transport = vec![KeyValue::new(RPC_SYSTEM, "grpc")];
        if let Some((service, name)) = method.split_once('/') {
            transport.push(KeyValue::new(RPC_SERVICE, service.to_string()));
            transport.push(KeyValue::new(RPC_METHOD, name.to_string()));
        }

        let provider = &self.provider;
        let mut call = ActiveCall::begin(
            &self.settings,
            method.to_string(),
            &MetadataCarrier::new(&metadata),
            transport,
            || GrpcAttributeProvider::attributes(provider, &metadata),
        );

        let future = {
            let _active = call.activate();
            self.inner.call(request)
        };

        call.finish();
        future
    }
}

/// `/package.Service/Method` becomes `package.Service/Method`.
fn full_method_name(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}
