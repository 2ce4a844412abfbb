//! Request-scoped OpenTelemetry tracing middleware for Tower services.
//!
//! This crate provides Tower layers that give every inbound HTTP request and
//! gRPC call its own server span, parented to the trace context propagated
//! by the caller. While a call is being handled, its trace id and the
//! caller's correlation identifier are available to logging through
//! [`log_context`], and they are removed again when the call finishes. The
//! span is always ended, whether the handler succeeds, fails, panics or is
//! abandoned.
//!
//! # Usage
//!
//! ```no_run
//! use axum::{Router, routing::get};
//! use opentelemetry_request_tower::{HttpTraceLayer, init_logging, log_context};
//!
//! async fn order() -> String {
//!     // Logged as `correlationId=... traceId=... INFO ...`
//!     tracing::info!("loading order");
//!     log_context::get(log_context::TRACE_ID_KEY).unwrap_or_default()
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging()?;
//!
//!     let app = Router::new()
//!         .route("/orders/{id}", get(order))
//!         .layer(HttpTraceLayer::new());
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Transports
//!
//! - **HTTP** ([`HttpTraceLayer`]): span named after the URI path, active
//!   until the response future completes.
//! - **gRPC** ([`GrpcTraceLayer`]): span named after the full method name,
//!   active while the inner service constructs its response future.
//!
//! Both read the upstream context through an OpenTelemetry
//! [`Extractor`](opentelemetry::propagation::Extractor) ([`HeaderCarrier`],
//! [`MetadataCarrier`]) and accept an attribute provider for custom span
//! attributes.
//!
//! # Configuration
//!
//! The correlation header name defaults to `correlationId` and can be set on
//! the builder or loaded with [`TracingConfig::load`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod attributes;
mod carrier;
mod config;
mod error;
mod future;
mod layer;
mod lifecycle;
mod service;

pub mod log_context;

pub use attributes::{Attributes, GrpcAttributeProvider, HttpAttributeProvider, NoAttributes};
pub use carrier::{HeaderCarrier, MetadataCarrier};
pub use config::{DEFAULT_CORRELATION_ID_HEADER, TracingConfig, TracingConfigBuilder};
pub use error::{AttributeError, BoxError, Result, TracingError};
pub use future::HttpTraceFuture;
pub use layer::{
    GRPC_TRACER_NAME, GrpcTraceLayer, HTTP_TRACER_NAME, HttpTraceLayer, TraceLayerBuilder,
};
pub use lifecycle::CORRELATION_ID_ATTRIBUTE;
pub use log_context::{CorrelatedFormat, LogEntries, init_logging};
pub use service::{GrpcTraceService, HttpTraceService};
