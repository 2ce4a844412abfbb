//! HTTP server example with request tracing and log correlation.
//!
//! Every request gets a server span, and every log line emitted while it is
//! handled is prefixed with its `traceId` and `correlationId`.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=info cargo run --example http_server
//! curl -H 'correlationId: abc-123' http://127.0.0.1:3000/orders/5
//! ```

use axum::Router;
use axum::extract::Path;
use axum::routing::get;
use opentelemetry_request_tower::{
    AttributeError, Attributes, TraceLayerBuilder, TracingConfig, init_logging,
};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;

async fn order(Path(id): Path<u64>) -> String {
    tracing::info!(order_id = id, "loading order");
    format!("order {id}")
}

fn tenant_attributes(parts: &http::request::Parts) -> Result<Attributes, AttributeError> {
    let mut attributes = Attributes::new();
    if let Some(tenant) = parts.headers.get("x-tenant").and_then(|v| v.to_str().ok()) {
        attributes.insert("tenant.id".to_string(), tenant.to_string());
    }
    Ok(attributes)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging()?;

    let config = TracingConfig::load()?;
    let provider = SdkTracerProvider::builder().build();

    let layer = TraceLayerBuilder::new()
        .config(config)
        .tracer_provider(provider.clone())
        .propagator(TraceContextPropagator::new())
        .attribute_provider(tenant_attributes)
        .build_http();

    let app = Router::new()
        .route("/orders/{id}", get(order))
        .layer(layer);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await?;

    provider.shutdown()?;
    Ok(())
}
