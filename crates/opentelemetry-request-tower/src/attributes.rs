//! Pluggable span attribute providers.
//!
//! The embedding application supplies one provider per transport. Each is
//! invoked exactly once per intercepted call, after the correlation
//! identifier has been handled, and every returned pair is set on the span.
//! A provider may reuse a key the interceptor already set; the provider's
//! value wins.
//!
//! Closures with the matching signature implement the traits directly:
//!
//! ```
//! use opentelemetry_request_tower::{AttributeError, Attributes, HttpAttributeProvider};
//!
//! fn assert_provider<P: HttpAttributeProvider>(_: P) {}
//!
//! assert_provider(|parts: &http::request::Parts| -> Result<Attributes, AttributeError> {
//!     let mut attributes = Attributes::new();
//!     if let Some(tenant) = parts.headers.get("x-tenant").and_then(|v| v.to_str().ok()) {
//!         attributes.insert("tenant.id".to_string(), tenant.to_string());
//!     }
//!     Ok(attributes)
//! });
//! ```

use crate::error::AttributeError;
use http::request::Parts;
use std::collections::HashMap;
use tonic::metadata::MetadataMap;

/// Span attributes produced by a provider.
pub type Attributes = HashMap<String, String>;

/// Derives span attributes from an inbound HTTP request.
///
/// Implementations receive the request head (method, URI, headers,
/// extensions); the body is never exposed.
pub trait HttpAttributeProvider: Clone + Send + Sync + 'static {
    /// Returns the attributes to attach to the request span.
    ///
    /// # Errors
    ///
    /// A returned error is recorded on the span and logged; the request
    /// continues without custom attributes.
    fn attributes(&self, request: &Parts) -> Result<Attributes, AttributeError>;
}

/// Derives span attributes from inbound gRPC metadata.
pub trait GrpcAttributeProvider: Clone + Send + Sync + 'static {
    /// Returns the attributes to attach to the call span.
    ///
    /// # Errors
    ///
    /// A returned error is recorded on the span and logged; the call
    /// continues without custom attributes.
    fn attributes(&self, metadata: &MetadataMap) -> Result<Attributes, AttributeError>;
}

/// Provider that never adds attributes. Used when none is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAttributes;

impl HttpAttributeProvider for NoAttributes {
    fn attributes(&self, _request: &Parts) -> Result<Attributes, AttributeError> {
        Ok(Attributes::new())
    }
}

impl GrpcAttributeProvider for NoAttributes {
    fn attributes(&self, _metadata: &MetadataMap) -> Result<Attributes, AttributeError> {
        Ok(Attributes::new())
    }
}

impl<F> HttpAttributeProvider for F
where
    F: Fn(&Parts) -> Result<Attributes, AttributeError> + Clone + Send + Sync + 'static,
{
    fn attributes(&self, request: &Parts) -> Result<Attributes, AttributeError> {
        self(request)
    }
}

impl<F> GrpcAttributeProvider for F
where
    F: Fn(&MetadataMap) -> Result<Attributes, AttributeError> + Clone + Send + Sync + 'static,
{
    fn attributes(&self, metadata: &MetadataMap) -> Result<Attributes, AttributeError> {
        self(metadata)
    }
}
