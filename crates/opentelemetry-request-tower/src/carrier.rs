//! Read-only views over inbound transport carriers.
//!
//! Both adapters implement [`Extractor`], which is the lookup/enumeration
//! contract OpenTelemetry propagators consume. The interceptor reads the
//! correlation identifier through the same adapter, so header lookup rules
//! are identical for propagation and correlation.

use http::HeaderMap;
use opentelemetry::propagation::Extractor;
use tonic::metadata::{KeyRef, MetadataMap};

/// Adapter over HTTP request headers.
///
/// Lookups are case-insensitive. Values that are not visible ASCII resolve
/// to `None`.
#[derive(Debug, Clone, Copy)]
pub struct HeaderCarrier<'a>(&'a HeaderMap);

impl<'a> HeaderCarrier<'a> {
    /// Wraps a header map.
    pub fn new(headers: &'a HeaderMap) -> Self {
        Self(headers)
    }
}

impl Extractor for HeaderCarrier<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// Adapter over gRPC request metadata.
///
/// Only ASCII entries resolve; binary (`-bin`) keys are enumerated but never
/// return a value.
#[derive(Debug, Clone, Copy)]
pub struct MetadataCarrier<'a>(&'a MetadataMap);

impl<'a> MetadataCarrier<'a> {
    /// Wraps a metadata map.
    pub fn new(metadata: &'a MetadataMap) -> Self {
        Self(metadata)
    }
}

impl Extractor for MetadataCarrier<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0
            .keys()
            .map(|k| match k {
                KeyRef::Ascii(key) => key.as_str(),
                KeyRef::Binary(key) => key.as_str(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use tonic::metadata::{BinaryMetadataValue, MetadataValue};

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("correlationid", HeaderValue::from_static("abc-123"));

        let carrier = HeaderCarrier::new(&headers);
        assert_eq!(carrier.get("correlationId"), Some("abc-123"));
        assert_eq!(carrier.get("CORRELATIONID"), Some("abc-123"));
    }

    #[test]
    fn test_header_missing_key_is_none() {
        let headers = HeaderMap::new();
        let carrier = HeaderCarrier::new(&headers);

        assert_eq!(carrier.get("traceparent"), None);
        assert!(carrier.keys().is_empty());
    }

    #[test]
    fn test_header_invalid_name_is_none() {
        let headers = HeaderMap::new();
        let carrier = HeaderCarrier::new(&headers);

        assert_eq!(carrier.get("not a header"), None);
    }

    #[test]
    fn test_header_keys_enumerates_all_names() {
        let mut headers = HeaderMap::new();
        headers.insert("traceparent", HeaderValue::from_static("00-abc"));
        headers.insert("x-tenant", HeaderValue::from_static("acme"));

        let carrier = HeaderCarrier::new(&headers);
        let mut keys = carrier.keys();
        keys.sort_unstable();
        assert_eq!(keys, vec!["traceparent", "x-tenant"]);
    }

    #[test]
    fn test_header_opaque_value_is_not_validated() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "correlationid",
            HeaderValue::from_static("not/a uuid;at=all"),
        );

        let carrier = HeaderCarrier::new(&headers);
        assert_eq!(carrier.get("correlationId"), Some("not/a uuid;at=all"));
    }

    #[test]
    fn test_metadata_lookup() {
        let mut metadata = MetadataMap::new();
        metadata.insert("correlationid", MetadataValue::from_static("rpc-42"));

        let carrier = MetadataCarrier::new(&metadata);
        assert_eq!(carrier.get("correlationId"), Some("rpc-42"));
        assert_eq!(carrier.get("missing"), None);
    }

    #[test]
    fn test_metadata_binary_keys_enumerate_but_do_not_resolve() {
        let mut metadata = MetadataMap::new();
        metadata.insert("x-plain", MetadataValue::from_static("text"));
        metadata.insert_bin("x-blob-bin", BinaryMetadataValue::from_bytes(b"\x00\x01"));

        let carrier = MetadataCarrier::new(&metadata);
        let mut keys = carrier.keys();
        keys.sort_unstable();

        assert_eq!(keys, vec!["x-blob-bin", "x-plain"]);
        assert_eq!(carrier.get("x-blob-bin"), None);
    }
}
