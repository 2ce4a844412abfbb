//! Request tracing workspace - end-to-end tests for the tracing middleware.
//!
//! This is a virtual package that provides workspace-level integration tests.
//! The actual functionality is provided by the workspace member crate:
//!
//! - `opentelemetry-request-tower`: Tower layers tracing inbound HTTP and gRPC
//!   calls with log correlation
//!
//! The harness in `tests/integration_harness.rs` serves a real axum
//! application over TCP and drives it with an HTTP client.
