//! The interception lifecycle shared by the HTTP and gRPC services.
//!
//! Every intercepted call moves through the same states:
//!
//! 1. The upstream context is extracted from the carrier.
//! 2. A server span is started under it, the correlation identifier is
//!    attached (span attribute and log entry) and the trace id is mirrored
//!    into the log entries.
//! 3. The attribute provider runs and its output is set on the span.
//! 4. The span and log entries are made current around the inner service
//!    through [`ActiveCall::activate`].
//! 5. [`ActiveCall::finish`] removes the log entries and ends the span.
//!
//! Step 5 is also performed by `Drop`, so it runs exactly once whether the
//! call completes, fails, panics or is abandoned mid-flight.

use crate::attributes::Attributes;
use crate::config::TracingConfig;
use crate::error::AttributeError;
use crate::log_context::{self, CORRELATION_ID_KEY, LogEntries, LogEntriesGuard, TRACE_ID_KEY};
use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry::trace::{SpanKind, SpanRef, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, ContextGuard, KeyValue};
use opentelemetry_semantic_conventions::attribute::EXCEPTION_MESSAGE;
use std::fmt;
use std::sync::Arc;

/// Span attribute carrying the caller's correlation identifier.
pub const CORRELATION_ID_ATTRIBUTE: &str = "trace.correlationId";

/// Tracer and propagation settings resolved once when a layer is built.
#[derive(Clone)]
pub(crate) struct TraceSettings {
    tracer: Arc<BoxedTracer>,
    propagator: Option<Arc<dyn TextMapPropagator + Send + Sync>>,
    correlation_key: Arc<str>,
}

impl TraceSettings {
    pub(crate) fn new(
        tracer: BoxedTracer,
        propagator: Option<Arc<dyn TextMapPropagator + Send + Sync>>,
        config: &TracingConfig,
    ) -> Self {
        Self {
            tracer: Arc::new(tracer),
            propagator,
            correlation_key: Arc::from(config.correlation_key()),
        }
    }

    pub(crate) fn correlation_key(&self) -> &str {
        &self.correlation_key
    }

    fn extract(&self, carrier: &dyn Extractor) -> Context {
        let current = Context::current();
        match &self.propagator {
            Some(propagator) => propagator.extract_with_context(&current, carrier),
            None => global::get_text_map_propagator(|propagator| {
                propagator.extract_with_context(&current, carrier)
            }),
        }
    }
}

impl fmt::Debug for TraceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceSettings")
            .field("correlation_key", &self.correlation_key)
            .field("explicit_propagator", &self.propagator.is_some())
            .finish_non_exhaustive()
    }
}

/// One traced call, from span start to span end.
pub(crate) struct ActiveCall {
    cx: Context,
    entries: Arc<LogEntries>,
    finished: bool,
}

impl ActiveCall {
    /// Extracts the upstream context, starts the span and applies the
    /// correlation identifier and provider attributes.
    ///
    /// `transport` holds attributes the interceptor sets itself; provider
    /// output is applied after them and wins on key collisions.
    pub(crate) fn begin<F>(
        settings: &TraceSettings,
        name: String,
        carrier: &dyn Extractor,
        mut transport: Vec<KeyValue>,
        provide: F,
    ) -> Self
    where
        F: FnOnce() -> Result<Attributes, AttributeError>,
    {
        let parent_cx = settings.extract(carrier);

        let correlation_id = carrier
            .get(settings.correlation_key())
            .map(str::to_string);
        if let Some(id) = &correlation_id {
            transport.push(KeyValue::new(CORRELATION_ID_ATTRIBUTE, id.clone()));
        }

        let span = settings
            .tracer
            .span_builder(name)
            .with_kind(SpanKind::Server)
            .start_with_context(settings.tracer.as_ref(), &parent_cx);
        let cx = parent_cx.with_span(span);

        let mut entries = LogEntries::default();
        if let Some(id) = correlation_id {
            entries.insert(CORRELATION_ID_KEY, id);
        }
        let trace_id = cx.span().span_context().trace_id().to_string();
        tracing::debug!(target: "request_tracing", trace_id = %trace_id, "span started");
        entries.insert(TRACE_ID_KEY, trace_id);

        // From here on a panic anywhere unwinds through `Drop`.
        let call = Self {
            cx,
            entries: Arc::new(entries),
            finished: false,
        };

        match provide() {
            Ok(attributes) => merge_attributes(&mut transport, attributes),
            Err(err) => call.record_attribute_error(&err),
        }
        // The SDK appends rather than replaces, so each key is set once.
        call.span().set_attributes(transport);

        call
    }

    /// Makes the span and log entries current until the returned guard drops.
    pub(crate) fn activate(&self) -> Activation {
        Activation {
            _entries: log_context::attach(Arc::clone(&self.entries)),
            _context: self.cx.clone().attach(),
        }
    }

    pub(crate) fn span(&self) -> SpanRef<'_> {
        self.cx.span()
    }

    /// Marks the span as failed without altering the call's outcome.
    pub(crate) fn record_error(&self, description: String) {
        self.span().set_status(Status::error(description));
    }

    /// Removes the log entries and ends the span. Later calls are no-ops.
    pub(crate) fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let entries = Arc::make_mut(&mut self.entries);
        entries.remove(TRACE_ID_KEY);
        entries.remove(CORRELATION_ID_KEY);

        self.span().end();
        tracing::debug!(target: "request_tracing", "span ended");
    }

    fn record_attribute_error(&self, err: &AttributeError) {
        tracing::warn!(
            target: "request_tracing",
            error = %err,
            "attribute provider failed, continuing without custom attributes"
        );

        let span = self.span();
        span.add_event(
            "attribute_provider.error",
            vec![KeyValue::new(EXCEPTION_MESSAGE, err.to_string())],
        );
        span.set_status(Status::error(err.to_string()));
    }
}

/// Applies provider output over `base`; a provider key replaces any earlier
/// value for the same key.
fn merge_attributes(base: &mut Vec<KeyValue>, attributes: Attributes) {
    for (key, value) in attributes {
        base.retain(|kv| kv.key.as_str() != key);
        base.push(KeyValue::new(key, value));
    }
}

impl Drop for ActiveCall {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for ActiveCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveCall")
            .field("entries", &self.entries)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// Scope during which a call's span and log entries are current.
#[must_use = "the call is deactivated as soon as the guard is dropped"]
pub(crate) struct Activation {
    _entries: LogEntriesGuard,
    _context: ContextGuard,
}
