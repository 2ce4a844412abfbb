//! Call-scoped log correlation entries.
//!
//! While a traced call is active, its `traceId` (and `correlationId` when the
//! caller sent one) are readable from any code running on that call's behalf,
//! so log lines can be attributed to the right request. Entries are owned by
//! the call and only attached to the current thread while the call is being
//! driven: inside the inner service's `call` and during each poll of the
//! response future. Concurrent calls sharing worker threads therefore never
//! observe each other's entries.
//!
//! [`CorrelatedFormat`] renders the active entries at the start of every log
//! line emitted through `tracing-subscriber`'s fmt layer.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{Format, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Entry holding the hex trace identifier of the active span.
pub const TRACE_ID_KEY: &str = "traceId";

/// Entry holding the correlation identifier sent by the caller.
pub const CORRELATION_ID_KEY: &str = "correlationId";

thread_local! {
    static CURRENT: RefCell<Option<Arc<LogEntries>>> = const { RefCell::new(None) };
}

/// Key/value pairs exposed to logging for one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogEntries(BTreeMap<&'static str, String>);

impl LogEntries {
    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterates over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Returns `true` when no entry is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn insert(&mut self, key: &'static str, value: impl Into<String>) {
        self.0.insert(key, value.into());
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }
}

/// Returns the value of `key` for the call active on this thread.
///
/// ```
/// use opentelemetry_request_tower::log_context;
///
/// // Outside of a traced call nothing is set.
/// assert_eq!(log_context::get(log_context::TRACE_ID_KEY), None);
/// ```
pub fn get(key: &str) -> Option<String> {
    CURRENT
        .try_with(|current| {
            current
                .borrow()
                .as_ref()
                .and_then(|entries| entries.get(key).map(str::to_string))
        })
        .ok()
        .flatten()
}

/// Returns a copy of every entry for the call active on this thread.
pub fn snapshot() -> LogEntries {
    current().map(|entries| (*entries).clone()).unwrap_or_default()
}

fn current() -> Option<Arc<LogEntries>> {
    CURRENT
        .try_with(|current| current.borrow().clone())
        .ok()
        .flatten()
}

/// Makes `entries` current on this thread until the guard is dropped.
pub(crate) fn attach(entries: Arc<LogEntries>) -> LogEntriesGuard {
    let previous = CURRENT
        .try_with(|current| current.replace(Some(entries)))
        .ok()
        .flatten();

    LogEntriesGuard {
        previous,
        _marker: PhantomData,
    }
}

/// Restores the previously attached entries on drop.
#[must_use = "entries are detached as soon as the guard is dropped"]
pub(crate) struct LogEntriesGuard {
    previous: Option<Arc<LogEntries>>,
    // thread-local state, must stay on the attaching thread
    _marker: PhantomData<*const ()>,
}

impl Drop for LogEntriesGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let _ = CURRENT.try_with(|current| current.replace(previous));
    }
}

impl fmt::Debug for LogEntriesGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogEntriesGuard").finish_non_exhaustive()
    }
}

/// Event formatter that prefixes each line with the active log entries.
///
/// ```no_run
/// use opentelemetry_request_tower::CorrelatedFormat;
///
/// tracing_subscriber::fmt()
///     .event_format(CorrelatedFormat::new(tracing_subscriber::fmt::format().compact()))
///     .init();
/// ```
///
/// A line logged while a traced call is active renders as
/// `correlationId=abc-123 traceId=4bf92f35... <inner format>`.
#[derive(Debug, Clone, Default)]
pub struct CorrelatedFormat<F = Format> {
    inner: F,
}

impl<F> CorrelatedFormat<F> {
    /// Wraps an existing event formatter.
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

impl<S, N, F> FormatEvent<S, N> for CorrelatedFormat<F>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    F: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        if let Some(entries) = current() {
            for (key, value) in entries.iter() {
                write!(writer, "{key}={value} ")?;
            }
        }

        self.inner.format_event(ctx, writer, event)
    }
}

/// Installs a global fmt subscriber using [`CorrelatedFormat`].
///
/// Filtering follows `RUST_LOG`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging() -> crate::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(CorrelatedFormat::new(tracing_subscriber::fmt::format())),
        )
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;
    use tracing_subscriber::fmt::MakeWriter;

    fn entries(pairs: &[(&'static str, &str)]) -> Arc<LogEntries> {
        let mut entries = LogEntries::default();
        for (key, value) in pairs {
            entries.insert(*key, *value);
        }
        Arc::new(entries)
    }

    #[test]
    fn test_nothing_attached_outside_a_call() {
        assert_eq!(get(TRACE_ID_KEY), None);
        assert!(snapshot().is_empty());
    }

    #[test]
    fn test_attach_and_detach() {
        {
            let _guard = attach(entries(&[(TRACE_ID_KEY, "t1"), (CORRELATION_ID_KEY, "c1")]));
            assert_eq!(get(TRACE_ID_KEY).as_deref(), Some("t1"));
            assert_eq!(get(CORRELATION_ID_KEY).as_deref(), Some("c1"));
            assert_eq!(snapshot().len(), 2);
        }

        assert_eq!(get(TRACE_ID_KEY), None);
        assert_eq!(get(CORRELATION_ID_KEY), None);
    }

    #[test]
    fn test_nested_attach_restores_outer_entries() {
        let _outer = attach(entries(&[(TRACE_ID_KEY, "outer"), (CORRELATION_ID_KEY, "c")]));
        {
            let _inner = attach(entries(&[(TRACE_ID_KEY, "inner")]));
            assert_eq!(get(TRACE_ID_KEY).as_deref(), Some("inner"));
            assert_eq!(get(CORRELATION_ID_KEY), None);
        }

        assert_eq!(get(TRACE_ID_KEY).as_deref(), Some("outer"));
        assert_eq!(get(CORRELATION_ID_KEY).as_deref(), Some("c"));
    }

    #[test]
    fn test_entries_do_not_cross_threads() {
        let _guard = attach(entries(&[(TRACE_ID_KEY, "main")]));

        let seen = std::thread::spawn(|| get(TRACE_ID_KEY)).join().unwrap();
        assert_eq!(seen, None);
    }

    #[test]
    fn test_remove_entry() {
        let mut entries = LogEntries::default();
        entries.insert(TRACE_ID_KEY, "t");
        assert_eq!(entries.remove(TRACE_ID_KEY).as_deref(), Some("t"));
        assert_eq!(entries.remove(CORRELATION_ID_KEY), None);
        assert!(entries.is_empty());
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_correlated_format_prefixes_active_entries() {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .event_format(CorrelatedFormat::new(
                tracing_subscriber::fmt::format().without_time(),
            ))
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("outside");
            let _guard = attach(entries(&[(TRACE_ID_KEY, "abc"), (CORRELATION_ID_KEY, "xyz")]));
            tracing::info!("inside");
        });

        let output = capture.contents();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(!lines[0].contains("traceId="));
        assert!(lines[1].starts_with("correlationId=xyz traceId=abc "));
        assert!(lines[1].contains("inside"));
    }
}
