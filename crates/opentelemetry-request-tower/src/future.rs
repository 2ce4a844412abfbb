//! Response future that keeps the call active until the response is ready.

use crate::lifecycle::ActiveCall;
use http::Response;
use opentelemetry::KeyValue;
use opentelemetry_semantic_conventions::attribute::HTTP_RESPONSE_STATUS_CODE;
use pin_project::pin_project;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

/// Future returned by [`HttpTraceService`](crate::HttpTraceService).
///
/// This future:
/// 1. Makes the call's span and log entries current while polling the inner
///    future, so handler code and its logs see them
/// 2. Records the response status (or the error) on the span
/// 3. Removes the log entries and ends the span
///
/// The output of the inner future is returned untouched. If the future is
/// dropped before completing, the span is still ended.
#[pin_project]
pub struct HttpTraceFuture<F> {
    #[pin]
    inner: F,
    call: Option<ActiveCall>,
}

impl<F> HttpTraceFuture<F> {
    pub(crate) fn new(inner: F, call: ActiveCall) -> Self {
        Self {
            inner,
            call: Some(call),
        }
    }
}

impl<F, B, E> Future for HttpTraceFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
    E: Display,
{
    type Output = Result<Response<B>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let result = {
            let _active = this.call.as_ref().map(ActiveCall::activate);
            ready!(this.inner.poll(cx))
        };

        if let Some(mut call) = this.call.take() {
            match &result {
                Ok(response) => {
                    let status = response.status();
                    call.span().set_attribute(KeyValue::new(
                        HTTP_RESPONSE_STATUS_CODE,
                        i64::from(status.as_u16()),
                    ));
                    if status.is_server_error() {
                        call.record_error(status.to_string());
                    }
                }
                Err(err) => call.record_error(err.to_string()),
            }
            call.finish();
        }

        Poll::Ready(result)
    }
}
