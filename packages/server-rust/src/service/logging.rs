//! Structured logging decorator for [`FooService`].
//!
//! Every call runs inside a `svc_call` span carrying the operation, the
//! request metadata from [`RequestContext`], and the call's input fields.
//! When the call returns, exactly one event is emitted: `info` on success,
//! `error` on failure with the error's kind, message, and fields.

use std::future::Future;
use std::time::Instant;

use allsrv_core::{Foo, FooUpdate, RequestContext, Result};
use async_trait::async_trait;
use tower::Layer;
use tracing::field::Empty;
use tracing::{error, info, info_span, Instrument, Span};

use crate::traits::FooService;

// ---------------------------------------------------------------------------
// LoggingLayer
// ---------------------------------------------------------------------------

/// Tower layer producing [`LoggingService`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLayer;

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingService { inner }
    }
}

// ---------------------------------------------------------------------------
// LoggingService
// ---------------------------------------------------------------------------

/// Logs every call to the wrapped service. Never alters results.
#[derive(Debug, Clone)]
pub struct LoggingService<S> {
    inner: S,
}

impl<S> LoggingService<S> {
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

struct CallLog {
    op: &'static str,
    ok: &'static str,
    failed: &'static str,
}

const CREATE: CallLog = CallLog {
    op: "create",
    ok: "foo created successfully",
    failed: "failed to create foo",
};
const READ: CallLog = CallLog {
    op: "read",
    ok: "foo read successfully",
    failed: "failed to read foo",
};
const UPDATE: CallLog = CallLog {
    op: "update",
    ok: "foo updated successfully",
    failed: "failed to update foo",
};
const DELETE: CallLog = CallLog {
    op: "delete",
    ok: "foo deleted successfully",
    failed: "failed to delete foo",
};

fn call_span(log: &CallLog, ctx: &RequestContext) -> Span {
    info_span!(
        "svc_call",
        op = log.op,
        trace_id = %ctx.trace_id,
        origin = %ctx.origin,
        user_agent = %ctx.user_agent,
        input_id = Empty,
        input_name = Empty,
        input_note = Empty,
    )
}

fn no_id<T>(_: &T) -> Option<&str> {
    None
}

fn created_id(foo: &Foo) -> Option<&str> {
    Some(&foo.id)
}

async fn logged<T, F>(
    log: CallLog,
    span: Span,
    fut: F,
    new_id: fn(&T) -> Option<&str>,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    async move {
        let start = Instant::now();
        let result = fut.await;
        let took_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(value) => info!(
                took_ms,
                outcome = "ok",
                new_foo_id = new_id(value),
                "{}",
                log.ok
            ),
            Err(err) => error!(
                took_ms,
                outcome = "error",
                err_kind = %err.kind(),
                err = %err,
                err_fields = %err.fields_json(),
                "{}",
                log.failed
            ),
        }
        result
    }
    .instrument(span)
    .await
}

#[async_trait]
impl<S: FooService> FooService for LoggingService<S> {
    async fn create_foo(&self, ctx: &RequestContext, foo: Foo) -> Result<Foo> {
        let span = call_span(&CREATE, ctx);
        span.record("input_name", foo.name.as_str());
        span.record("input_note", foo.note.as_str());

        logged(CREATE, span, self.inner.create_foo(ctx, foo), created_id).await
    }

    async fn read_foo(&self, ctx: &RequestContext, id: &str) -> Result<Foo> {
        let span = call_span(&READ, ctx);
        span.record("input_id", id);
        logged(READ, span, self.inner.read_foo(ctx, id), no_id).await
    }

    async fn update_foo(&self, ctx: &RequestContext, upd: FooUpdate) -> Result<Foo> {
        let span = call_span(&UPDATE, ctx);
        span.record("input_id", upd.id.as_str());
        if let Some(name) = &upd.name {
            span.record("input_name", name.as_str());
        }
        if let Some(note) = &upd.note {
            span.record("input_note", note.as_str());
        }
        logged(UPDATE, span, self.inner.update_foo(ctx, upd), no_id).await
    }

    async fn delete_foo(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        let span = call_span(&DELETE, ctx);
        span.record("input_id", id);
        logged(DELETE, span, self.inner.delete_foo(ctx, id), no_id).await
    }
}
