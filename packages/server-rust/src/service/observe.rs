//! Metrics and tracing decorator for [`FooService`].

use std::future::Future;
use std::time::Instant;

use allsrv_core::{Foo, FooUpdate, RequestContext, Result};
use async_trait::async_trait;
use tower::Layer;
use tracing::{info_span, Instrument};

use crate::telemetry::{record_call, SharedMetrics, SVC_DURATION, SVC_ERRORS, SVC_REQUESTS};
use crate::traits::FooService;

// ---------------------------------------------------------------------------
// ObserveLayer
// ---------------------------------------------------------------------------

/// Tower layer producing [`ObservedService`] over a shared metrics sink.
#[derive(Debug, Clone)]
pub struct ObserveLayer {
    metrics: SharedMetrics,
}

impl ObserveLayer {
    #[must_use]
    pub fn new(metrics: SharedMetrics) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for ObserveLayer {
    type Service = ObservedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ObservedService {
            inner,
            metrics: self.metrics.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// ObservedService
// ---------------------------------------------------------------------------

/// Counts requests and errors, times each call, and wraps it in a
/// `svc_foo_<op>` span. Never alters results.
#[derive(Debug, Clone)]
pub struct ObservedService<S> {
    inner: S,
    metrics: SharedMetrics,
}

impl<S> ObservedService<S> {
    async fn observe<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let span = info_span!("svc_foo", otel.name = %format!("svc_foo_{op}"), op);
        let start = Instant::now();
        let result = fut.instrument(span).await;
        record_call(
            &self.metrics,
            [SVC_REQUESTS, SVC_ERRORS, SVC_DURATION],
            &[("op", op)],
            result.is_err(),
            start.elapsed(),
        );
        result
    }
}

#[async_trait]
impl<S: FooService> FooService for ObservedService<S> {
    async fn create_foo(&self, ctx: &RequestContext, foo: Foo) -> Result<Foo> {
        self.observe("create", self.inner.create_foo(ctx, foo)).await
    }

    async fn read_foo(&self, ctx: &RequestContext, id: &str) -> Result<Foo> {
        self.observe("read", self.inner.read_foo(ctx, id)).await
    }

    async fn update_foo(&self, ctx: &RequestContext, upd: FooUpdate) -> Result<Foo> {
        self.observe("update", self.inner.update_foo(ctx, upd)).await
    }

    async fn delete_foo(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        self.observe("delete", self.inner.delete_foo(ctx, id)).await
    }
}
