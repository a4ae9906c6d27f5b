//! Store decorator recording per-operation metrics and spans.

use std::time::Instant;

use allsrv_core::{Foo, RequestContext, Result};
use async_trait::async_trait;
use tracing::{info_span, Instrument};

use crate::telemetry::{record_call, SharedMetrics, DB_DURATION, DB_ERRORS, DB_REQUESTS};
use crate::traits::FooStore;

/// Wraps a store, counting requests and errors and timing each call under
/// the backend's name (`memory`, `sqlite`). Results pass through untouched.
pub struct ObservedStore<S> {
    backend: &'static str,
    inner: S,
    metrics: SharedMetrics,
}

impl<S> ObservedStore<S> {
    #[must_use]
    pub fn new(backend: &'static str, inner: S, metrics: SharedMetrics) -> Self {
        Self {
            backend,
            inner,
            metrics,
        }
    }

    async fn observe<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let span = info_span!(
            "db_foo",
            otel.name = %format!("db_{}_foo_{op}", self.backend),
            db = self.backend,
            op,
        );
        let start = Instant::now();
        let result = fut.instrument(span).await;
        record_call(
            &self.metrics,
            [DB_REQUESTS, DB_ERRORS, DB_DURATION],
            &[("db", self.backend), ("op", op)],
            result.is_err(),
            start.elapsed(),
        );
        result
    }
}

#[async_trait]
impl<S: FooStore> FooStore for ObservedStore<S> {
    async fn create_foo(&self, ctx: &RequestContext, foo: &Foo) -> Result<()> {
        self.observe("create", self.inner.create_foo(ctx, foo)).await
    }

    async fn read_foo(&self, ctx: &RequestContext, id: &str) -> Result<Foo> {
        self.observe("read", self.inner.read_foo(ctx, id)).await
    }

    async fn update_foo(&self, ctx: &RequestContext, foo: &Foo) -> Result<()> {
        self.observe("update", self.inner.update_foo(ctx, foo)).await
    }

    async fn delete_foo(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        self.observe("delete", self.inner.delete_foo(ctx, id)).await
    }
}
