//! Foo business service and its decorators.
//!
//! [`CoreService`] holds the business rules: input validation, identity and
//! timestamp assignment, and read-modify-write updates. It knows nothing of
//! logging, metrics, or transport. Cross-cutting behavior lives in
//! same-contract decorators:
//!
//! - [`logging`]: one structured `tracing` event per call
//! - [`observe`]: metrics and a span per call
//!
//! Each decorator also ships a `tower::Layer`, so the chain composes with
//! `tower::ServiceBuilder` in whatever order the caller picks.

pub mod logging;
pub mod observe;

use std::sync::Arc;

use allsrv_core::{
    Clock, Error, Foo, FooUpdate, IdGenerator, RequestContext, Result, SystemClock, UuidGenerator,
};
use async_trait::async_trait;

pub use logging::{LoggingLayer, LoggingService};
pub use observe::{ObserveLayer, ObservedService};

use crate::traits::{FooService, FooStore};

/// The undecorated foo service.
pub struct CoreService<S> {
    store: S,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl<S: FooStore> CoreService<S> {
    /// Creates a service over `store` with UUID v4 ids and the system clock.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            ids: Arc::new(UuidGenerator),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the id source.
    #[must_use]
    pub fn with_ids(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }
}

fn id_required() -> Error {
    Error::invalid("foo id is required")
}

#[async_trait]
impl<S: FooStore> FooService for CoreService<S> {
    async fn create_foo(&self, ctx: &RequestContext, mut foo: Foo) -> Result<Foo> {
        ctx.check()?;
        foo.validate()?;

        let now = self.clock.now();
        foo.id = self.ids.next_id();
        foo.created_at = now;
        foo.updated_at = now;

        self.store.create_foo(ctx, &foo).await?;
        Ok(foo)
    }

    async fn read_foo(&self, ctx: &RequestContext, id: &str) -> Result<Foo> {
        ctx.check()?;
        if id.is_empty() {
            return Err(id_required());
        }
        self.store.read_foo(ctx, id).await
    }

    async fn update_foo(&self, ctx: &RequestContext, upd: FooUpdate) -> Result<Foo> {
        ctx.check()?;
        upd.validate()?;

        let mut existing = self.store.read_foo(ctx, &upd.id).await?;
        existing.apply(&upd);
        existing.updated_at = self.clock.now();

        self.store.update_foo(ctx, &existing).await?;
        Ok(existing)
    }

    async fn delete_foo(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        ctx.check()?;
        if id.is_empty() {
            return Err(id_required());
        }
        self.store.delete_foo(ctx, id).await
    }
}
