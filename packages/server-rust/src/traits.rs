use std::sync::Arc;

use allsrv_core::{Foo, FooUpdate, RequestContext, Result};
use async_trait::async_trait;

/// Pluggable persistence backend for foos.
/// Implementations: in-memory (default, tests), `SQLite` (feature `sqlite`).
///
/// Every implementation classifies its own failures: a name collision is
/// `Exists`, a missing id is `NotFound`, anything else is `Internal`.
#[async_trait]
pub trait FooStore: Send + Sync {
    /// Inserts a new foo. Fails with `Exists` if any live foo shares its name.
    async fn create_foo(&self, ctx: &RequestContext, foo: &Foo) -> Result<()>;

    /// Loads a foo by id. Fails with `NotFound` if absent.
    async fn read_foo(&self, ctx: &RequestContext, id: &str) -> Result<Foo>;

    /// Replaces the foo with the same id. Fails with `NotFound` if absent and
    /// with `Exists` if the new name belongs to a different foo.
    async fn update_foo(&self, ctx: &RequestContext, foo: &Foo) -> Result<()>;

    /// Removes exactly the foo with this id. Fails with `NotFound` if absent.
    async fn delete_foo(&self, ctx: &RequestContext, id: &str) -> Result<()>;
}

/// The foo business contract, shared by the core service, its decorators,
/// and the HTTP client.
#[async_trait]
pub trait FooService: Send + Sync {
    async fn create_foo(&self, ctx: &RequestContext, foo: Foo) -> Result<Foo>;

    async fn read_foo(&self, ctx: &RequestContext, id: &str) -> Result<Foo>;

    async fn update_foo(&self, ctx: &RequestContext, upd: FooUpdate) -> Result<Foo>;

    async fn delete_foo(&self, ctx: &RequestContext, id: &str) -> Result<()>;
}

#[async_trait]
impl<T: FooStore + ?Sized> FooStore for Arc<T> {
    async fn create_foo(&self, ctx: &RequestContext, foo: &Foo) -> Result<()> {
        (**self).create_foo(ctx, foo).await
    }

    async fn read_foo(&self, ctx: &RequestContext, id: &str) -> Result<Foo> {
        (**self).read_foo(ctx, id).await
    }

    async fn update_foo(&self, ctx: &RequestContext, foo: &Foo) -> Result<()> {
        (**self).update_foo(ctx, foo).await
    }

    async fn delete_foo(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        (**self).delete_foo(ctx, id).await
    }
}

#[async_trait]
impl<T: FooService + ?Sized> FooService for Arc<T> {
    async fn create_foo(&self, ctx: &RequestContext, foo: Foo) -> Result<Foo> {
        (**self).create_foo(ctx, foo).await
    }

    async fn read_foo(&self, ctx: &RequestContext, id: &str) -> Result<Foo> {
        (**self).read_foo(ctx, id).await
    }

    async fn update_foo(&self, ctx: &RequestContext, upd: FooUpdate) -> Result<Foo> {
        (**self).update_foo(ctx, upd).await
    }

    async fn delete_foo(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        (**self).delete_foo(ctx, id).await
    }
}
