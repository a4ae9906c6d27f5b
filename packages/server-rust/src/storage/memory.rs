//! In-memory [`FooStore`] implementation.
//!
//! All four operations serialize on a single [`parking_lot::Mutex`] that
//! guards the whole record set. The lock is held for one scan-and-mutate
//! step and never across an `.await`, so a cancelled caller either applied
//! its mutation fully or not at all.

use std::collections::HashMap;

use allsrv_core::{Error, Foo, RequestContext, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::traits::FooStore;

/// Foos keyed by id. Name uniqueness is enforced by scanning under the lock.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    foos: Mutex<HashMap<String, Foo>>,
}

impl InMemoryStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live foos.
    #[must_use]
    pub fn len(&self) -> usize {
        self.foos.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.foos.lock().is_empty()
    }
}

fn name_taken(foos: &HashMap<String, Foo>, name: &str, except_id: &str) -> bool {
    foos.values().any(|f| f.name == name && f.id != except_id)
}

fn exists_err(name: &str) -> Error {
    Error::exists("foo exists").with_field("name", name)
}

fn not_found_err(id: &str) -> Error {
    Error::not_found(format!("foo not found for id: {id}")).with_field("id", id)
}

#[async_trait]
impl FooStore for InMemoryStore {
    async fn create_foo(&self, ctx: &RequestContext, foo: &Foo) -> Result<()> {
        ctx.check()?;

        let mut foos = self.foos.lock();
        if foos.contains_key(&foo.id) {
            return Err(Error::exists("foo exists").with_field("id", foo.id.clone()));
        }
        if name_taken(&foos, &foo.name, "") {
            return Err(exists_err(&foo.name));
        }
        foos.insert(foo.id.clone(), foo.clone());
        Ok(())
    }

    async fn read_foo(&self, ctx: &RequestContext, id: &str) -> Result<Foo> {
        ctx.check()?;

        self.foos
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| not_found_err(id))
    }

    async fn update_foo(&self, ctx: &RequestContext, foo: &Foo) -> Result<()> {
        ctx.check()?;

        let mut foos = self.foos.lock();
        if !foos.contains_key(&foo.id) {
            return Err(not_found_err(&foo.id));
        }
        if name_taken(&foos, &foo.name, &foo.id) {
            return Err(exists_err(&foo.name));
        }
        foos.insert(foo.id.clone(), foo.clone());
        Ok(())
    }

    async fn delete_foo(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        ctx.check()?;

        match self.foos.lock().remove(id) {
            Some(_) => Ok(()),
            None => Err(not_found_err(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::conformance;

    #[tokio::test]
    async fn conformance_suite() {
        conformance::run_all(|| async { InMemoryStore::new() }).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_same_name_creates() {
        conformance::concurrent_same_name_creates(InMemoryStore::new()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_distinct_creates() {
        conformance::concurrent_distinct_creates(InMemoryStore::new()).await;
    }

    #[tokio::test]
    async fn len_tracks_live_foos() {
        let store = InMemoryStore::new();
        let ctx = RequestContext::background();
        assert!(store.is_empty());

        store.create_foo(&ctx, &conformance::foo("1", "a")).await.unwrap();
        store.create_foo(&ctx, &conformance::foo("2", "b")).await.unwrap();
        assert_eq!(store.len(), 2);

        store.delete_foo(&ctx, "1").await.unwrap();
        assert_eq!(store.len(), 1);
    }
}
