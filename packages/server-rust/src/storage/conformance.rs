//! Behavioral suite every [`FooStore`] must pass.
//!
//! Each backend's test module calls [`run_all`] with a factory for a fresh,
//! empty store, plus the concurrency checks on a multi-thread runtime.

use std::future::Future;
use std::sync::Arc;

use allsrv_core::{ErrorKind, Foo, RequestContext};
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::traits::FooStore;

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap()
}

pub(crate) fn foo(id: &str, name: &str) -> Foo {
    Foo {
        id: id.to_string(),
        name: name.to_string(),
        note: format!("note for {name}"),
        created_at: t0(),
        updated_at: t0(),
    }
}

pub(crate) async fn run_all<F, Fut, S>(make: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
    S: FooStore,
{
    create_then_read(&make().await).await;
    duplicate_name_is_exists(&make().await).await;
    read_missing_is_not_found(&make().await).await;
    update_replaces_record(&make().await).await;
    update_missing_is_not_found(&make().await).await;
    update_name_collision_is_exists(&make().await).await;
    delete_removes_exactly_one(&make().await).await;
    delete_missing_is_not_found(&make().await).await;
    cancelled_context_is_rejected(&make().await).await;
}

async fn create_then_read<S: FooStore>(store: &S) {
    let ctx = RequestContext::background();
    let want = foo("1", "first_foo");
    store.create_foo(&ctx, &want).await.unwrap();

    let got = store.read_foo(&ctx, "1").await.unwrap();
    assert_eq!(got, want);
}

async fn duplicate_name_is_exists<S: FooStore>(store: &S) {
    let ctx = RequestContext::background();
    let existing = foo("9000", "existing-foo");
    store.create_foo(&ctx, &existing).await.unwrap();

    let err = store
        .create_foo(&ctx, &foo("1", "existing-foo"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Exists);

    assert_eq!(store.read_foo(&ctx, "9000").await.unwrap(), existing);
    let err = store.read_foo(&ctx, "1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

async fn read_missing_is_not_found<S: FooStore>(store: &S) {
    let err = store
        .read_foo(&RequestContext::background(), "nope")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

async fn update_replaces_record<S: FooStore>(store: &S) {
    let ctx = RequestContext::background();
    store.create_foo(&ctx, &foo("1", "first")).await.unwrap();

    let mut updated = foo("1", "renamed");
    updated.note = "new note".to_string();
    updated.updated_at = t0() + Duration::hours(1);
    store.update_foo(&ctx, &updated).await.unwrap();

    assert_eq!(store.read_foo(&ctx, "1").await.unwrap(), updated);

    // Keeping its own name is not a collision.
    store.update_foo(&ctx, &updated).await.unwrap();
}

async fn update_missing_is_not_found<S: FooStore>(store: &S) {
    let ctx = RequestContext::background();
    let err = store.update_foo(&ctx, &foo("1", "ghost")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = store.read_foo(&ctx, "1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

async fn update_name_collision_is_exists<S: FooStore>(store: &S) {
    let ctx = RequestContext::background();
    store.create_foo(&ctx, &foo("1", "a")).await.unwrap();
    store.create_foo(&ctx, &foo("2", "b")).await.unwrap();

    let err = store.update_foo(&ctx, &foo("2", "a")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Exists);
    assert_eq!(store.read_foo(&ctx, "2").await.unwrap().name, "b");
}

async fn delete_removes_exactly_one<S: FooStore>(store: &S) {
    let ctx = RequestContext::background();
    for (id, name) in [("1", "a"), ("2", "b"), ("3", "c")] {
        store.create_foo(&ctx, &foo(id, name)).await.unwrap();
    }

    store.delete_foo(&ctx, "2").await.unwrap();

    assert_eq!(store.read_foo(&ctx, "1").await.unwrap().name, "a");
    assert_eq!(store.read_foo(&ctx, "3").await.unwrap().name, "c");
    let err = store.read_foo(&ctx, "2").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // The freed name is available again.
    store.create_foo(&ctx, &foo("4", "b")).await.unwrap();
}

async fn delete_missing_is_not_found<S: FooStore>(store: &S) {
    let ctx = RequestContext::background();
    store.create_foo(&ctx, &foo("1", "a")).await.unwrap();
    store.delete_foo(&ctx, "1").await.unwrap();

    for id in ["1", "never-existed"] {
        let err = store.delete_foo(&ctx, id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

async fn cancelled_context_is_rejected<S: FooStore>(store: &S) {
    let ctx = RequestContext::new("cancelled");
    ctx.cancel();

    let err = store.create_foo(&ctx, &foo("1", "a")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);

    let live = RequestContext::background();
    let err = store.read_foo(&live, "1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

/// Eight creates racing on one name: exactly one wins.
pub(crate) async fn concurrent_same_name_creates<S: FooStore + 'static>(store: S) {
    let store = Arc::new(store);
    let mut handles = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .create_foo(&RequestContext::background(), &foo(&i.to_string(), "contested"))
                .await
        }));
    }

    let mut ok = 0;
    let mut exists = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => ok += 1,
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::Exists);
                exists += 1;
            }
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(exists, 7);
}

/// Five creates with distinct names: all succeed and all are readable.
pub(crate) async fn concurrent_distinct_creates<S: FooStore + 'static>(store: S) {
    let store = Arc::new(store);
    let mut handles = Vec::new();
    for i in 0..5 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let f = foo(&i.to_string(), &format!("foo-{i}"));
            store.create_foo(&RequestContext::background(), &f).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let ctx = RequestContext::background();
    for i in 0..5 {
        let got = store.read_foo(&ctx, &i.to_string()).await.unwrap();
        assert_eq!(got.name, format!("foo-{i}"));
    }
}
