//! `SQLite`-backed [`FooStore`] on `sqlx`.
//!
//! Identity and name uniqueness are enforced by the table's primary key and
//! unique index. Constraint violations classify as `Exists`, statements that
//! touch zero rows classify as `NotFound`. Driver text never reaches an
//! error message; it is kept in the `cause` field for logs.

use allsrv_core::{Error, Foo, RequestContext, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteQueryResult,
};
use sqlx::{Row, Sqlite};
use tokio::sync::Mutex;

use crate::traits::FooStore;

const MIGRATION: &str = "CREATE TABLE IF NOT EXISTS foos (
    id         TEXT PRIMARY KEY NOT NULL,
    name       TEXT NOT NULL UNIQUE,
    note       TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

/// Foo store backed by a `SQLite` connection pool.
pub struct SqliteStore {
    pool: SqlitePool,
    // Serializes statement execution only. Reads go straight to the pool.
    exec_lock: Mutex<()>,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `dsn`, e.g. `sqlite://allsrv.db`.
    ///
    /// # Errors
    ///
    /// Returns an `Internal` error if the DSN is malformed or the database
    /// cannot be opened.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let opts: SqliteConnectOptions = dsn
            .parse()
            .map_err(|e| Error::internal_from("invalid sqlite dsn", e))?;
        let pool = SqlitePoolOptions::new()
            .connect_with(opts.create_if_missing(true))
            .await
            .map_err(|e| Error::internal_from("failed to open sqlite database", e))?;
        Ok(Self::from_pool(pool))
    }

    /// A private in-memory database. The pool keeps a single connection
    /// because every `SQLite` memory connection is its own database.
    ///
    /// # Errors
    ///
    /// Returns an `Internal` error if the connection cannot be opened.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| Error::internal_from("failed to open sqlite database", e))?;
        Ok(Self::from_pool(pool))
    }

    #[must_use]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            exec_lock: Mutex::new(()),
        }
    }

    /// Creates the `foos` table if it does not exist. Safe to run repeatedly.
    ///
    /// # Errors
    ///
    /// Returns an `Internal` error if the statement fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::internal_from("failed to migrate sqlite database", e))?;
        Ok(())
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn exec<'q>(
        &self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Result<SqliteQueryResult> {
        let _guard = self.exec_lock.lock().await;
        query.execute(&self.pool).await.map_err(classify)
    }
}

fn classify(err: sqlx::Error) -> Error {
    let unique = matches!(&err, sqlx::Error::Database(db) if db.is_unique_violation());
    if unique {
        let cause = err.to_string();
        return Error::exists("foo exists").with_field("cause", cause);
    }
    Error::internal_from("sqlite statement failed", err)
}

fn not_found(id: &str) -> Error {
    Error::not_found(format!("foo not found for id: {id}")).with_field("id", id)
}

#[async_trait]
impl FooStore for SqliteStore {
    async fn create_foo(&self, ctx: &RequestContext, foo: &Foo) -> Result<()> {
        ctx.check()?;

        let query = sqlx::query(
            "INSERT INTO foos (id, name, note, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&foo.id)
        .bind(&foo.name)
        .bind(&foo.note)
        .bind(foo.created_at)
        .bind(foo.updated_at);

        self.exec(query)
            .await
            .map_err(|e| e.with_field("name", foo.name.clone()))?;
        Ok(())
    }

    async fn read_foo(&self, ctx: &RequestContext, id: &str) -> Result<Foo> {
        ctx.check()?;

        let row = sqlx::query(
            "SELECT id, name, note, created_at, updated_at FROM foos WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::internal_from("failed to read foo", e).with_field("id", id))?
        .ok_or_else(|| not_found(id))?;

        let decode = |e: sqlx::Error| Error::internal_from("failed to decode foo row", e);
        Ok(Foo {
            id: row.try_get("id").map_err(decode)?,
            name: row.try_get("name").map_err(decode)?,
            note: row.try_get("note").map_err(decode)?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(decode)?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(decode)?,
        })
    }

    async fn update_foo(&self, ctx: &RequestContext, foo: &Foo) -> Result<()> {
        ctx.check()?;

        let query = sqlx::query("UPDATE foos SET name = ?, note = ?, updated_at = ? WHERE id = ?")
            .bind(&foo.name)
            .bind(&foo.note)
            .bind(foo.updated_at)
            .bind(&foo.id);

        let res = self
            .exec(query)
            .await
            .map_err(|e| e.with_field("id", foo.id.clone()))?;
        if res.rows_affected() == 0 {
            return Err(not_found(&foo.id));
        }
        Ok(())
    }

    async fn delete_foo(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        ctx.check()?;

        let query = sqlx::query("DELETE FROM foos WHERE id = ?").bind(id);
        let res = self
            .exec(query)
            .await
            .map_err(|e| e.with_field("id", id))?;
        if res.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }
}
