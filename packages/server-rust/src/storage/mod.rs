//! Foo persistence backends.
//!
//! - [`InMemoryStore`]: one mutex over the whole record set.
//! - [`SqliteStore`] (feature `sqlite`): relies on table constraints.
//! - [`ObservedStore`]: metrics and spans around any backend.

pub mod memory;
pub mod observe;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(test)]
pub(crate) mod conformance;

pub use memory::InMemoryStore;
pub use observe::ObservedStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
