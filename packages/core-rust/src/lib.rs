//! allsrv core: the foo domain, error taxonomy, request context, and the
//! resource codec shared by the HTTP server and client.

pub mod clock;
pub mod context;
pub mod error;
pub mod foo;
pub mod resource;

pub use clock::{Clock, IdGenerator, SequentialIds, SteppingClock, SystemClock, UuidGenerator};
pub use context::RequestContext;
pub use error::{is_kind, kind_of, Error, ErrorKind, Result};
pub use foo::{Foo, FooUpdate};
