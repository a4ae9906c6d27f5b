//! HTTP transport: configuration, request pipeline, handlers, and lifecycle.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod response;
pub mod shutdown;

pub use config::*;
pub use handlers::AppState;
pub use middleware::{AllowAll, Authenticator, BasicAuth, TRACE_ID_HEADER};
pub use module::{build_router, NetworkModule};
pub use shutdown::*;
