//! allsrv server: the foo service, its stores and decorators, the HTTP
//! pipeline, and an HTTP client speaking the same contract.

pub mod client;
pub mod config;
pub mod network;
pub mod service;
pub mod storage;
pub mod telemetry;
pub mod traits;

pub use client::HttpClient;
pub use config::{ConfigError, ServerArgs, StorageChoice};
pub use network::{NetworkConfig, NetworkModule};
pub use service::CoreService;
pub use telemetry::{Metrics, SharedMetrics};
pub use traits::{FooService, FooStore};
