//! HTTP handlers for the allsrv server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for building the router.

pub mod foos;
pub mod health;

pub use foos::{create_foo, delete_foo, read_foo, update_foo};
pub use health::{health_handler, liveness_handler, metrics_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::telemetry::SharedMetrics;
use crate::traits::FooService;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// The fully decorated foo service.
    pub svc: Arc<dyn FooService>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Metrics sink rendered by `/metrics`.
    pub metrics: SharedMetrics,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(svc: Arc<dyn FooService>, metrics: SharedMetrics) -> Self {
        Self {
            svc,
            shutdown: Arc::new(ShutdownController::new()),
            metrics,
            start_time: Instant::now(),
        }
    }
}
