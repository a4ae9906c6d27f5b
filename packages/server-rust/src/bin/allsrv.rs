//! allsrv - foo service over HTTP.
//!
//! Configuration comes from flags or `ALLSRV_*` environment variables; see
//! `allsrv --help`.

use std::sync::Arc;

use allsrv_server::config::{ServerArgs, StorageChoice};
use allsrv_server::network::{AllowAll, Authenticator, BasicAuth, NetworkModule};
use allsrv_server::service::{CoreService, LoggingLayer, ObserveLayer};
use allsrv_server::storage::{InMemoryStore, ObservedStore};
use allsrv_server::telemetry::{init_tracing, Metrics, SharedMetrics};
use allsrv_server::traits::FooStore;
use anyhow::Context;
use clap::Parser;
use tower::ServiceBuilder;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    args.validate()?;
    init_tracing(args.log_format)?;

    let metrics = Metrics::shared();
    let store = open_store(&args.storage(), metrics.clone()).await?;

    // Outermost first.
    let svc = ServiceBuilder::new()
        .layer(LoggingLayer)
        .layer(ObserveLayer::new(metrics.clone()))
        .service(CoreService::new(store));

    let authenticator: Arc<dyn Authenticator> = match args.credentials() {
        Some((user, pass)) => Arc::new(BasicAuth::new(user, pass)),
        None => {
            warn!("basic auth disabled, every request is allowed");
            Arc::new(AllowAll)
        }
    };

    let mut module = NetworkModule::new(args.network_config(), Arc::new(svc), metrics)
        .with_authenticator(authenticator);
    let port = module
        .start()
        .await
        .with_context(|| format!("failed to bind {}:{}", args.host, args.port))?;
    info!(host = %args.host, port, "allsrv listening");

    module
        .serve(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(err = %err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}

async fn open_store(
    choice: &StorageChoice,
    metrics: SharedMetrics,
) -> anyhow::Result<Arc<dyn FooStore>> {
    match choice {
        StorageChoice::InMemory => {
            info!(db = "memory", "using in-memory store");
            Ok(Arc::new(ObservedStore::new(
                "memory",
                InMemoryStore::new(),
                metrics,
            )))
        }
        #[cfg(feature = "sqlite")]
        StorageChoice::Sqlite(dsn) => {
            let store = allsrv_server::storage::SqliteStore::connect(dsn)
                .await
                .context("failed to open sqlite store")?;
            store.migrate().await.context("failed to migrate sqlite store")?;
            info!(db = "sqlite", "using sqlite store");
            Ok(Arc::new(ObservedStore::new("sqlite", store, metrics)))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageChoice::Sqlite(_) => {
            anyhow::bail!("ALLSRV_SQLITE_DSN is set but allsrv was built without the sqlite feature")
        }
    }
}
