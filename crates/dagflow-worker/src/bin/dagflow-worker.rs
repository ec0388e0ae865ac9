//! Worker binary: starts the stateless HTTP service `dagflow-exec`'s
//! `RemoteExecutor` talks to. Default port 63578, matching the engine's
//! default worker endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use dagflow_dataframe::DataFusionAdapter;
use dagflow_exec::FsCache;
use dagflow_worker::{router, WorkerState};

#[derive(Parser, Debug)]
#[command(name = "dagflow-worker")]
#[command(about = "Stateless HTTP worker for remote compute_and_cache/sample/row_count tasks")]
struct Args {
    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "0.0.0.0:63578")]
    bind: SocketAddr,

    /// Directory backing the content-addressed result cache, shared over
    /// the wire with the engine via `/fetch`.
    #[arg(long, default_value = "./worker-cache")]
    cache_dir: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let adapter = Arc::new(DataFusionAdapter::new());
    let cache = FsCache::new(&args.cache_dir);
    let state = Arc::new(WorkerState::new(adapter, cache));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(addr = %args.bind, "worker listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
