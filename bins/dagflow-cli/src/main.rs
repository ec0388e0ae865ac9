//! Flow-file runner CLI. Loads a graph from a YAML flow file, runs it
//! through the scheduler, and prints the run result as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use dagflow_core::Graph;
use dagflow_dataframe::DataFusionAdapter;
use dagflow_exec::{FsCache, RemoteExecutor, Scheduler};

#[derive(Parser, Debug)]
#[command(name = "dagflow-cli")]
#[command(about = "Run a dagflow graph from a flow file")]
struct Args {
    /// Path to the flow file (YAML).
    #[arg(short, long)]
    flow: PathBuf,

    /// Directory backing the content-addressed run cache.
    #[arg(long, default_value = "./dagflow-cache")]
    cache_dir: PathBuf,

    /// Base URL of a remote worker, e.g. `http://localhost:63578`. Required
    /// when the flow contains `polars_code`/`python_script` nodes or any
    /// node whose execute_location is `remote`.
    #[arg(long)]
    worker_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let yaml = std::fs::read_to_string(&args.flow)
        .with_context(|| format!("reading flow file {}", args.flow.display()))?;
    let mut graph: Graph = serde_yaml::from_str(&yaml).context("parsing flow file")?;

    let adapter = Arc::new(DataFusionAdapter::new());
    let cache = FsCache::new(&args.cache_dir);
    let remote = args.worker_url.map(|url| RemoteExecutor::new(url, cache.clone()));
    let scheduler = Scheduler::new(adapter, cache, remote);

    let cancel = CancellationToken::new();
    let run_cancel = cancel.child_token();
    let mut handle = tokio::spawn(async move { scheduler.run(&mut graph, run_cancel).await });

    tokio::select! {
        res = &mut handle => {
            return report(res??);
        }
        _ = signal::ctrl_c() => {
            tracing::info!("received ctrl-c, canceling run");
            cancel.cancel();
        }
    }

    let info = handle.await??;
    report(info)
}

fn report(info: dagflow_core::RunInformation) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&info)?);
    if !info.success {
        std::process::exit(1);
    }
    Ok(())
}
