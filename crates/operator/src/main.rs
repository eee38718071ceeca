use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kube::Client;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tfjob_operator::{
    cache::{JobCache, ReflectorIndexer},
    cleanup::Cleaner,
    config::Config,
    control::{KubePdbControl, KubePodControl, KubePodLister, KubeServiceControl},
    controllers::TFJobController,
    crd::TFJobDefaulter,
    events::{EventRecorder, KubeEventRecorder},
    informer::TFJobInformer,
    ingress::JobEventHandler,
    queue::KeyQueue,
};

#[derive(Parser, Debug)]
#[command(name = "tfjob-operator", about = "Lifecycle controller for TFJob resources")]
struct Args {
    /// Namespace to watch (defaults to all namespaces)
    #[arg(long)]
    namespace: Option<String>,

    /// Informer resync period in seconds
    #[arg(long)]
    resync_seconds: Option<u64>,

    /// Number of reconciliation workers
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = Config::load()?;
    if args.namespace.is_some() {
        config.namespace = args.namespace;
    }
    if let Some(secs) = args.resync_seconds {
        config.resync_period = Duration::from_secs(secs);
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.validate()?;
    info!("Loaded configuration: {:?}", config);

    let client = Client::try_default().await?;

    let recorder: Arc<dyn EventRecorder> = Arc::new(KubeEventRecorder::new(
        client.clone(),
        &config.controller_name,
        config.pod_name.clone(),
    ));
    let queue = Arc::new(KeyQueue::new());

    let informer = TFJobInformer::new(client.clone(), config.namespace.as_deref(), config.resync_period);
    let cache = JobCache::new(Arc::new(ReflectorIndexer::new(informer.store(), informer.resource())));

    let cleaner = Cleaner::new(
        Arc::new(KubePodControl::new(client.clone(), recorder.clone())),
        Arc::new(KubeServiceControl::new(client.clone(), recorder.clone())),
        Arc::new(KubePdbControl::new(client.clone())),
        recorder.clone(),
    );
    let controller = Arc::new(TFJobController::new(
        cache,
        cleaner,
        Arc::new(KubePodLister::new(client.clone())),
        queue.clone(),
    ));
    let handler = Arc::new(JobEventHandler::new(Arc::new(TFJobDefaulter), recorder, queue));

    tokio::select! {
        _ = informer.run(handler) => info!("Informer exited"),
        _ = controller.run(config.workers) => info!("Controller exited"),
        _ = tokio::signal::ctrl_c() => info!("Received shutdown signal"),
    }

    Ok(())
}
