use anyhow::{Context, Result};
use clap::Parser;
use common::cli::{CommonArgs, utils};
use common::registry::{MemoryStore, RegistryStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Single-process fleet for local development: a frontend and a number of
/// backends sharing an in-memory registry store.
#[derive(Parser)]
#[command(name = "rollcall")]
#[command(about = "rollcall - frontend and backends in one process, no registry server needed")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[arg(long, default_value_t = 2, help = "Number of backend instances to start")]
    backends: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    utils::init_logging(&cli.common);

    let config = utils::load_config(cli.common.config.as_ref())?;
    utils::validate_config(&config)?;

    let store: Arc<dyn RegistryStore> = Arc::new(MemoryStore::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::with_capacity(cli.backends + 1);
    for n in 0..cli.backends {
        let mut backend_config = config.clone();
        backend_config.instance.id = None;
        backend_config.instance.address = None;

        let listener = TcpListener::bind((config.instance.advertise_host.as_str(), 0))
            .await
            .with_context(|| format!("Failed to bind backend {n}"))?;
        let store = store.clone();
        let shutdown = wait_for(shutdown_rx.clone());
        handles.push(tokio::spawn(async move {
            if let Err(e) = backend::run(backend_config, store, listener, shutdown).await {
                log::error!("Backend {n} failed: {e:#}");
            }
        }));
    }

    let bind_ip = config
        .http
        .bind
        .parse::<std::net::IpAddr>()
        .context("Invalid bind address")?;
    let http_addr = SocketAddr::new(bind_ip, config.http.port);
    let listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("Failed to bind {http_addr}"))?;
    let frontend_store = store.clone();
    let frontend_config = config.clone();
    let shutdown = wait_for(shutdown_rx.clone());
    handles.push(tokio::spawn(async move {
        if let Err(e) = frontend::run(frontend_config, frontend_store, listener, shutdown).await {
            log::error!("Frontend failed: {e:#}");
        }
    }));

    log::info!(
        "Started {} backend(s) and a frontend on {http_addr}",
        cli.backends
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c signal")?;
    log::info!("Shutting down...");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
