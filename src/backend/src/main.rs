use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::cli::{CommonArgs, CommonCommands, utils};
use common::registry::{RedisStore, RegistryStore};
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "rollcall-backend")]
#[command(about = "rollcall backend - stores entries and registers itself for discovery")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<BackendCommands>,

    #[arg(long, help = "HTTP server port (overrides configuration)")]
    port: Option<u16>,

    #[arg(long, help = "Bind address (overrides configuration)")]
    bind: Option<String>,
}

#[derive(Subcommand)]
enum BackendCommands {
    #[command(flatten)]
    Common(CommonCommands),
}

impl Default for BackendCommands {
    fn default() -> Self {
        Self::Common(CommonCommands::Start)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    utils::init_logging(&cli.common);

    let mut config = utils::load_config(cli.common.config.as_ref())?;
    if let Some(port) = cli.port {
        config.http.port = port;
    }
    if let Some(bind) = cli.bind {
        config.http.bind = bind;
    }

    let command = cli.command.unwrap_or_default();
    let BackendCommands::Common(ref common_cmd) = command;
    if utils::handle_common_command(common_cmd, &config).await? {
        return Ok(());
    }

    utils::validate_config(&config)?;

    log::info!("Starting rollcall backend");

    let bind_ip = config
        .http
        .bind
        .parse::<std::net::IpAddr>()
        .context("Invalid bind address")?;
    let http_addr = SocketAddr::new(bind_ip, config.http.port);
    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("Failed to bind {http_addr}"))?;

    let store: Arc<dyn RegistryStore> = Arc::new(
        RedisStore::new(&config.registry).context("Failed to configure registry store")?,
    );

    backend::run(config, store, listener, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for ctrl+c signal: {e}");
            std::future::pending::<()>().await;
        }
        log::info!("Shutting down backend...");
    })
    .await?;

    log::info!("Backend stopped gracefully");
    Ok(())
}
