use anyhow::Result;
use clap::{Parser, Subcommand};
use memwatch_server::{build_router, AppState, ServerConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "memwatch-server", version, about = "GDDR tester telemetry server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the telemetry server (the default when no command is given)
    Serve {
        /// Override the bind address from the environment
        #[arg(long)]
        host: Option<String>,
        /// Override the port from the environment
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memwatch_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = ServerConfig::from_env()?;
    if let Some(Commands::Serve { host, port }) = cli.command {
        if let Some(host) = host {
            config.bind_addr = host;
        }
        if let Some(port) = port {
            config.port = port;
        }
    }

    let addr = config.bind_address();
    info!(
        tester = %config.tester_path.display(),
        autostart = config.autostart,
        "starting memwatch server"
    );

    let state = AppState::new(config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {addr}");
    info!("websocket endpoint: ws://{addr}/ws");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
