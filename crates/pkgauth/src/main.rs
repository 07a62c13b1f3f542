//! pkgauth - Document-store backed authentication for package registries

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use config::{Config, LoggingConfig};
use pkgauth_api::{AppState, create_router};
use pkgauth_core::AuthPlugin;

/// pkgauth - Authentication and package access control for package registries
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", env = "PKGAUTH_CONFIG")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Bind address
        #[arg(long, env = "PKGAUTH_BIND")]
        bind: Option<String>,

        /// Port
        #[arg(short, long, env = "PKGAUTH_PORT")]
        port: Option<u16>,
    },
    /// Register a user in the configured store
    AddUser {
        username: String,

        #[arg(long, env = "PKGAUTH_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Check a username/password pair and print the resolved groups
    Verify {
        username: String,

        #[arg(long, env = "PKGAUTH_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;
    init_logging(&config.logging);
    config::log_source(&args.config);

    let plugin = Arc::new(
        AuthPlugin::new(config.plugin.clone().resolve()?)
            .context("Failed to initialize auth plugin")?,
    );

    match args.command.unwrap_or(Command::Serve {
        bind: None,
        port: None,
    }) {
        Command::Serve { bind, port } => serve(&config, plugin, bind, port).await,
        Command::AddUser { username, password } => {
            plugin.add_user(&username, &password).await?;
            println!("ok");
            Ok(())
        }
        Command::Verify { username, password } => match plugin.authenticate(&username, &password).await {
            Ok(groups) => {
                println!("{}", groups.join(","));
                Ok(())
            }
            Err(e) => bail!("{}", e),
        },
    }
}

async fn serve(
    config: &Config,
    plugin: Arc<AuthPlugin>,
    bind: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    info!("Starting pkgauth v{}", env!("CARGO_PKG_VERSION"));

    let metrics_handle = if config.metrics.enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        Some(Arc::new(handle))
    } else {
        None
    };

    let app = create_router(AppState::new(plugin), metrics_handle).layer(TraceLayer::new_for_http());

    let bind_addr = bind.unwrap_or_else(|| config.server.bind_address.clone());
    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", bind_addr, port).parse()?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Initialize logging
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format.as_str() {
        "json" => registry.with(fmt::layer().json()).init(),
        other => {
            registry.with(fmt::layer()).init();
            if other != "pretty" {
                warn!("Unknown log format '{}', using pretty", other);
            }
        }
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
