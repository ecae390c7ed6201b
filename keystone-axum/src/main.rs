use std::{net::SocketAddr, sync::Arc};

use axum::Router;
use clap::Parser;
use keystone::KeystoneBuilder;
use keystone_axum::{CookieConfig, routes};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

/// Command line interface for the Keystone auth server
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database connection string
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://keystone.db")]
    database_url: String,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(clap::Subcommand)]
enum Commands {
    /// Serve the auth routes under /auth
    Serve {
        /// Address to listen on
        #[arg(long, env = "KEYSTONE_BIND", default_value = "127.0.0.1:3000")]
        bind: SocketAddr,

        /// Send the session cookie without the Secure flag (plain HTTP)
        #[arg(long)]
        insecure_cookies: bool,
    },
    /// Run database migrations
    Migrate,
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG=
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve {
            bind,
            insecure_cookies,
        } => serve(&cli.database_url, bind, insecure_cookies).await?,
        Commands::Migrate => {
            tracing::info!(database_url = %cli.database_url, "Running migrations");
            let keystone = KeystoneBuilder::new()
                .with_sqlite(&cli.database_url)
                .await?
                .build()
                .await?;
            keystone.migrate().await?;
            tracing::info!("Migrations complete");
        }
        Commands::Version => {
            println!("Keystone v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

async fn serve(
    database_url: &str,
    bind: SocketAddr,
    insecure_cookies: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let keystone = Arc::new(
        KeystoneBuilder::new()
            .with_sqlite(database_url)
            .await?
            .apply_migrations(true)
            .build()
            .await?,
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let cleanup = keystone.start_cleanup_task(shutdown_rx);

    let cookie_config = if insecure_cookies {
        tracing::warn!("Session cookies are sent without the Secure flag");
        CookieConfig::development()
    } else {
        CookieConfig::default()
    };

    let app = Router::new().nest(
        "/auth",
        routes(keystone).with_cookie_config(cookie_config).build(),
    );

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(address = %bind, "Listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
    })
    .await?;

    let _ = shutdown_tx.send(true);
    cleanup.await?;
    tracing::info!("Server stopped");

    Ok(())
}
