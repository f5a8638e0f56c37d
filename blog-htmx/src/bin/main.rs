//! blog-htmx server binary

use std::path::PathBuf;

use anyhow::{Context, Result};
use blog_htmx::prelude::*;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "blog-htmx")]
#[command(version)]
#[command(about = "HTMX blog with OpenID Connect hosted login", long_about = None)]
struct Cli {
    /// Configuration file, replacing the default search locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web server (default)
    Serve,
    /// Apply database migrations and exit
    Migrate,
}

fn load_config(path: Option<&PathBuf>) -> Result<BlogConfig> {
    let config = match path {
        Some(path) => BlogConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => BlogConfig::load()?,
    };
    Ok(config)
}

async fn serve(config: BlogConfig) -> Result<()> {
    config.validate()?;

    let store = BlogStore::connect(&config.database.url, config.database.max_connections)
        .await
        .context("connecting to database")?;
    store.migrate().await?;

    let key = blog_htmx::session::cookie_key(&config.session)?;
    let addr = config.server.bind_addr();
    let state = AppState::from_config(config, store, key)?;
    let app = blog_htmx::app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn migrate(config: BlogConfig) -> Result<()> {
    let store = BlogStore::connect(&config.database.url, config.database.max_connections)
        .await
        .context("connecting to database")?;
    store.migrate().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    blog_htmx::observability::init()?;

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Migrate => migrate(config).await,
    }
}
