use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use github_app_mcp::config::{AppCredential, Settings};
use github_app_mcp::installation::{GithubApp, InstallationResolver};
use github_app_mcp::{http, server};
use rmcp::{transport::stdio, ServiceExt};
use tracing_subscriber::EnvFilter;

/// GitHub App bridge: repository tools over MCP, or a small HTTP API
#[derive(Parser)]
#[command(name = "github-app-mcp", version, about)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve MCP tools on stdio (default)
    Mcp,

    /// Serve the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
        bind: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Command::Mcp) {
        Command::Mcp => run_mcp(&cli.settings).await,
        Command::Serve { bind } => {
            let state = http::AppState::from_settings(&cli.settings);
            http::serve(bind, state).await
        }
    }
}

async fn run_mcp(settings: &Settings) -> Result<()> {
    // Missing credentials are fatal in tool-server mode.
    let credential = AppCredential::from_settings(settings)
        .map_err(|e| anyhow::anyhow!("Failed to load GitHub App credentials: {}", e))?;
    let app = GithubApp::new(&credential)
        .map_err(|e| anyhow::anyhow!("Failed to create GitHub App client: {}", e))?;

    tracing::info!(
        app_id = credential.app_id,
        api_url = %credential.api_url,
        "Starting github-app-mcp server"
    );

    let resolver = Arc::new(InstallationResolver::new(Arc::new(app)));
    let service = server::GithubAppServer::new(resolver);
    let running = service.serve(stdio()).await?;
    running.waiting().await?;

    Ok(())
}
