use anyhow::Result;
use clap::{Parser, Subcommand};
use threadline_storage::StorageBackend;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "threadline")]
#[command(about = "Streaming chat server with durable per-user sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server.
    Serve {
        #[arg(short, long, default_value = "3000")]
        port: u16,
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
    },
    /// Inspect or delete stored sessions.
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Print a user's session as JSON.
    Show { user_id: String },
    /// Delete a user's session.
    Clear { user_id: String },
}

fn get_api_key() -> Result<String> {
    std::env::var("THREADLINE_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .map_err(|_| {
            anyhow::anyhow!("THREADLINE_API_KEY or OPENAI_API_KEY environment variable must be set")
        })
}

fn get_base_url() -> String {
    std::env::var("THREADLINE_API_URL").unwrap_or_else(|_| "https://api.openai.com".to_owned())
}

/// Postgres when DATABASE_URL is set, in-memory otherwise.
async fn build_storage() -> Result<StorageBackend> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => Ok(StorageBackend::new_postgres(&url).await?),
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, sessions are kept in memory only");
            Ok(StorageBackend::new_memory())
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host } => commands::serve::run(port, host).await,
        Commands::Session { command } => match command {
            SessionCommands::Show { user_id } => commands::session::show(&user_id).await,
            SessionCommands::Clear { user_id } => commands::session::clear(&user_id).await,
        },
    }
}
