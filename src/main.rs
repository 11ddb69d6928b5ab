//! # docqa CLI
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa serve` | Start the HTTP server (sessions, uploads, streamed answers) |
//! | `docqa chat <file.pdf>` | Chat with one PDF in the terminal |
//! | `docqa inspect <file.pdf>` | Show how a PDF would be extracted and chunked, offline |
//!
//! `serve` and `chat` read `COHERE_API_KEY` (and `PINECONE_API_KEY` when the
//! vector provider is `pinecone`) from the environment.
//!
//! Log verbosity follows `RUST_LOG` (default `docqa=info`). Logs go to
//! stderr so they never interleave with streamed answers.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use docqa::config::{load_config, Config};
use docqa::{inspect, repl, server};

/// Ask questions about a PDF and get answers grounded in its text.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docqa.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "docqa", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind`. Each client creates a session, uploads a
    /// PDF, and asks questions; answers stream back as Server-Sent Events.
    Serve,

    /// Chat with a PDF in the terminal.
    Chat {
        /// Path to the PDF file.
        file: PathBuf,
    },

    /// Extract and chunk a PDF without calling any external service.
    ///
    /// Falls back to built-in defaults when no config file is found.
    Inspect {
        /// Path to the PDF file.
        file: PathBuf,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docqa=info")))
        .init();

    let cli = Cli::parse();

    // Offline, so a missing config file is fine
    if let Commands::Inspect { file, json } = &cli.command {
        let cfg = if cli.config.exists() {
            load_config(&cli.config)?
        } else {
            Config::minimal()
        };
        return inspect::run_inspect(&cfg, file, *json);
    }

    let cfg = load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => server::run_server(&cfg).await?,
        Commands::Chat { file } => repl::run_chat(&cfg, &file).await?,
        Commands::Inspect { .. } => {}
    }

    Ok(())
}
