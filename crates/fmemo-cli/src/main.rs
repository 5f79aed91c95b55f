//! fmemo CLI - Command-line interface for fmemo
//!
//! This is the main entry point for users interacting with fmemo.
//! It provides commands for serving a memo root, inspecting single files,
//! and setting up a new root.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "fmemo")]
#[command(author = "fmemo Contributors")]
#[command(version)]
#[command(about = "Live outline server for Markdown memo trees", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize fmemo in a directory
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Serve a memo root over HTTP and push changes over WebSocket
    Serve {
        /// Memo root (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Config file (defaults to .fmemo/config.json under the root)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port for the HTTP API and WebSocket push
        #[arg(long)]
        http_port: Option<u16>,

        /// Quiet period before file changes are processed, in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,
    },

    /// Parse one memo file and print its outline
    Parse {
        /// File to parse
        file: PathBuf,

        /// Print the memo tree as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the directory tree of memo files
    Tree {
        /// Memo root (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Print the tree as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let result = match cli.command {
        Commands::Init { path } => commands::init(&path),
        Commands::Serve {
            path,
            config,
            http_port,
            debounce_ms,
        } => {
            let overrides = commands::ServeOverrides {
                config,
                http_port,
                debounce_ms,
            };
            commands::serve(&path, overrides).await
        }
        Commands::Parse { file, json } => commands::parse(&file, json),
        Commands::Tree { path, json } => commands::tree(&path, json),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
