/// CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

// Build timestamp injected at compile time
pub const VERSION_WITH_BUILD: &str = concat!(env!("CARGO_PKG_VERSION"), " (built: ", env!("BUILD_TIMESTAMP"), ")");

#[derive(Parser)]
#[command(name = "docketeer")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to ~/.config/docketeer/config.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Enable permissive CORS
        #[arg(long)]
        cors: bool,
    },

    /// List networks with their attached containers
    Networks,

    /// Print stored samples for one or more containers
    Metrics {
        /// Container names
        #[arg(required = true)]
        containers: Vec<String>,

        /// Trailing window in hours
        #[arg(long, default_value = "1")]
        hours: i64,
    },

    /// Apply database migrations and exit
    Migrate,

    /// Generate a random API token
    Token,
}
