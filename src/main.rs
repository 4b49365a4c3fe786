//! Watchdog Agent — binary entrypoint.
//!
//! Parses the CLI, initializes tracing, and dispatches; the daemon itself
//! lives in the library so integration tests can drive it.

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use watchdog_agent::cli::{self, Cli};

/// RUST_LOG wins; otherwise `-v` raises the default level to debug.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "watchdog_agent=debug,info"
    } else {
        "watchdog_agent=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() {
    // Load .env in local/dev; no-op elsewhere. Lets ANTHROPIC_API_KEY come
    // from a project .env file.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = cli::dispatch(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
