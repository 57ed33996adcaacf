//! vsphere-guest CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use vsphere_guest_cli::commands::{dispatch, error_exit_code, Cli};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match dispatch(cli).await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(error_exit_code(e.as_ref()));
        }
    }
}
