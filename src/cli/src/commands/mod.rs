//! CLI command definitions and dispatch.

mod exec;
mod fetch;
mod put;

use clap::{Parser, Subcommand};
use vsphere_guest_core::GuestError;
use vsphere_guest_runtime::GuestConnection;

use crate::settings::ConnectionArgs;

/// Exit code for failures the caller may retry at the connection level.
pub const CONNECTION_FAILURE_EXIT_CODE: i32 = 255;

/// Exit code for every other failure.
pub const FATAL_EXIT_CODE: i32 = 1;

/// vsphere-guest: run commands and copy files inside vSphere guests.
#[derive(Parser)]
#[command(name = "vsphere-guest", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Execute a command line in the guest
    Exec(exec::ExecArgs),
    /// Upload a local file to the guest
    Put(put::PutArgs),
    /// Download a file from the guest
    Fetch(fetch::FetchArgs),
}

/// Dispatch a parsed CLI and return the process exit code.
pub async fn dispatch(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let config = cli.connection.load()?;
    let mut conn = GuestConnection::connect(config).await?;

    let result = match cli.command {
        Command::Exec(args) => exec::execute(&conn, args).await,
        Command::Put(args) => put::execute(&conn, args).await,
        Command::Fetch(args) => fetch::execute(&conn, args).await,
    };

    conn.close().await;
    result
}

/// Map an error to the process exit code.
pub fn error_exit_code(error: &(dyn std::error::Error + 'static)) -> i32 {
    match error.downcast_ref::<GuestError>() {
        Some(e) if e.is_connection_failure() => CONNECTION_FAILURE_EXIT_CODE,
        _ => FATAL_EXIT_CODE,
    }
}
