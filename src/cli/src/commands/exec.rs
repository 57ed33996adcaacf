//! `vsphere-guest exec` command: Run a command line in the guest.
//!
//! Prints the captured stdout/stderr and exits with the remote exit code.
//! Ctrl-C cancels the poll loop; the capture files are still removed.

use std::io::Write;

use clap::Args;
use vsphere_guest_core::ExecOutcome;
use vsphere_guest_runtime::GuestConnection;

/// Exit code reported after Ctrl-C.
const CANCELLED_EXIT_CODE: i32 = 130;

#[derive(Args)]
pub struct ExecArgs {
    /// Command line to execute. Arguments are joined with single spaces
    /// and the result is interpreted by the guest shell, so quote the whole
    /// line to keep inner quoting: `exec -- "sh -c 'a b'"`
    #[arg(last = true, required = true)]
    pub cmd: Vec<String>,
}

impl ExecArgs {
    /// The command line as handed to the guest interpreter: every
    /// argument joined with a single space, without re-quoting.
    pub fn command_line(&self) -> String {
        self.cmd.join(" ")
    }
}

pub async fn execute(
    conn: &GuestConnection,
    args: ExecArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let token = conn.cancellation_token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling guest command");
            token.cancel();
        }
    });

    let outcome = conn.exec(&args.command_line()).await;
    watcher.abort();

    match outcome? {
        ExecOutcome::Completed(output) => {
            std::io::stdout().write_all(&output.stdout)?;
            std::io::stderr().write_all(&output.stderr)?;
            Ok(output.exit_code)
        }
        ExecOutcome::Cancelled => Ok(CANCELLED_EXIT_CODE),
    }
}
