//! `vsphere-guest fetch` command: Download a file from the guest.

use std::path::PathBuf;

use clap::Args;
use vsphere_guest_runtime::GuestConnection;

#[derive(Args)]
pub struct FetchArgs {
    /// Path of the file inside the guest
    pub remote: String,

    /// Local destination
    pub local: PathBuf,
}

pub async fn execute(
    conn: &GuestConnection,
    args: FetchArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    conn.fetch_file(&args.remote, &args.local).await?;
    println!("{} -> {}", args.remote, args.local.display());
    Ok(0)
}
