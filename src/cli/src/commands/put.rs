//! `vsphere-guest put` command: Upload a local file into the guest.

use std::path::PathBuf;

use clap::Args;
use vsphere_guest_runtime::GuestConnection;

#[derive(Args)]
pub struct PutArgs {
    /// Local file to upload
    pub local: PathBuf,

    /// Destination path inside the guest
    pub remote: String,
}

pub async fn execute(
    conn: &GuestConnection,
    args: PutArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    conn.put_file(&args.local, &args.remote).await?;
    println!("{} -> {}", args.local.display(), args.remote);
    Ok(0)
}
