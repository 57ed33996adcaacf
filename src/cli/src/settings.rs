//! Connection settings: YAML config file plus command-line overrides.

use std::path::{Path, PathBuf};

use clap::Args;
use vsphere_guest_core::GuestConfig;

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// YAML file with endpoint, VM and guest credentials
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Inventory path of the target VM (overrides the file)
    #[arg(long, global = true, conflicts_with = "vm_uuid")]
    pub vm_path: Option<String>,

    /// Instance UUID of the target VM (overrides the file)
    #[arg(long, global = true)]
    pub vm_uuid: Option<String>,

    /// Process polling interval in seconds
    #[arg(long, global = true)]
    pub poll_interval: Option<f64>,

    /// Download chunk size in bytes
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,

    /// Skip certificate validation
    #[arg(long, global = true)]
    pub insecure: bool,
}

impl ConnectionArgs {
    /// Load the config file and apply overrides.
    pub fn load(&self) -> Result<GuestConfig, Box<dyn std::error::Error>> {
        let path = self
            .config
            .as_deref()
            .ok_or("no configuration file given, use --config <FILE>")?;
        let mut config = read_config(path)?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides. A VM selector given here replaces
    /// whichever selector the file had.
    pub fn apply(&self, config: &mut GuestConfig) {
        if let Some(path) = &self.vm_path {
            config.vm_inventory_path = Some(path.clone());
            config.vm_uuid = None;
        }
        if let Some(uuid) = &self.vm_uuid {
            config.vm_uuid = Some(uuid.clone());
            config.vm_inventory_path = None;
        }
        if let Some(interval) = self.poll_interval {
            config.poll_interval_sec = interval;
        }
        if let Some(chunk) = self.chunk_size {
            config.fetch_chunk_bytes = chunk;
        }
        if self.insecure {
            config.verify_tls = false;
        }
    }
}

fn read_config(path: &Path) -> Result<GuestConfig, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;
    let config = serde_yaml::from_str(&text)
        .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
    tracing::debug!(path = %path.display(), "Loaded configuration");
    Ok(config)
}
