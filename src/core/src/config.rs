use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, GuestError, Result};

/// Default vCenter/ESXi HTTPS port.
pub const DEFAULT_ENDPOINT_PORT: u16 = 443;

/// Default process-completion polling cadence, in seconds.
pub const DEFAULT_POLL_INTERVAL_SEC: f64 = 0.5;

/// Default download chunk size, in bytes.
pub const DEFAULT_FETCH_CHUNK_BYTES: usize = 128;

/// Default POSIX interpreter.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Guest transport configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuestConfig {
    /// FQDN or IP of vCenter/ESXi
    pub endpoint_host: String,

    /// TCP port of the service
    pub endpoint_port: u16,

    /// Service user name
    pub endpoint_user: String,

    /// Service password
    pub endpoint_pass: String,

    /// Validate the service certificate.
    ///
    /// When false, certificates are not checked and the process-wide
    /// insecure-TLS warnings are silenced.
    pub verify_tls: bool,

    /// Inventory path of the target VM (exclusive with `vm_uuid`)
    pub vm_inventory_path: Option<String>,

    /// Instance UUID of the target VM (exclusive with `vm_inventory_path`)
    pub vm_uuid: Option<String>,

    /// Guest OS user name
    pub guest_user: String,

    /// Guest OS password
    pub guest_pass: String,

    /// Process-completion polling cadence in seconds
    pub poll_interval_sec: f64,

    /// Download chunk size in bytes
    pub fetch_chunk_bytes: usize,

    /// POSIX interpreter; ignored for Windows guests
    pub shell: String,
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            endpoint_host: String::new(),
            endpoint_port: DEFAULT_ENDPOINT_PORT,
            endpoint_user: String::new(),
            endpoint_pass: String::new(),
            verify_tls: true,
            vm_inventory_path: None,
            vm_uuid: None,
            guest_user: String::new(),
            guest_pass: String::new(),
            poll_interval_sec: DEFAULT_POLL_INTERVAL_SEC,
            fetch_chunk_bytes: DEFAULT_FETCH_CHUNK_BYTES,
            shell: DEFAULT_SHELL.to_string(),
        }
    }
}

// Passwords stay out of logs.
impl fmt::Debug for GuestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestConfig")
            .field("endpoint_host", &self.endpoint_host)
            .field("endpoint_port", &self.endpoint_port)
            .field("endpoint_user", &self.endpoint_user)
            .field("endpoint_pass", &"<redacted>")
            .field("verify_tls", &self.verify_tls)
            .field("vm_inventory_path", &self.vm_inventory_path)
            .field("vm_uuid", &self.vm_uuid)
            .field("guest_user", &self.guest_user)
            .field("guest_pass", &"<redacted>")
            .field("poll_interval_sec", &self.poll_interval_sec)
            .field("fetch_chunk_bytes", &self.fetch_chunk_bytes)
            .field("shell", &self.shell)
            .finish()
    }
}

/// How the target VM is looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmSelector {
    InventoryPath(String),
    Uuid(String),
}

impl fmt::Display for VmSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmSelector::InventoryPath(path) => write!(f, "path '{path}'"),
            VmSelector::Uuid(uuid) => write!(f, "uuid '{uuid}'"),
        }
    }
}

impl GuestConfig {
    /// Check everything that must hold before any network call.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint_host.trim().is_empty() {
            return Err(config_error("endpoint_host must be set"));
        }
        if self.endpoint_port == 0 {
            return Err(config_error("endpoint_port must be greater than 0"));
        }
        self.vm_selector()?;
        self.poll_interval()?;
        if self.fetch_chunk_bytes == 0 {
            return Err(config_error("fetch_chunk_bytes must be greater than 0"));
        }
        Ok(())
    }

    /// The VM lookup; exactly one of path and UUID must be set.
    pub fn vm_selector(&self) -> Result<VmSelector> {
        let path = self.vm_inventory_path.as_deref().filter(|p| !p.is_empty());
        let uuid = self.vm_uuid.as_deref().filter(|u| !u.is_empty());
        match (path, uuid) {
            (Some(path), None) => Ok(VmSelector::InventoryPath(path.to_string())),
            (None, Some(uuid)) => Ok(VmSelector::Uuid(uuid.to_string())),
            (Some(_), Some(_)) => Err(config_error(
                "vm_inventory_path and vm_uuid are mutually exclusive",
            )),
            (None, None) => Err(config_error(
                "one of vm_inventory_path or vm_uuid is required",
            )),
        }
    }

    /// Completion polling cadence as a `Duration`.
    pub fn poll_interval(&self) -> Result<Duration> {
        let secs = self.poll_interval_sec;
        if !secs.is_finite() || secs < 0.0 {
            return Err(config_error(format!(
                "poll_interval_sec must be a non-negative number, got {secs}"
            )));
        }
        Duration::try_from_secs_f64(secs).map_err(|_| {
            config_error(format!("poll_interval_sec {secs} is too large"))
        })
    }

    /// SOAP endpoint URL of the service.
    pub fn sdk_url(&self) -> String {
        format!("https://{}:{}/sdk", self.endpoint_host, self.endpoint_port)
    }
}

fn config_error(message: impl Into<String>) -> GuestError {
    GuestError::new(
        ErrorKind::ProtocolFault,
        format!("Configuration error: {}", message.into()),
    )
}
