//! Guest file transfer tickets and the host/port rewrite applied to them.

use serde::{Deserialize, Serialize};

/// Placeholder the service uses for "the host this call hit".
const HOST_PLACEHOLDER: &str = "*";

/// Port marker the service uses for its own HTTPS port.
const DEFAULT_PORT_MARKER: &str = ":443";

/// Direction of a guest file transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    /// Caller to guest.
    In,
    /// Guest to caller.
    Out,
}

/// One-shot transfer URL issued by the service for a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTicket {
    pub url: String,
    pub size_bytes: Option<u64>,
    pub direction: TransferDirection,
}

impl TransferTicket {
    /// The URL to actually contact, see [`rewrite_transfer_url`].
    pub fn resolved_url(&self, endpoint_host: &str, endpoint_port: u16) -> String {
        rewrite_transfer_url(&self.url, endpoint_host, endpoint_port)
    }
}

/// Substitute `*` with the endpoint host, then `:443` with the endpoint
/// port.
///
/// Operates on the raw string; the URL is never parsed. Only the `:443`
/// port marker is rewritten, so a `443` inside the path or query string is
/// left alone and ports such as `8443` stay intact.
pub fn rewrite_transfer_url(url: &str, endpoint_host: &str, endpoint_port: u16) -> String {
    url.replace(HOST_PLACEHOLDER, endpoint_host)
        .replace(DEFAULT_PORT_MARKER, &format!(":{endpoint_port}"))
}
