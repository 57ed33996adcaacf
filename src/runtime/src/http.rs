//! HTTP client construction and transport error mapping shared by the SOAP
//! client and ticket transfers.

use std::error::Error as StdError;

use vsphere_guest_core::Fault;

use crate::tls;

/// Build the HTTP client for one endpoint.
pub(crate) fn build_client(verify_tls: bool) -> Result<reqwest::Client, Fault> {
    if !verify_tls {
        tls::silence_insecure_warnings();
    }
    reqwest::Client::builder()
        .danger_accept_invalid_certs(!verify_tls)
        .build()
        .map_err(|e| Fault::Tls(format!("Failed to create HTTP client: {}", e)))
}

/// Classify a reqwest failure by walking its source chain.
pub(crate) fn transport_fault(err: &reqwest::Error) -> Fault {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        detail.push_str(": ");
        detail.push_str(&inner.to_string());
        source = inner.source();
    }

    let lower = detail.to_lowercase();
    if lower.contains("dns error")
        || lower.contains("failed to lookup address")
        || lower.contains("name or service not known")
        || lower.contains("no such host")
    {
        Fault::Dns(detail)
    } else if lower.contains("certificate")
        || lower.contains("tls")
        || lower.contains("ssl")
        || lower.contains("handshake")
    {
        Fault::Tls(detail)
    } else {
        Fault::Network(detail)
    }
}
