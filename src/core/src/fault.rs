//! Vendor fault model and the error classifier.
//!
//! Every remote call returns a [`Fault`] on failure. Callers pass it through
//! [`classify`] together with the [`CallContext`] of the call, and branch on
//! the resulting [`ErrorKind`].

use std::fmt;

use crate::error::{ErrorKind, GuestError};

/// VIX code reported while the guest reboots.
pub const VIX_GUEST_REBOOTING: u32 = 3016;

/// VIX code reported while Netlogon is stopped or a domain controller
/// promotion is in progress.
pub const VIX_NETLOGON_UNAVAILABLE: u32 = 1;

/// A SOAP fault raised by the vSphere service.
///
/// Only the fields the classifier reads are modelled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VendorFault {
    /// Fault type name, e.g. `InvalidGuestLogin` or `SystemError`.
    pub fault_type: String,
    /// `faultstring` of the SOAP fault.
    pub message: String,
    /// `reason` of a `SystemError`.
    pub reason: Option<String>,
    /// `privilegeId` of a `NoPermission`.
    pub privilege_id: Option<String>,
}

impl VendorFault {
    pub fn new(fault_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            fault_type: fault_type.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_privilege(mut self, privilege_id: impl Into<String>) -> Self {
        self.privilege_id = Some(privilege_id.into());
        self
    }

    /// Vendor text for user-visible messages: the fault string, falling back
    /// to the reason and then to the type name.
    fn vendor_text(&self) -> String {
        if !self.message.trim().is_empty() {
            self.message.trim().to_string()
        } else if let Some(reason) = &self.reason {
            reason.trim().to_string()
        } else {
            self.fault_type.clone()
        }
    }
}

/// Anything a remote call can fail with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// SOAP fault from the service.
    Vendor(VendorFault),
    /// TLS handshake or certificate error.
    Tls(String),
    /// Name resolution error.
    Dns(String),
    /// Any other network-level error.
    Network(String),
    /// Unexpected HTTP status.
    HttpStatus { status: u16, detail: String },
    /// A response that could not be understood.
    Malformed(String),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Vendor(v) => write!(f, "{}: {}", v.fault_type, v.vendor_text()),
            Fault::Tls(m) => write!(f, "TLS error: {m}"),
            Fault::Dns(m) => write!(f, "DNS error: {m}"),
            Fault::Network(m) => write!(f, "network error: {m}"),
            Fault::HttpStatus { status, detail } => write!(f, "HTTP {status}: {detail}"),
            Fault::Malformed(m) => write!(f, "malformed response: {m}"),
        }
    }
}

/// The remote call in progress when a fault was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallContext {
    Login,
    Logout,
    LocateVm,
    Authenticate,
    StartProgram,
    ListProcesses,
    TempFile,
    Transfer,
}

/// Extract the leading code from a `vix error codes = (N, M).` reason.
pub fn vix_error_code(reason: &str) -> Option<u32> {
    let rest = reason.split("vix error codes = (").nth(1)?;
    let code = rest.split(|c| c == ',' || c == ')').next()?;
    code.trim().parse().ok()
}

/// Map a fault raised during `context` to the error taxonomy.
pub fn classify(fault: &Fault, context: CallContext) -> GuestError {
    match fault {
        Fault::Tls(m) => GuestError::new(
            ErrorKind::TransportTls,
            format!("SSL error: certificate verification failed: {m}"),
        ),
        Fault::Dns(m) => GuestError::new(
            ErrorKind::TransportDns,
            format!("Unable to resolve endpoint: {m}"),
        ),
        Fault::Network(m) if context == CallContext::Transfer => {
            GuestError::new(ErrorKind::TransferFailed, format!("File transfer failed: {m}"))
        }
        Fault::HttpStatus { status, detail } if context == CallContext::Transfer => {
            GuestError::new(
                ErrorKind::TransferFailed,
                format!("File transfer failed with HTTP {status}: {detail}"),
            )
        }
        Fault::Network(_) | Fault::HttpStatus { .. } | Fault::Malformed(_) => {
            GuestError::new(ErrorKind::ProtocolFault, fault.to_string())
        }
        Fault::Vendor(vendor) => classify_vendor(vendor, context),
    }
}

fn classify_vendor(fault: &VendorFault, context: CallContext) -> GuestError {
    let text = fault.vendor_text();
    match fault.fault_type.as_str() {
        "InvalidLogin" => GuestError::new(ErrorKind::AuthBad, format!("Login error: {text}")),
        "NoPermission" => {
            let message = match &fault.privilege_id {
                Some(privilege) => format!("No permission: {text} (privilege: {privilege})"),
                None => format!("No permission: {text}"),
            };
            GuestError::new(ErrorKind::AuthDenied, message)
        }
        "InvalidPowerState" => {
            GuestError::new(ErrorKind::VmPowerState, format!("VM power state error: {text}"))
        }
        "RestrictedVersion" => GuestError::new(
            ErrorKind::GuestRestrictedVersion,
            format!("Restricted version error: {text}"),
        ),
        "GuestOperationsUnavailable" => GuestError::new(
            ErrorKind::GuestToolsUnavailable,
            format!("Guest operations (VMware Tools) unavailable: {text}"),
        ),
        "InvalidGuestLogin" if context == CallContext::ListProcesses => GuestError::new(
            ErrorKind::GuestRebooting,
            format!("Guest login failed while polling, is the guest rebooting? {text}"),
        ),
        "InvalidGuestLogin" => {
            GuestError::new(ErrorKind::GuestLoginBad, format!("Guest login error: {text}"))
        }
        "SystemError" => classify_system_error(fault, &text),
        "FileNotFound" => {
            GuestError::new(ErrorKind::FileNotFoundRemote, format!("File not found in guest: {text}"))
        }
        "ManagedObjectNotFound" if context == CallContext::LocateVm => {
            GuestError::new(ErrorKind::VmNotFound, format!("VM not found: {text}"))
        }
        other => GuestError::new(ErrorKind::ProtocolFault, format!("{other}: {text}")),
    }
}

fn classify_system_error(fault: &VendorFault, text: &str) -> GuestError {
    let reason = fault.reason.as_deref().unwrap_or_default();
    match vix_error_code(reason) {
        Some(VIX_GUEST_REBOOTING) => GuestError::new(
            ErrorKind::GuestRebooting,
            format!("Connection failed, is the VM currently rebooting? Reason: {}", reason.trim()),
        ),
        Some(VIX_NETLOGON_UNAVAILABLE) => GuestError::new(
            ErrorKind::GuestRebooting,
            format!(
                "Connection failed, Netlogon service stopped or dcpromo in progress. Reason: {}",
                reason.trim()
            ),
        ),
        _ if reason.is_empty() => {
            GuestError::new(ErrorKind::ProtocolFault, format!("System error: {text}"))
        }
        _ => GuestError::new(
            ErrorKind::ProtocolFault,
            format!("System error: {text} (reason: {})", reason.trim()),
        ),
    }
}
