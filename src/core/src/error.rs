use std::fmt;

use thiserror::Error;

/// Closed classification of every failure the transport can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// TLS handshake or certificate validation failed.
    TransportTls,
    /// The endpoint host name could not be resolved.
    TransportDns,
    /// The service rejected the endpoint credential.
    AuthBad,
    /// The endpoint user lacks a required privilege.
    AuthDenied,
    /// No VM matched the inventory path or UUID.
    VmNotFound,
    /// The VM is powered off or suspended.
    VmPowerState,
    /// VMware Tools is absent or not running in the guest.
    GuestToolsUnavailable,
    /// The guest rejected the guest credential.
    GuestLoginBad,
    /// Guest operations are restricted on this VM hardware version.
    GuestRestrictedVersion,
    /// The guest is rebooting or its login service is unavailable.
    GuestRebooting,
    /// A local file is missing or empty.
    FileNotFoundLocal,
    /// A file or program is missing inside the guest.
    FileNotFoundRemote,
    /// An HTTP transfer against a ticket URL failed.
    TransferFailed,
    /// Anything the service returned that fits no other kind.
    ProtocolFault,
}

/// How the host runtime should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Fatal for the current task.
    Fatal,
    /// Connection-level failure; the host's connection retry policy applies.
    Connection,
}

impl ErrorKind {
    /// Disposition is fixed per kind.
    pub fn disposition(self) -> Disposition {
        match self {
            ErrorKind::AuthDenied | ErrorKind::GuestToolsUnavailable | ErrorKind::GuestRebooting => {
                Disposition::Connection
            }
            _ => Disposition::Fatal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::TransportTls => "TransportTLS",
            ErrorKind::TransportDns => "TransportDNS",
            ErrorKind::AuthBad => "AuthBad",
            ErrorKind::AuthDenied => "AuthDenied",
            ErrorKind::VmNotFound => "VMNotFound",
            ErrorKind::VmPowerState => "VMPowerState",
            ErrorKind::GuestToolsUnavailable => "GuestToolsUnavailable",
            ErrorKind::GuestLoginBad => "GuestLoginBad",
            ErrorKind::GuestRestrictedVersion => "GuestRestrictedVersion",
            ErrorKind::GuestRebooting => "GuestRebooting",
            ErrorKind::FileNotFoundLocal => "FileNotFoundLocal",
            ErrorKind::FileNotFoundRemote => "FileNotFoundRemote",
            ErrorKind::TransferFailed => "TransferFailed",
            ErrorKind::ProtocolFault => "ProtocolFault",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guest transport error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuestError {
    /// Fatal error for the current task
    #[error("{kind}: {message}")]
    Task { kind: ErrorKind, message: String },

    /// Connection failure; retryable by the host runtime
    #[error("Connection failure ({kind}): {message}")]
    Connection { kind: ErrorKind, message: String },
}

impl GuestError {
    /// Build an error, choosing the variant from the kind's disposition.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind.disposition() {
            Disposition::Fatal => GuestError::Task { kind, message },
            Disposition::Connection => GuestError::Connection { kind, message },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GuestError::Task { kind, .. } | GuestError::Connection { kind, .. } => *kind,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            GuestError::Task { message, .. } | GuestError::Connection { message, .. } => message,
        }
    }

    pub fn is_connection_failure(&self) -> bool {
        matches!(self, GuestError::Connection { .. })
    }
}

/// Result type alias for guest transport operations
pub type Result<T> = std::result::Result<T, GuestError>;
