//! vSphere Guest Core - Foundational Types
//!
//! Configuration, error taxonomy, fault classification and the guest-OS
//! command rules shared by the guest-operations transport.

pub mod config;
pub mod error;
pub mod exec;
pub mod fault;
pub mod guest_os;
pub mod ticket;

// Re-export commonly used types
pub use config::{GuestConfig, VmSelector};
pub use error::{Disposition, ErrorKind, GuestError, Result};
pub use exec::{ExecOutcome, ExecOutput, ExecState, GuestProcess};
pub use fault::{classify, CallContext, Fault, VendorFault};
pub use guest_os::{build_program_spec, GuestFamily, ProgramSpec};
pub use ticket::{rewrite_transfer_url, TransferDirection, TransferTicket};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
