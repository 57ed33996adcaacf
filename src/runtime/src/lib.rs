//! vSphere Guest Runtime - agent-less guest execution transport.
//!
//! Runs commands and moves files inside a VM's guest OS through the vSphere
//! Guest Operations API, with no agent beyond VMware Tools.

#![allow(clippy::result_large_err)]

pub mod auth;
pub mod connection;
mod http;
pub mod locator;
pub mod runner;
pub mod session;
pub mod temp_files;
pub mod tls;
pub mod transfer;
pub mod vim;

#[cfg(test)]
mod testing;

// Re-export common types
pub use connection::GuestConnection;
pub use locator::{locate_vm, LocatedVm};
pub use runner::ProcessRunner;
pub use session::EndpointSession;
pub use tls::{insecure_warnings_silenced, silence_insecure_warnings};
pub use transfer::FileTransfer;
pub use vim::{GuestCredential, GuestTarget, ManagedObjectRef, SoapVimApi, VimApi};

/// vSphere Guest Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
