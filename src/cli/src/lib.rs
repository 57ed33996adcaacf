//! vsphere-guest CLI - run commands and copy files inside vSphere guests.

pub mod commands;
pub mod settings;
