//! Exec types for guest command execution.
//!
//! Shared between the process runner and its callers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix of the guest temp files capturing a command's streams.
pub const CAPTURE_FILE_PREFIX: &str = "vsphere-guest-";

/// Suffix of the stdout capture file.
pub const STDOUT_SUFFIX: &str = ".stdout";

/// Suffix of the stderr capture file.
pub const STDERR_SUFFIX: &str = ".stderr";

/// Output from an executed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Captured stdout bytes.
    pub stdout: Vec<u8>,
    /// Captured stderr bytes.
    pub stderr: Vec<u8>,
    /// Process exit code.
    pub exit_code: i32,
}

/// Result of `exec`: the command either ran to completion or the caller
/// cancelled it between polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    Completed(ExecOutput),
    Cancelled,
}

impl ExecOutcome {
    pub fn completed(self) -> Option<ExecOutput> {
        match self {
            ExecOutcome::Completed(output) => Some(output),
            ExecOutcome::Cancelled => None,
        }
    }
}

/// One entry of a guest process listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestProcess {
    pub pid: i64,
    /// Set once the guest reports an end time for the process.
    pub end_time_known: bool,
    /// Only meaningful once `end_time_known` is set.
    pub exit_code: Option<i32>,
}

impl GuestProcess {
    pub fn is_terminated(&self) -> bool {
        self.end_time_known
    }
}

/// States of one `exec` task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Init,
    StartRequested,
    Running { pid: i64 },
    Drained { exit_code: i32 },
    Done,
    Failed,
}

impl fmt::Display for ExecState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecState::Init => f.write_str("init"),
            ExecState::StartRequested => f.write_str("start-requested"),
            ExecState::Running { pid } => write!(f, "running(pid={pid})"),
            ExecState::Drained { exit_code } => write!(f, "drained(exit={exit_code})"),
            ExecState::Done => f.write_str("done"),
            ExecState::Failed => f.write_str("failed"),
        }
    }
}
