//! Per-family command wrapping.
//!
//! Output capture is done by the guest's own interpreter: the caller's
//! command line gets `1> <stdout> 2> <stderr>` appended and is handed to
//! `cmd.exe` on Windows or to the configured shell elsewhere.

use serde::{Deserialize, Serialize};

/// Interpreter used for Windows guests.
pub const WINDOWS_INTERPRETER: &str = "cmd.exe";

/// `guest.guestFamily` value reported for Windows guests.
const WINDOWS_GUEST_FAMILY: &str = "windowsGuest";

/// Coarse guest OS classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuestFamily {
    Posix,
    Windows,
}

impl GuestFamily {
    /// Classify the `guest.guestFamily` property of a VM.
    ///
    /// Anything that is not reported as a Windows guest, including an unset
    /// family, is treated as POSIX.
    pub fn from_reported(guest_family: Option<&str>) -> Self {
        match guest_family {
            Some(WINDOWS_GUEST_FAMILY) => GuestFamily::Windows,
            _ => GuestFamily::Posix,
        }
    }
}

/// Program and argument string sent to `StartProgramInGuest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramSpec {
    pub program_path: String,
    pub arguments: String,
}

/// Wrap `cmd` for the guest family, redirecting its streams to the given
/// guest paths.
pub fn build_program_spec(
    family: GuestFamily,
    shell: &str,
    cmd: &str,
    stdout_path: &str,
    stderr_path: &str,
) -> ProgramSpec {
    let (program_path, arguments) = match family {
        // Starting the caller's interpreter directly is refused by the guest
        // service with a permission error, so everything goes through cmd.
        GuestFamily::Windows => (WINDOWS_INTERPRETER.to_string(), format!("/c {cmd}")),
        GuestFamily::Posix => (shell.to_string(), strip_interpreter(shell, cmd).to_string()),
    };

    ProgramSpec {
        program_path,
        arguments: format!("{arguments} 1> {stdout_path} 2> {stderr_path}"),
    }
}

/// Drop one leading `shell` (and the whitespace after it) from `cmd`.
///
/// Only a whole word matches: `/bin/shx` is left alone when the shell is
/// `/bin/sh`.
fn strip_interpreter<'a>(shell: &str, cmd: &'a str) -> &'a str {
    if shell.is_empty() {
        return cmd;
    }
    match cmd.strip_prefix(shell) {
        Some(rest) if rest.is_empty() => rest,
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start(),
        _ => cmd,
    }
}
