//! Process runner: start a program in the guest and poll it to completion.
//!
//! ```text
//! Init -> StartRequested -> Running -> Drained -> Done
//!                  \-> Failed
//! ```
//!
//! Both capture files are created before `StartProgramInGuest` and are
//! deleted on every exit path, including failures and cancellation.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use vsphere_guest_core::exec::{CAPTURE_FILE_PREFIX, STDERR_SUFFIX, STDOUT_SUFFIX};
use vsphere_guest_core::{
    build_program_spec, classify, CallContext, ErrorKind, ExecOutcome, ExecOutput, ExecState,
    GuestError, Result,
};

use crate::temp_files::{create_temp_file, delete_best_effort};
use crate::transfer::FileTransfer;
use crate::vim::{GuestTarget, VimApi};

/// Runs one command per call against a validated guest target.
pub struct ProcessRunner<'a> {
    api: &'a dyn VimApi,
    target: &'a GuestTarget,
    transfer: &'a FileTransfer,
    shell: &'a str,
    poll_interval: Duration,
}

/// Captured streams of one run.
struct CaptureFiles {
    stdout: String,
    stderr: String,
}

impl<'a> ProcessRunner<'a> {
    pub fn new(
        api: &'a dyn VimApi,
        target: &'a GuestTarget,
        transfer: &'a FileTransfer,
        shell: &'a str,
        poll_interval: Duration,
    ) -> Self {
        Self {
            api,
            target,
            transfer,
            shell,
            poll_interval,
        }
    }

    /// Run `cmd` and return its exit code and captured streams.
    ///
    /// `cancel` is checked between polls; a cancelled run returns
    /// [`ExecOutcome::Cancelled`] after the capture files are removed. The
    /// guest process itself is left running.
    pub async fn run(&self, cmd: &str, cancel: &CancellationToken) -> Result<ExecOutcome> {
        let mut state = ExecState::Init;

        let files = match self.create_capture_files().await {
            Ok(files) => files,
            Err(e) => {
                self.transition(&mut state, ExecState::Failed);
                return Err(e);
            }
        };

        let result = self.run_captured(cmd, &files, cancel, &mut state).await;

        delete_best_effort(
            self.api,
            self.target,
            &[files.stdout.clone(), files.stderr.clone()],
        )
        .await;

        match &result {
            Ok(ExecOutcome::Completed(_)) => self.transition(&mut state, ExecState::Done),
            Ok(ExecOutcome::Cancelled) => {
                tracing::info!(vm = %self.target.vm, %state, "Guest command cancelled");
            }
            Err(e) => {
                tracing::debug!(error = %e, "Guest command failed");
                self.transition(&mut state, ExecState::Failed);
            }
        }
        result
    }

    async fn create_capture_files(&self) -> Result<CaptureFiles> {
        let stdout =
            create_temp_file(self.api, self.target, CAPTURE_FILE_PREFIX, STDOUT_SUFFIX).await?;
        match create_temp_file(self.api, self.target, CAPTURE_FILE_PREFIX, STDERR_SUFFIX).await {
            Ok(stderr) => Ok(CaptureFiles { stdout, stderr }),
            Err(e) => {
                delete_best_effort(self.api, self.target, &[stdout]).await;
                Err(e)
            }
        }
    }

    async fn run_captured(
        &self,
        cmd: &str,
        files: &CaptureFiles,
        cancel: &CancellationToken,
        state: &mut ExecState,
    ) -> Result<ExecOutcome> {
        let spec = build_program_spec(
            self.target.family,
            self.shell,
            cmd,
            &files.stdout,
            &files.stderr,
        );

        self.transition(state, ExecState::StartRequested);
        let pid = self
            .api
            .start_program(self.target, &spec)
            .await
            .map_err(|f| classify(&f, CallContext::StartProgram))?;
        self.transition(state, ExecState::Running { pid });

        let exit_code = match self.wait_for_exit(pid, cancel).await? {
            Some(code) => code,
            None => return Ok(ExecOutcome::Cancelled),
        };
        self.transition(state, ExecState::Drained { exit_code });

        let stdout = self
            .transfer
            .fetch_bytes(self.api, self.target, &files.stdout)
            .await?;
        let stderr = self
            .transfer
            .fetch_bytes(self.api, self.target, &files.stderr)
            .await?;

        Ok(ExecOutcome::Completed(ExecOutput {
            stdout,
            stderr,
            exit_code,
        }))
    }

    /// Poll until `pid` reports an end time. `None` means cancelled.
    async fn wait_for_exit(&self, pid: i64, cancel: &CancellationToken) -> Result<Option<i32>> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            let processes = self
                .api
                .list_processes(self.target, &[pid])
                .await
                .map_err(|f| classify(&f, CallContext::ListProcesses))?;

            let process = processes.iter().find(|p| p.pid == pid).ok_or_else(|| {
                GuestError::new(
                    ErrorKind::ProtocolFault,
                    format!("Process {pid} missing from guest process listing"),
                )
            })?;

            if process.is_terminated() {
                let code = process.exit_code.ok_or_else(|| {
                    GuestError::new(
                        ErrorKind::ProtocolFault,
                        format!("Process {pid} ended without an exit code"),
                    )
                })?;
                return Ok(Some(code));
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    fn transition(&self, state: &mut ExecState, next: ExecState) {
        tracing::debug!(from = %state, to = %next, "exec state");
        *state = next;
    }
}
