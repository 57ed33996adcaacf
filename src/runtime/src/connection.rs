//! Guest connection: the `exec` / `put_file` / `fetch_file` contract over
//! one endpoint session and one validated guest target.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use vsphere_guest_core::{
    classify, CallContext, ErrorKind, ExecOutcome, GuestConfig, GuestError, Result,
};

use crate::auth::validate_guest_credentials;
use crate::locator::locate_vm;
use crate::runner::ProcessRunner;
use crate::session::EndpointSession;
use crate::transfer::FileTransfer;
use crate::vim::{GuestCredential, GuestTarget, SoapVimApi, VimApi};

/// An authenticated connection to one VM's guest OS.
///
/// Each task owns its connection; nothing is shared between connections
/// except the process-wide insecure-TLS warning latch.
pub struct GuestConnection {
    config: GuestConfig,
    session: EndpointSession,
    target: GuestTarget,
    transfer: FileTransfer,
    cancel: CancellationToken,
}

impl GuestConnection {
    /// Validate `config`, log in over SOAP, locate the VM and validate the
    /// guest credential.
    pub async fn connect(config: GuestConfig) -> Result<Self> {
        config.validate()?;
        let api = SoapVimApi::new(&config).map_err(|f| classify(&f, CallContext::Login))?;
        Self::connect_with(config, Arc::new(api)).await
    }

    /// Like [`connect`](Self::connect) with a caller-supplied API client.
    pub async fn connect_with(config: GuestConfig, api: Arc<dyn VimApi>) -> Result<Self> {
        config.validate()?;
        let selector = config.vm_selector()?;
        let transfer = FileTransfer::new(&config)?;

        let mut session = EndpointSession::new(api, &config.endpoint_user, &config.endpoint_pass);
        session.connect().await?;

        let target = match Self::prepare_target(&session, &config).await {
            Ok(target) => target,
            Err(e) => {
                session.close().await;
                return Err(e);
            }
        };

        tracing::info!(
            host = %config.endpoint_host,
            vm = %selector,
            family = ?target.family,
            "Guest connection established"
        );
        Ok(Self {
            config,
            session,
            target,
            transfer,
            cancel: CancellationToken::new(),
        })
    }

    async fn prepare_target(session: &EndpointSession, config: &GuestConfig) -> Result<GuestTarget> {
        let located = locate_vm(session, &config.vm_selector()?).await?;
        let target = GuestTarget {
            family: located.properties.family(),
            vm: located.vm,
            managers: located.managers,
            credential: GuestCredential::new(&config.guest_user, &config.guest_pass),
        };
        validate_guest_credentials(session.api().as_ref(), &target).await?;
        Ok(target)
    }

    /// Token consulted by [`exec`](Self::exec) between polls.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn target(&self) -> &GuestTarget {
        &self.target
    }

    /// Run `cmd` in the guest until it exits or the connection's token is
    /// cancelled.
    pub async fn exec(&self, cmd: &str) -> Result<ExecOutcome> {
        self.exec_with_cancel(cmd, &self.cancel).await
    }

    /// Run `cmd` with an explicit cancellation token.
    pub async fn exec_with_cancel(
        &self,
        cmd: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecOutcome> {
        self.ensure_open()?;
        tracing::debug!(vm = %self.target.vm, cmd, "Executing guest command");
        let poll_interval = self.config.poll_interval()?;

        let runner = ProcessRunner::new(
            self.session.api().as_ref(),
            &self.target,
            &self.transfer,
            &self.config.shell,
            poll_interval,
        );
        runner.run(cmd, cancel).await
    }

    /// Upload `local` to `remote`, overwriting it.
    pub async fn put_file(&self, local: &Path, remote: &str) -> Result<()> {
        self.ensure_open()?;
        self.transfer
            .put_file(self.session.api().as_ref(), &self.target, local, remote)
            .await
    }

    /// Download `remote` to `local`.
    pub async fn fetch_file(&self, remote: &str, local: &Path) -> Result<()> {
        self.ensure_open()?;
        self.transfer
            .fetch_to_path(self.session.api().as_ref(), &self.target, remote, local)
            .await
    }

    /// Close and reopen the endpoint session. The located VM and the
    /// validated guest credential are kept as they are.
    pub async fn reset(&mut self) -> Result<()> {
        tracing::info!(host = %self.config.endpoint_host, "Resetting endpoint session");
        self.session.reopen().await
    }

    /// End the session. Safe to call more than once.
    pub async fn close(&mut self) {
        self.session.close().await;
    }

    pub fn is_open(&self) -> bool {
        self.session.is_open()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.session.is_open() {
            Ok(())
        } else {
            Err(GuestError::new(
                ErrorKind::ProtocolFault,
                "Guest connection is closed",
            ))
        }
    }
}
