//! Endpoint session: login to vCenter/ESXi and teardown.

use std::sync::Arc;

use vsphere_guest_core::{classify, CallContext, ErrorKind, GuestError, Result};

use crate::vim::{ServiceContent, VimApi};

/// One authenticated session against the service.
pub struct EndpointSession {
    api: Arc<dyn VimApi>,
    user: String,
    password: String,
    content: Option<ServiceContent>,
}

impl EndpointSession {
    pub fn new(api: Arc<dyn VimApi>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            api,
            user: user.into(),
            password: password.into(),
            content: None,
        }
    }

    /// Retrieve the service content and log in.
    pub async fn connect(&mut self) -> Result<()> {
        let content = self
            .api
            .retrieve_service_content()
            .await
            .map_err(|f| classify(&f, CallContext::Login))?;

        self.api
            .login(&content, &self.user, &self.password)
            .await
            .map_err(|f| classify(&f, CallContext::Login))?;

        tracing::debug!(
            user = %self.user,
            api_version = content.api_version.as_deref().unwrap_or("unknown"),
            "Endpoint session established"
        );
        self.content = Some(content);
        Ok(())
    }

    /// Log out. Safe to call on a closed session; logout failures are only
    /// logged.
    pub async fn close(&mut self) {
        let Some(content) = self.content.take() else {
            return;
        };
        match self.api.logout(&content).await {
            Ok(()) => tracing::debug!("Endpoint session closed"),
            Err(fault) => tracing::warn!(error = %fault, "Logout failed, dropping session"),
        }
    }

    /// Close and log in again.
    pub async fn reopen(&mut self) -> Result<()> {
        self.close().await;
        self.connect().await
    }

    pub fn is_open(&self) -> bool {
        self.content.is_some()
    }

    /// Service content of the live session.
    pub fn content(&self) -> Result<&ServiceContent> {
        self.content.as_ref().ok_or_else(|| {
            GuestError::new(ErrorKind::ProtocolFault, "Endpoint session is not connected")
        })
    }

    pub fn api(&self) -> &Arc<dyn VimApi> {
        &self.api
    }
}
