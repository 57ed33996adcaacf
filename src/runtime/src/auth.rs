//! Guest credential validation.

use vsphere_guest_core::{classify, CallContext, Result};

use crate::vim::{GuestTarget, VimApi};

/// Validate the target's credential in the guest.
///
/// Must succeed before any other guest call; the validated target is then
/// reused for the rest of the task.
pub async fn validate_guest_credentials(api: &dyn VimApi, target: &GuestTarget) -> Result<()> {
    api.validate_credentials(target)
        .await
        .map_err(|f| classify(&f, CallContext::Authenticate))?;

    tracing::debug!(
        vm = %target.vm,
        user = %target.credential.username,
        "Guest credentials validated"
    );
    Ok(())
}
