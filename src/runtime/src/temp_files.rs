//! Guest-side temporary files.

use vsphere_guest_core::{classify, CallContext, Fault, Result};

use crate::vim::{GuestTarget, VimApi};

/// Create a temporary file in the guest and return its path.
pub async fn create_temp_file(
    api: &dyn VimApi,
    target: &GuestTarget,
    prefix: &str,
    suffix: &str,
) -> Result<String> {
    let path = api
        .create_temporary_file(target, prefix, suffix)
        .await
        .map_err(|f| classify(&f, CallContext::TempFile))?;
    tracing::trace!(path = %path, "Created guest temp file");
    Ok(path)
}

/// Delete a guest file. A file that is already gone counts as deleted.
pub async fn delete_temp_file(api: &dyn VimApi, target: &GuestTarget, path: &str) -> Result<()> {
    match api.delete_file(target, path).await {
        Ok(()) => Ok(()),
        Err(Fault::Vendor(ref v)) if v.fault_type == "FileNotFound" => {
            tracing::debug!(path, "Guest temp file already gone");
            Ok(())
        }
        Err(fault) => Err(classify(&fault, CallContext::TempFile)),
    }
}

/// Delete every path, logging failures instead of raising them.
pub async fn delete_best_effort(api: &dyn VimApi, target: &GuestTarget, paths: &[String]) {
    for path in paths {
        if let Err(e) = delete_temp_file(api, target, path).await {
            tracing::warn!(path = %path, error = %e, "Failed to delete guest temp file");
        }
    }
}
