//! VM lookup by inventory path or instance UUID.

use vsphere_guest_core::{classify, CallContext, ErrorKind, Fault, GuestError, Result, VmSelector};

use crate::session::EndpointSession;
use crate::vim::{GuestManagers, ManagedObjectRef, VmProperties};

/// A located, powered-on VM.
#[derive(Debug, Clone)]
pub struct LocatedVm {
    pub vm: ManagedObjectRef,
    pub properties: VmProperties,
    pub managers: GuestManagers,
}

/// Resolve `selector` and check the VM can take guest operations.
pub async fn locate_vm(session: &EndpointSession, selector: &VmSelector) -> Result<LocatedVm> {
    let api = session.api();
    let content = session.content()?;
    let ctx = |f: Fault| classify(&f, CallContext::LocateVm);

    let found = match selector {
        VmSelector::InventoryPath(path) => api.find_by_inventory_path(content, path).await,
        VmSelector::Uuid(uuid) => api.find_by_uuid(content, uuid).await,
    }
    .map_err(ctx)?;

    let vm = found.ok_or_else(|| {
        GuestError::new(
            ErrorKind::VmNotFound,
            format!("Unable to find VM by {selector}"),
        )
    })?;

    let properties = api.vm_properties(content, &vm).await.map_err(ctx)?;
    if !properties.is_powered_on() {
        return Err(GuestError::new(
            ErrorKind::VmPowerState,
            format!("VM {} is {}, expected poweredOn", vm.value, properties.power_state),
        ));
    }

    let managers = api.guest_managers(content).await.map_err(ctx)?;

    tracing::debug!(
        vm = %vm,
        family = ?properties.family(),
        "Located target VM"
    );
    Ok(LocatedVm {
        vm,
        properties,
        managers,
    })
}
