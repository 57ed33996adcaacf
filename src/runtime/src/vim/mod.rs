//! vSphere API surface used by the transport.
//!
//! - `VimApi`: the remote operations the transport depends on.
//! - `SoapVimApi`: the `urn:vim25` SOAP implementation over HTTPS.
//!
//! Every method fails with a raw [`Fault`]; callers classify it with the
//! [`CallContext`](vsphere_guest_core::CallContext) of the call.

mod soap;
pub mod xml;

use std::fmt;

use async_trait::async_trait;
use vsphere_guest_core::{Fault, GuestFamily, GuestProcess, ProgramSpec, TransferTicket};

pub use soap::SoapVimApi;

/// Server-side reference to a managed object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManagedObjectRef {
    pub kind: String,
    pub value: String,
}

impl ManagedObjectRef {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for ManagedObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// The parts of `ServiceContent` the transport uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceContent {
    pub session_manager: ManagedObjectRef,
    pub search_index: ManagedObjectRef,
    pub property_collector: ManagedObjectRef,
    pub guest_operations_manager: Option<ManagedObjectRef>,
    pub api_version: Option<String>,
}

/// VM properties read after lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmProperties {
    pub power_state: String,
    pub guest_family: Option<String>,
}

impl VmProperties {
    pub fn is_powered_on(&self) -> bool {
        self.power_state == "poweredOn"
    }

    pub fn family(&self) -> GuestFamily {
        GuestFamily::from_reported(self.guest_family.as_deref())
    }
}

/// Guest operations sub-managers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestManagers {
    pub auth: ManagedObjectRef,
    pub file: ManagedObjectRef,
    pub process: ManagedObjectRef,
}

/// Guest OS credential, always submitted as a non-interactive session.
#[derive(Clone, PartialEq, Eq)]
pub struct GuestCredential {
    pub username: String,
    pub password: String,
}

impl GuestCredential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn interactive(&self) -> bool {
        false
    }
}

impl fmt::Debug for GuestCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything a guest call needs: the VM, its sub-managers and the
/// credential.
#[derive(Debug, Clone)]
pub struct GuestTarget {
    pub vm: ManagedObjectRef,
    pub managers: GuestManagers,
    pub credential: GuestCredential,
    pub family: GuestFamily,
}

/// Remote operations of the vSphere service used by the transport.
#[async_trait]
pub trait VimApi: Send + Sync {
    async fn retrieve_service_content(&self) -> Result<ServiceContent, Fault>;

    async fn login(&self, content: &ServiceContent, user: &str, password: &str)
        -> Result<(), Fault>;

    async fn logout(&self, content: &ServiceContent) -> Result<(), Fault>;

    async fn find_by_inventory_path(
        &self,
        content: &ServiceContent,
        path: &str,
    ) -> Result<Option<ManagedObjectRef>, Fault>;

    /// Lookup by instance UUID, VMs only.
    async fn find_by_uuid(
        &self,
        content: &ServiceContent,
        uuid: &str,
    ) -> Result<Option<ManagedObjectRef>, Fault>;

    async fn vm_properties(
        &self,
        content: &ServiceContent,
        vm: &ManagedObjectRef,
    ) -> Result<VmProperties, Fault>;

    async fn guest_managers(&self, content: &ServiceContent) -> Result<GuestManagers, Fault>;

    async fn validate_credentials(&self, target: &GuestTarget) -> Result<(), Fault>;

    async fn create_temporary_file(
        &self,
        target: &GuestTarget,
        prefix: &str,
        suffix: &str,
    ) -> Result<String, Fault>;

    async fn delete_file(&self, target: &GuestTarget, path: &str) -> Result<(), Fault>;

    async fn initiate_transfer_from_guest(
        &self,
        target: &GuestTarget,
        path: &str,
    ) -> Result<TransferTicket, Fault>;

    async fn initiate_transfer_to_guest(
        &self,
        target: &GuestTarget,
        path: &str,
        size: u64,
        overwrite: bool,
    ) -> Result<TransferTicket, Fault>;

    async fn start_program(&self, target: &GuestTarget, spec: &ProgramSpec) -> Result<i64, Fault>;

    async fn list_processes(
        &self,
        target: &GuestTarget,
        pids: &[i64],
    ) -> Result<Vec<GuestProcess>, Fault>;
}
