//! `urn:vim25` SOAP client.
//!
//! Envelopes are written by hand and responses parsed into an [`Element`]
//! tree; only the fields the transport reads are extracted. The session
//! cookie set by `Login` is replayed on every later call.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use vsphere_guest_core::{
    Fault, GuestConfig, GuestProcess, ProgramSpec, TransferDirection, TransferTicket, VendorFault,
};

use super::xml::{self, esc, Element};
use super::{
    GuestCredential, GuestManagers, GuestTarget, ManagedObjectRef, ServiceContent, VimApi,
    VmProperties,
};
use crate::http::{build_client, transport_fault};
use crate::tls;

/// API version announced before the service reports its own.
const DEFAULT_API_VERSION: &str = "6.5";

/// Name of the session cookie issued by `Login`.
const SESSION_COOKIE: &str = "vmware_soap_session";

const ENVELOPE_OPEN: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8"?>"#,
    r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" "#,
    r#"xmlns:xsd="http://www.w3.org/2001/XMLSchema" "#,
    r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
    "<soapenv:Body>"
);

const ENVELOPE_CLOSE: &str = "</soapenv:Body></soapenv:Envelope>";

#[derive(Debug, Default)]
struct SoapState {
    cookie: Option<String>,
    api_version: Option<String>,
}

/// SOAP implementation of [`VimApi`].
pub struct SoapVimApi {
    http: reqwest::Client,
    url: String,
    host: String,
    verify_tls: bool,
    state: Mutex<SoapState>,
}

impl SoapVimApi {
    /// Client for the endpoint in `config`; no request is sent yet.
    pub fn new(config: &GuestConfig) -> Result<Self, Fault> {
        Self::with_url(config.sdk_url(), &config.endpoint_host, config.verify_tls)
    }

    /// Client for an explicit SDK URL.
    pub fn with_url(url: impl Into<String>, host: &str, verify_tls: bool) -> Result<Self, Fault> {
        Ok(Self {
            http: build_client(verify_tls)?,
            url: url.into(),
            host: host.to_string(),
            verify_tls,
            state: Mutex::new(SoapState::default()),
        })
    }

    /// Send one operation and return its `<{operation}Response>` element.
    async fn invoke(&self, operation: &str, body: String) -> Result<Element, Fault> {
        let (cookie, api_version) = {
            let state = self.state.lock();
            (
                state.cookie.clone(),
                state
                    .api_version
                    .clone()
                    .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            )
        };

        if !self.verify_tls {
            tls::warn_insecure_request(&self.host);
        }
        tracing::trace!(operation, "SOAP request");

        let mut request = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", format!("urn:vim25/{}", api_version))
            .body(format!("{ENVELOPE_OPEN}{body}{ENVELOPE_CLOSE}"));
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await.map_err(|e| transport_fault(&e))?;
        let status = response.status();

        if let Some(cookie) = session_cookie(response.headers()) {
            self.state.lock().cookie = Some(cookie);
        }

        let text = response.text().await.map_err(|e| transport_fault(&e))?;
        let root = xml::parse(&text).map_err(|e| {
            if status.is_success() {
                Fault::Malformed(format!("{operation}: {e}"))
            } else {
                Fault::HttpStatus {
                    status: status.as_u16(),
                    detail: format!("{operation}: {e}"),
                }
            }
        })?;

        let body = root
            .child("Body")
            .ok_or_else(|| Fault::Malformed(format!("{operation}: missing SOAP body")))?;

        if let Some(fault) = body.child("Fault") {
            let fault = parse_fault(fault);
            tracing::debug!(operation, fault_type = %fault.fault_type, "SOAP fault");
            return Err(Fault::Vendor(fault));
        }

        if !status.is_success() {
            return Err(Fault::HttpStatus {
                status: status.as_u16(),
                detail: format!("{operation} returned no fault detail"),
            });
        }

        let response_name = format!("{operation}Response");
        body.child(&response_name)
            .cloned()
            .ok_or_else(|| Fault::Malformed(format!("{operation}: missing {response_name}")))
    }

    async fn retrieve_properties(
        &self,
        content: &ServiceContent,
        obj: &ManagedObjectRef,
        paths: &[&str],
    ) -> Result<Vec<(String, Element)>, Fault> {
        let path_set: String = paths
            .iter()
            .map(|p| format!("<pathSet>{}</pathSet>", esc(p)))
            .collect();
        let body = format!(
            concat!(
                r#"<RetrieveProperties xmlns="urn:vim25">{}"#,
                "<specSet><propSet><type>{}</type>{}</propSet>",
                "<objectSet>{}</objectSet></specSet></RetrieveProperties>"
            ),
            this(&content.property_collector),
            esc(&obj.kind),
            path_set,
            moref_xml("obj", obj),
        );
        let response = self.invoke("RetrieveProperties", body).await?;

        let mut props = Vec::new();
        for object in response.children_named("returnval") {
            for prop in object.children_named("propSet") {
                if let (Some(name), Some(val)) = (prop.child_text("name"), prop.child("val")) {
                    props.push((name.to_string(), val.clone()));
                }
            }
        }
        Ok(props)
    }
}

#[async_trait]
impl VimApi for SoapVimApi {
    async fn retrieve_service_content(&self) -> Result<ServiceContent, Fault> {
        let body = concat!(
            r#"<RetrieveServiceContent xmlns="urn:vim25">"#,
            r#"<_this type="ServiceInstance">ServiceInstance</_this>"#,
            "</RetrieveServiceContent>"
        )
        .to_string();
        let response = self.invoke("RetrieveServiceContent", body).await?;
        let content = response
            .child("returnval")
            .ok_or_else(|| Fault::Malformed("RetrieveServiceContent: missing returnval".into()))?;

        let service_content = ServiceContent {
            session_manager: required_moref(content, "sessionManager")?,
            search_index: required_moref(content, "searchIndex")?,
            property_collector: required_moref(content, "propertyCollector")?,
            guest_operations_manager: content
                .child("guestOperationsManager")
                .map(parse_moref)
                .transpose()?,
            api_version: content
                .path(&["about", "apiVersion"])
                .map(|v| v.text.trim().to_string()),
        };

        if let Some(version) = &service_content.api_version {
            tracing::debug!(api_version = %version, "Connected to vSphere API");
            self.state.lock().api_version = Some(version.clone());
        }
        Ok(service_content)
    }

    async fn login(
        &self,
        content: &ServiceContent,
        user: &str,
        password: &str,
    ) -> Result<(), Fault> {
        let body = format!(
            r#"<Login xmlns="urn:vim25">{}<userName>{}</userName><password>{}</password></Login>"#,
            this(&content.session_manager),
            esc(user),
            esc(password),
        );
        self.invoke("Login", body).await?;
        Ok(())
    }

    async fn logout(&self, content: &ServiceContent) -> Result<(), Fault> {
        let body = format!(
            r#"<Logout xmlns="urn:vim25">{}</Logout>"#,
            this(&content.session_manager)
        );
        let result = self.invoke("Logout", body).await;
        self.state.lock().cookie = None;
        result.map(|_| ())
    }

    async fn find_by_inventory_path(
        &self,
        content: &ServiceContent,
        path: &str,
    ) -> Result<Option<ManagedObjectRef>, Fault> {
        let body = format!(
            r#"<FindByInventoryPath xmlns="urn:vim25">{}<inventoryPath>{}</inventoryPath></FindByInventoryPath>"#,
            this(&content.search_index),
            esc(path),
        );
        let response = self.invoke("FindByInventoryPath", body).await?;
        response.child("returnval").map(parse_moref).transpose()
    }

    async fn find_by_uuid(
        &self,
        content: &ServiceContent,
        uuid: &str,
    ) -> Result<Option<ManagedObjectRef>, Fault> {
        let body = format!(
            concat!(
                r#"<FindByUuid xmlns="urn:vim25">{}<uuid>{}</uuid>"#,
                "<vmSearch>true</vmSearch><instanceUuid>true</instanceUuid></FindByUuid>"
            ),
            this(&content.search_index),
            esc(uuid),
        );
        let response = self.invoke("FindByUuid", body).await?;
        response.child("returnval").map(parse_moref).transpose()
    }

    async fn vm_properties(
        &self,
        content: &ServiceContent,
        vm: &ManagedObjectRef,
    ) -> Result<VmProperties, Fault> {
        let props = self
            .retrieve_properties(content, vm, &["runtime.powerState", "guest.guestFamily"])
            .await?;

        let mut power_state = None;
        let mut guest_family = None;
        for (name, val) in props {
            match name.as_str() {
                "runtime.powerState" => power_state = Some(val.text.trim().to_string()),
                "guest.guestFamily" => guest_family = Some(val.text.trim().to_string()),
                _ => {}
            }
        }

        Ok(VmProperties {
            power_state: power_state.ok_or_else(|| {
                Fault::Malformed(format!("{vm}: runtime.powerState not returned"))
            })?,
            guest_family,
        })
    }

    async fn guest_managers(&self, content: &ServiceContent) -> Result<GuestManagers, Fault> {
        let manager = content.guest_operations_manager.as_ref().ok_or_else(|| {
            Fault::Malformed("service does not expose a guest operations manager".into())
        })?;
        let props = self
            .retrieve_properties(content, manager, &["authManager", "fileManager", "processManager"])
            .await?;

        let find = |name: &str| -> Result<ManagedObjectRef, Fault> {
            props
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, val)| parse_moref(val))
                .unwrap_or_else(|| Err(Fault::Malformed(format!("{name} not returned"))))
        };

        Ok(GuestManagers {
            auth: find("authManager")?,
            file: find("fileManager")?,
            process: find("processManager")?,
        })
    }

    async fn validate_credentials(&self, target: &GuestTarget) -> Result<(), Fault> {
        let body = format!(
            r#"<ValidateCredentialsInGuest xmlns="urn:vim25">{}</ValidateCredentialsInGuest>"#,
            guest_call_head(&target.managers.auth, target),
        );
        self.invoke("ValidateCredentialsInGuest", body).await?;
        Ok(())
    }

    async fn create_temporary_file(
        &self,
        target: &GuestTarget,
        prefix: &str,
        suffix: &str,
    ) -> Result<String, Fault> {
        let body = format!(
            concat!(
                r#"<CreateTemporaryFileInGuest xmlns="urn:vim25">{}"#,
                "<prefix>{}</prefix><suffix>{}</suffix></CreateTemporaryFileInGuest>"
            ),
            guest_call_head(&target.managers.file, target),
            esc(prefix),
            esc(suffix),
        );
        let response = self.invoke("CreateTemporaryFileInGuest", body).await?;
        response
            .child("returnval")
            .map(|v| v.text.trim().to_string())
            .ok_or_else(|| Fault::Malformed("CreateTemporaryFileInGuest: missing returnval".into()))
    }

    async fn delete_file(&self, target: &GuestTarget, path: &str) -> Result<(), Fault> {
        let body = format!(
            r#"<DeleteFileInGuest xmlns="urn:vim25">{}<filePath>{}</filePath></DeleteFileInGuest>"#,
            guest_call_head(&target.managers.file, target),
            esc(path),
        );
        self.invoke("DeleteFileInGuest", body).await?;
        Ok(())
    }

    async fn initiate_transfer_from_guest(
        &self,
        target: &GuestTarget,
        path: &str,
    ) -> Result<TransferTicket, Fault> {
        let body = format!(
            concat!(
                r#"<InitiateFileTransferFromGuest xmlns="urn:vim25">{}"#,
                "<guestFilePath>{}</guestFilePath></InitiateFileTransferFromGuest>"
            ),
            guest_call_head(&target.managers.file, target),
            esc(path),
        );
        let response = self.invoke("InitiateFileTransferFromGuest", body).await?;
        let info = response.child("returnval").ok_or_else(|| {
            Fault::Malformed("InitiateFileTransferFromGuest: missing returnval".into())
        })?;
        let url = info.child_text("url").ok_or_else(|| {
            Fault::Malformed("InitiateFileTransferFromGuest: missing url".into())
        })?;

        Ok(TransferTicket {
            url: url.to_string(),
            size_bytes: info.child_text("size").and_then(|s| s.parse().ok()),
            direction: TransferDirection::Out,
        })
    }

    async fn initiate_transfer_to_guest(
        &self,
        target: &GuestTarget,
        path: &str,
        size: u64,
        overwrite: bool,
    ) -> Result<TransferTicket, Fault> {
        let body = format!(
            concat!(
                r#"<InitiateFileTransferToGuest xmlns="urn:vim25">{}"#,
                "<guestFilePath>{}</guestFilePath>",
                r#"<fileAttributes xsi:type="GuestFileAttributes"/>"#,
                "<fileSize>{}</fileSize><overwrite>{}</overwrite>",
                "</InitiateFileTransferToGuest>"
            ),
            guest_call_head(&target.managers.file, target),
            esc(path),
            size,
            overwrite,
        );
        let response = self.invoke("InitiateFileTransferToGuest", body).await?;
        let url = response.child_text("returnval").ok_or_else(|| {
            Fault::Malformed("InitiateFileTransferToGuest: missing returnval".into())
        })?;

        Ok(TransferTicket {
            url: url.to_string(),
            size_bytes: Some(size),
            direction: TransferDirection::In,
        })
    }

    async fn start_program(&self, target: &GuestTarget, spec: &ProgramSpec) -> Result<i64, Fault> {
        let body = format!(
            concat!(
                r#"<StartProgramInGuest xmlns="urn:vim25">{}"#,
                r#"<spec xsi:type="GuestProgramSpec"><programPath>{}</programPath>"#,
                "<arguments>{}</arguments></spec></StartProgramInGuest>"
            ),
            guest_call_head(&target.managers.process, target),
            esc(&spec.program_path),
            esc(&spec.arguments),
        );
        let response = self.invoke("StartProgramInGuest", body).await?;
        response
            .child_text("returnval")
            .and_then(|pid| pid.parse().ok())
            .ok_or_else(|| Fault::Malformed("StartProgramInGuest: missing or invalid pid".into()))
    }

    async fn list_processes(
        &self,
        target: &GuestTarget,
        pids: &[i64],
    ) -> Result<Vec<GuestProcess>, Fault> {
        let pid_list: String = pids.iter().map(|pid| format!("<pids>{pid}</pids>")).collect();
        let body = format!(
            r#"<ListProcessesInGuest xmlns="urn:vim25">{}{}</ListProcessesInGuest>"#,
            guest_call_head(&target.managers.process, target),
            pid_list,
        );
        let response = self.invoke("ListProcessesInGuest", body).await?;
        response
            .children_named("returnval")
            .map(parse_process)
            .collect()
    }
}

fn moref_xml(tag: &str, moref: &ManagedObjectRef) -> String {
    format!(
        r#"<{tag} type="{}">{}</{tag}>"#,
        esc(&moref.kind),
        esc(&moref.value)
    )
}

fn this(moref: &ManagedObjectRef) -> String {
    moref_xml("_this", moref)
}

fn auth_xml(credential: &GuestCredential) -> String {
    format!(
        concat!(
            r#"<auth xsi:type="NamePasswordAuthentication">"#,
            "<interactiveSession>{}</interactiveSession>",
            "<username>{}</username><password>{}</password></auth>"
        ),
        credential.interactive(),
        esc(&credential.username),
        esc(&credential.password),
    )
}

/// `_this`, `vm` and `auth`, the common head of every guest operation.
fn guest_call_head(manager: &ManagedObjectRef, target: &GuestTarget) -> String {
    format!(
        "{}{}{}",
        this(manager),
        moref_xml("vm", &target.vm),
        auth_xml(&target.credential)
    )
}

fn parse_moref(el: &Element) -> Result<ManagedObjectRef, Fault> {
    let kind = el
        .attr("type")
        .ok_or_else(|| Fault::Malformed(format!("{}: managed object reference without type", el.name)))?;
    Ok(ManagedObjectRef::new(kind, el.text.trim()))
}

fn required_moref(parent: &Element, name: &str) -> Result<ManagedObjectRef, Fault> {
    parent
        .child(name)
        .ok_or_else(|| Fault::Malformed(format!("missing {name}")))
        .and_then(parse_moref)
}

fn parse_process(info: &Element) -> Result<GuestProcess, Fault> {
    let pid = info
        .child_text("pid")
        .and_then(|pid| pid.parse().ok())
        .ok_or_else(|| Fault::Malformed("GuestProcessInfo without pid".into()))?;
    let end_time_known = info
        .child_text("endTime")
        .map(|t| !t.is_empty())
        .unwrap_or(false);
    let exit_code = info.child_text("exitCode").and_then(|c| c.parse().ok());

    Ok(GuestProcess {
        pid,
        end_time_known,
        exit_code,
    })
}

/// Turn `<soapenv:Fault>` into a [`VendorFault`].
fn parse_fault(fault: &Element) -> VendorFault {
    let message = fault.child_text("faultstring").unwrap_or_default().to_string();
    let detail = fault.child("detail").and_then(|d| d.children.first());

    let Some(detail) = detail else {
        let code = fault.child_text("faultcode").unwrap_or("Fault");
        let fault_type = code.rsplit(':').next().unwrap_or(code);
        return VendorFault::new(fault_type, message);
    };

    let fault_type = match detail.attr("type") {
        Some(t) => t.rsplit(':').next().unwrap_or(t).to_string(),
        None => detail
            .name
            .strip_suffix("Fault")
            .unwrap_or(&detail.name)
            .to_string(),
    };

    VendorFault {
        fault_type,
        message,
        reason: detail.child("reason").map(|r| r.text.clone()),
        privilege_id: detail.child_text("privilegeId").map(str::to_string),
    }
}

/// Extract `vmware_soap_session=...` from the response cookies.
fn session_cookie(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.trim_start().starts_with(SESSION_COOKIE))
        .and_then(|value| value.split(';').next())
        .map(|pair| pair.trim().to_string())
}
