//! Test doubles: an in-memory vSphere service and a tiny HTTP server.
//!
//! `MockVimApi` keeps a fake guest filesystem. Programs "run" by writing the
//! scripted stdout/stderr into the files named by their redirection suffix,
//! and transfer tickets point at `http://*:443/guestFile?id=N`, which the
//! server from [`spawn_file_server`] serves once the URL has been rewritten.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use vsphere_guest_core::{
    Fault, GuestFamily, GuestProcess, ProgramSpec, TransferDirection, TransferTicket, VendorFault,
};

use crate::vim::{
    GuestCredential, GuestManagers, GuestTarget, ManagedObjectRef, ServiceContent, VimApi,
    VmProperties,
};

/// Guest files and issued transfer tickets, shared with the file server.
#[derive(Debug, Default)]
pub(crate) struct GuestFs {
    pub files: HashMap<String, Vec<u8>>,
    pub tickets: HashMap<u64, String>,
    /// `(method, request target)` of every HTTP request served.
    pub requests: Vec<(String, String)>,
    /// Statuses returned instead of serving the next requests.
    pub http_failures: VecDeque<u16>,
}

#[derive(Debug)]
struct ProgramScript {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: i32,
    polls_before_exit: usize,
}

#[derive(Debug)]
struct MockState {
    calls: Vec<String>,
    faults: HashMap<String, VecDeque<Option<Fault>>>,
    power_state: String,
    vm_missing: bool,
    list_omits_pid: bool,
    program: ProgramScript,
    started: Vec<ProgramSpec>,
    polls: usize,
    next_id: u64,
}

pub(crate) struct MockVimApi {
    family: GuestFamily,
    state: Mutex<MockState>,
    fs: Arc<Mutex<GuestFs>>,
}

impl MockVimApi {
    pub fn posix() -> Self {
        Self::new(GuestFamily::Posix)
    }

    pub fn windows() -> Self {
        Self::new(GuestFamily::Windows)
    }

    fn new(family: GuestFamily) -> Self {
        Self {
            family,
            state: Mutex::new(MockState {
                calls: Vec::new(),
                faults: HashMap::new(),
                power_state: "poweredOn".to_string(),
                vm_missing: false,
                list_omits_pid: false,
                program: ProgramScript {
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                    exit_code: 0,
                    polls_before_exit: 0,
                },
                started: Vec::new(),
                polls: 0,
                next_id: 1,
            }),
            fs: Arc::new(Mutex::new(GuestFs::default())),
        }
    }

    pub fn fs(&self) -> Arc<Mutex<GuestFs>> {
        self.fs.clone()
    }

    /// A validated-looking target for this VM.
    pub fn target(&self) -> GuestTarget {
        GuestTarget {
            vm: ManagedObjectRef::new("VirtualMachine", "vm-42"),
            managers: managers(),
            credential: GuestCredential::new("root", "guest-pw"),
            family: self.family,
        }
    }

    /// Make the next call of `operation` fail with `fault`.
    pub fn fail_next(&self, operation: &str, fault: Fault) {
        self.state
            .lock()
            .faults
            .entry(operation.to_string())
            .or_default()
            .push_back(Some(fault));
    }

    /// Let the next call of `operation` through; queues ahead of later
    /// [`fail_next`](Self::fail_next) faults.
    pub fn pass_next(&self, operation: &str) {
        self.state
            .lock()
            .faults
            .entry(operation.to_string())
            .or_default()
            .push_back(None);
    }

    pub fn fail_next_http(&self, status: u16) {
        self.fs.lock().http_failures.push_back(status);
    }

    pub fn count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn set_vm_missing(&self) {
        self.state.lock().vm_missing = true;
    }

    pub fn set_power_state(&self, power_state: &str) {
        self.state.lock().power_state = power_state.to_string();
    }

    pub fn set_list_omits_pid(&self) {
        self.state.lock().list_omits_pid = true;
    }

    pub fn set_program(&self, stdout: &[u8], stderr: &[u8], exit_code: i32) {
        let mut state = self.state.lock();
        state.program.stdout = stdout.to_vec();
        state.program.stderr = stderr.to_vec();
        state.program.exit_code = exit_code;
    }

    /// Number of polls reporting the process as running before it ends.
    /// `usize::MAX` keeps it running forever.
    pub fn set_polls_before_exit(&self, polls: usize) {
        self.state.lock().program.polls_before_exit = polls;
    }

    pub fn started_programs(&self) -> Vec<ProgramSpec> {
        self.state.lock().started.clone()
    }

    pub fn guest_file(&self, path: &str) -> Option<Vec<u8>> {
        self.fs.lock().files.get(path).cloned()
    }

    pub fn put_guest_file(&self, path: &str, content: &[u8]) {
        self.fs.lock().files.insert(path.to_string(), content.to_vec());
    }

    pub fn http_requests(&self) -> Vec<(String, String)> {
        self.fs.lock().requests.clone()
    }

    /// Record the call and pop a scripted fault for it, if any.
    fn enter(&self, operation: &str) -> Result<(), Fault> {
        let mut state = self.state.lock();
        state.calls.push(operation.to_string());
        match state.faults.get_mut(operation).and_then(|q| q.pop_front()) {
            Some(Some(fault)) => Err(fault),
            _ => Ok(()),
        }
    }

    fn next_id(&self) -> u64 {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        id
    }

    fn ticket(&self, path: &str, size: Option<u64>, direction: TransferDirection) -> TransferTicket {
        let id = self.next_id();
        self.fs.lock().tickets.insert(id, path.to_string());
        TransferTicket {
            url: format!("http://*:443/guestFile?id={id}&token=abc"),
            size_bytes: size,
            direction,
        }
    }
}

fn managers() -> GuestManagers {
    GuestManagers {
        auth: ManagedObjectRef::new("GuestAuthManager", "guestOperationsAuthManager"),
        file: ManagedObjectRef::new("GuestFileManager", "guestOperationsFileManager"),
        process: ManagedObjectRef::new("GuestProcessManager", "guestOperationsProcessManager"),
    }
}

fn not_found(path: &str) -> Fault {
    Fault::Vendor(VendorFault::new(
        "FileNotFound",
        format!("File {path} was not found"),
    ))
}

#[async_trait]
impl VimApi for MockVimApi {
    async fn retrieve_service_content(&self) -> Result<ServiceContent, Fault> {
        self.enter("RetrieveServiceContent")?;
        Ok(ServiceContent {
            session_manager: ManagedObjectRef::new("SessionManager", "SessionManager"),
            search_index: ManagedObjectRef::new("SearchIndex", "SearchIndex"),
            property_collector: ManagedObjectRef::new("PropertyCollector", "propertyCollector"),
            guest_operations_manager: Some(ManagedObjectRef::new(
                "GuestOperationsManager",
                "guestOperationsManager",
            )),
            api_version: Some("8.0.2.0".to_string()),
        })
    }

    async fn login(&self, _: &ServiceContent, _: &str, _: &str) -> Result<(), Fault> {
        self.enter("Login")
    }

    async fn logout(&self, _: &ServiceContent) -> Result<(), Fault> {
        self.enter("Logout")
    }

    async fn find_by_inventory_path(
        &self,
        _: &ServiceContent,
        _: &str,
    ) -> Result<Option<ManagedObjectRef>, Fault> {
        self.enter("FindByInventoryPath")?;
        Ok(self.found_vm())
    }

    async fn find_by_uuid(
        &self,
        _: &ServiceContent,
        _: &str,
    ) -> Result<Option<ManagedObjectRef>, Fault> {
        self.enter("FindByUuid")?;
        Ok(self.found_vm())
    }

    async fn vm_properties(
        &self,
        _: &ServiceContent,
        _: &ManagedObjectRef,
    ) -> Result<VmProperties, Fault> {
        self.enter("RetrieveVmProperties")?;
        let family = match self.family {
            GuestFamily::Windows => "windowsGuest",
            GuestFamily::Posix => "linuxGuest",
        };
        Ok(VmProperties {
            power_state: self.state.lock().power_state.clone(),
            guest_family: Some(family.to_string()),
        })
    }

    async fn guest_managers(&self, _: &ServiceContent) -> Result<GuestManagers, Fault> {
        self.enter("RetrieveGuestManagers")?;
        Ok(managers())
    }

    async fn validate_credentials(&self, _: &GuestTarget) -> Result<(), Fault> {
        self.enter("ValidateCredentialsInGuest")
    }

    async fn create_temporary_file(
        &self,
        _: &GuestTarget,
        prefix: &str,
        suffix: &str,
    ) -> Result<String, Fault> {
        self.enter("CreateTemporaryFileInGuest")?;
        let id = self.next_id();
        let path = match self.family {
            GuestFamily::Windows => format!("C:\\T\\{prefix}{id}{suffix}"),
            GuestFamily::Posix => format!("/tmp/{prefix}{id}{suffix}"),
        };
        self.fs.lock().files.insert(path.clone(), Vec::new());
        Ok(path)
    }

    async fn delete_file(&self, _: &GuestTarget, path: &str) -> Result<(), Fault> {
        self.enter("DeleteFileInGuest")?;
        match self.fs.lock().files.remove(path) {
            Some(_) => Ok(()),
            None => Err(not_found(path)),
        }
    }

    async fn initiate_transfer_from_guest(
        &self,
        _: &GuestTarget,
        path: &str,
    ) -> Result<TransferTicket, Fault> {
        self.enter("InitiateFileTransferFromGuest")?;
        let size = match self.fs.lock().files.get(path) {
            Some(content) => content.len() as u64,
            None => return Err(not_found(path)),
        };
        Ok(self.ticket(path, Some(size), TransferDirection::Out))
    }

    async fn initiate_transfer_to_guest(
        &self,
        _: &GuestTarget,
        path: &str,
        size: u64,
        overwrite: bool,
    ) -> Result<TransferTicket, Fault> {
        self.enter("InitiateFileTransferToGuest")?;
        if !overwrite && self.fs.lock().files.contains_key(path) {
            return Err(Fault::Vendor(VendorFault::new(
                "FileAlreadyExists",
                format!("File {path} already exists"),
            )));
        }
        Ok(self.ticket(path, Some(size), TransferDirection::In))
    }

    async fn start_program(&self, _: &GuestTarget, spec: &ProgramSpec) -> Result<i64, Fault> {
        self.enter("StartProgramInGuest")?;
        let (stdout, stderr) = {
            let mut state = self.state.lock();
            state.started.push(spec.clone());
            state.polls = 0;
            (state.program.stdout.clone(), state.program.stderr.clone())
        };

        // The guest interpreter performs the redirection.
        let redirect = spec
            .arguments
            .rsplit_once(" 1> ")
            .and_then(|(_, r)| r.split_once(" 2> "));
        if let Some((out_path, err_path)) = redirect {
            let mut fs = self.fs.lock();
            fs.files.insert(out_path.to_string(), stdout);
            fs.files.insert(err_path.to_string(), stderr);
        }
        Ok(4000 + self.next_id() as i64)
    }

    async fn list_processes(
        &self,
        _: &GuestTarget,
        pids: &[i64],
    ) -> Result<Vec<GuestProcess>, Fault> {
        self.enter("ListProcessesInGuest")?;
        let mut state = self.state.lock();
        if state.list_omits_pid {
            return Ok(Vec::new());
        }
        state.polls += 1;
        let ended = state.polls > state.program.polls_before_exit;
        let exit_code = state.program.exit_code;
        Ok(pids
            .iter()
            .map(|&pid| GuestProcess {
                pid,
                end_time_known: ended,
                exit_code: ended.then_some(exit_code),
            })
            .collect())
    }
}

impl MockVimApi {
    fn found_vm(&self) -> Option<ManagedObjectRef> {
        if self.state.lock().vm_missing {
            None
        } else {
            Some(ManagedObjectRef::new("VirtualMachine", "vm-42"))
        }
    }
}

/// A parsed HTTP/1.1 request.
#[derive(Debug, Clone)]
pub(crate) struct HttpRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Serve one request per connection with `handler` on a loopback port.
pub(crate) async fn spawn_http_server<F>(handler: F) -> SocketAddr
where
    F: Fn(HttpRequest) -> HttpResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let handler = handler.clone();
            tokio::spawn(async move {
                let _ = serve_connection(stream, handler.as_ref()).await;
            });
        }
    });
    addr
}

async fn serve_connection<F>(stream: TcpStream, handler: &F) -> std::io::Result<()>
where
    F: Fn(HttpRequest) -> HttpResponse,
{
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let mut request = HttpRequest {
        method,
        target,
        headers,
        body: Vec::new(),
    };

    if let Some(length) = request.header("content-length") {
        let length: usize = length.parse().unwrap_or(0);
        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).await?;
        request.body = body;
    } else if request
        .header("transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
    {
        request.body = read_chunked(&mut reader).await?;
    }

    let response = handler(request);
    let mut head = format!(
        "HTTP/1.1 {} Status\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        response.body.len()
    );
    for (name, value) in &response.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");

    let mut stream = reader.into_inner();
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&response.body).await?;
    stream.shutdown().await
}

async fn read_chunked(reader: &mut BufReader<TcpStream>) -> std::io::Result<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let mut size_line = String::new();
        reader.read_line(&mut size_line).await?;
        let size_hex = size_line.trim().split(';').next().unwrap_or("0");
        let size = usize::from_str_radix(size_hex, 16).unwrap_or(0);
        if size == 0 {
            // Trailers end with an empty line.
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).await?;
                if line.trim().is_empty() {
                    break;
                }
            }
            return Ok(body);
        }
        let mut chunk = vec![0u8; size];
        reader.read_exact(&mut chunk).await?;
        body.extend_from_slice(&chunk);
        let mut crlf = String::new();
        reader.read_line(&mut crlf).await?;
    }
}

/// Serve `GET`/`PUT /guestFile?id=N` against the mock's guest files.
pub(crate) async fn spawn_file_server(fs: Arc<Mutex<GuestFs>>) -> SocketAddr {
    spawn_http_server(move |request| {
        let mut fs = fs.lock();
        fs.requests.push((request.method.clone(), request.target.clone()));
        if let Some(status) = fs.http_failures.pop_front() {
            return HttpResponse::new(status, "scripted failure");
        }

        let path = ticket_id(&request.target).and_then(|id| fs.tickets.get(&id).cloned());
        let Some(path) = path else {
            return HttpResponse::new(404, "unknown ticket");
        };

        match request.method.as_str() {
            "GET" => match fs.files.get(&path) {
                Some(content) => HttpResponse::new(200, content.clone()),
                None => HttpResponse::new(404, "no such file"),
            },
            "PUT" => {
                fs.files.insert(path, request.body);
                HttpResponse::new(200, Vec::new())
            }
            _ => HttpResponse::new(405, "method not allowed"),
        }
    })
    .await
}

fn ticket_id(target: &str) -> Option<u64> {
    let (_, query) = target.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("id="))
        .and_then(|id| id.parse().ok())
}
