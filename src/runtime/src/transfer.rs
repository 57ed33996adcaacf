//! File transfer through guest-issued one-shot URLs.
//!
//! The service hands out a ticket URL per file; the body then moves over
//! plain HTTP(S) against that URL after the `*`/`:443` rewrite.

use std::path::Path;

use futures::StreamExt;
use reqwest::header::CONTENT_LENGTH;
use reqwest::StatusCode;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use vsphere_guest_core::{
    classify, CallContext, ErrorKind, Fault, GuestConfig, GuestError, Result, TransferTicket,
};

use crate::http::{build_client, transport_fault};
use crate::tls;
use crate::vim::{GuestTarget, VimApi};

/// Ticket-based uploads and downloads for one endpoint.
pub struct FileTransfer {
    http: reqwest::Client,
    endpoint_host: String,
    endpoint_port: u16,
    chunk_bytes: usize,
    verify_tls: bool,
}

impl FileTransfer {
    pub fn new(config: &GuestConfig) -> Result<Self> {
        let http =
            build_client(config.verify_tls).map_err(|f| classify(&f, CallContext::Transfer))?;
        Ok(Self {
            http,
            endpoint_host: config.endpoint_host.clone(),
            endpoint_port: config.endpoint_port,
            chunk_bytes: config.fetch_chunk_bytes.max(1),
            verify_tls: config.verify_tls,
        })
    }

    /// Download a guest file into memory.
    pub async fn fetch_bytes(
        &self,
        api: &dyn VimApi,
        target: &GuestTarget,
        remote: &str,
    ) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.fetch_into(api, target, remote, &mut buffer).await?;
        Ok(buffer)
    }

    /// Download a guest file to `local`, replacing it.
    ///
    /// The body is staged in a temporary file next to `local` and renamed
    /// over it only after the download completes; a failed fetch leaves
    /// `local` as it was.
    pub async fn fetch_to_path(
        &self,
        api: &dyn VimApi,
        target: &GuestTarget,
        remote: &str,
        local: &Path,
    ) -> Result<()> {
        let dir = match local.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let staging = tempfile::Builder::new()
            .prefix(".vsphere-guest-fetch-")
            .tempfile_in(dir)
            .map_err(|e| {
                GuestError::new(
                    ErrorKind::TransferFailed,
                    format!("Cannot create staging file in {}: {}", dir.display(), e),
                )
            })?;
        let (file, staged_path) = staging.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        self.fetch_into(api, target, remote, &mut file).await?;
        file.flush().await.map_err(|e| local_write_error(local, e))?;
        drop(file);

        staged_path
            .persist(local)
            .map_err(|e| local_write_error(local, e.error))?;
        Ok(())
    }

    /// Download a guest file into `sink`, writing `fetch_chunk_bytes` at a
    /// time.
    pub async fn fetch_into<W>(
        &self,
        api: &dyn VimApi,
        target: &GuestTarget,
        remote: &str,
        sink: &mut W,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let ticket = api
            .initiate_transfer_from_guest(target, remote)
            .await
            .map_err(|f| classify(&f, CallContext::Transfer))?;
        let url = self.resolve(&ticket);
        tracing::debug!(remote, url = %url, "Downloading guest file");

        let response = self.http.get(&url).send().await.map_err(transfer_error)?;
        check_status(response.status(), &url)?;

        let mut writer = ChunkWriter::new(sink, self.chunk_bytes);
        let mut body = response.bytes_stream();
        while let Some(piece) = body.next().await {
            let piece = piece.map_err(transfer_error)?;
            writer.push(&piece).await.map_err(sink_error)?;
        }
        let written = writer.finish().await.map_err(sink_error)?;

        tracing::debug!(remote, bytes = written, "Guest file downloaded");
        Ok(written)
    }

    /// Upload `local` to `remote`, overwriting it.
    ///
    /// The local file is checked before the service is contacted; a missing
    /// or empty file fails with `FileNotFoundLocal`.
    pub async fn put_file(
        &self,
        api: &dyn VimApi,
        target: &GuestTarget,
        local: &Path,
        remote: &str,
    ) -> Result<()> {
        let size = local_file_size(local).await?;

        let ticket = api
            .initiate_transfer_to_guest(target, remote, size, true)
            .await
            .map_err(|f| classify(&f, CallContext::Transfer))?;
        let url = self.resolve(&ticket);
        tracing::debug!(local = %local.display(), remote, size, url = %url, "Uploading file to guest");

        let file = tokio::fs::File::open(local).await.map_err(|e| {
            GuestError::new(
                ErrorKind::FileNotFoundLocal,
                format!("Cannot open {}: {}", local.display(), e),
            )
        })?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));

        let response = self
            .http
            .put(&url)
            .header(CONTENT_LENGTH, size)
            .body(body)
            .send()
            .await
            .map_err(transfer_error)?;
        check_status(response.status(), &url)?;

        tracing::debug!(remote, bytes = size, "File uploaded to guest");
        Ok(())
    }

    fn resolve(&self, ticket: &TransferTicket) -> String {
        if !self.verify_tls {
            tls::warn_insecure_request(&self.endpoint_host);
        }
        ticket.resolved_url(&self.endpoint_host, self.endpoint_port)
    }
}

/// Writes a byte stream to a sink in fixed-size pieces.
struct ChunkWriter<'a, W: ?Sized> {
    sink: &'a mut W,
    chunk: usize,
    pending: Vec<u8>,
    written: u64,
}

impl<'a, W> ChunkWriter<'a, W>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    fn new(sink: &'a mut W, chunk: usize) -> Self {
        Self {
            sink,
            chunk,
            pending: Vec::with_capacity(chunk),
            written: 0,
        }
    }

    async fn push(&mut self, mut data: &[u8]) -> std::io::Result<()> {
        while !data.is_empty() {
            let take = (self.chunk - self.pending.len()).min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.pending.len() == self.chunk {
                self.flush_pending().await?;
            }
        }
        Ok(())
    }

    async fn finish(mut self) -> std::io::Result<u64> {
        if !self.pending.is_empty() {
            self.flush_pending().await?;
        }
        self.sink.flush().await?;
        Ok(self.written)
    }

    async fn flush_pending(&mut self) -> std::io::Result<()> {
        self.sink.write_all(&self.pending).await?;
        self.written += self.pending.len() as u64;
        self.pending.clear();
        Ok(())
    }
}

async fn local_file_size(local: &Path) -> Result<u64> {
    let metadata = tokio::fs::metadata(local).await.map_err(|e| {
        GuestError::new(
            ErrorKind::FileNotFoundLocal,
            format!("Local file {} does not exist: {}", local.display(), e),
        )
    })?;
    if !metadata.is_file() {
        return Err(GuestError::new(
            ErrorKind::FileNotFoundLocal,
            format!("Local path {} is not a regular file", local.display()),
        ));
    }
    if metadata.len() == 0 {
        return Err(GuestError::new(
            ErrorKind::FileNotFoundLocal,
            format!(
                "Local file {} is empty; zero-length uploads are rejected by the guest",
                local.display()
            ),
        ));
    }
    Ok(metadata.len())
}

fn check_status(status: StatusCode, url: &str) -> Result<()> {
    if status == StatusCode::OK {
        return Ok(());
    }
    let fault = Fault::HttpStatus {
        status: status.as_u16(),
        detail: format!("{} from {}", status.canonical_reason().unwrap_or("error"), url),
    };
    Err(classify(&fault, CallContext::Transfer))
}

fn transfer_error(err: reqwest::Error) -> GuestError {
    classify(&transport_fault(&err), CallContext::Transfer)
}

fn sink_error(err: std::io::Error) -> GuestError {
    GuestError::new(
        ErrorKind::TransferFailed,
        format!("Failed to write downloaded data: {}", err),
    )
}

fn local_write_error(local: &Path, err: std::io::Error) -> GuestError {
    GuestError::new(
        ErrorKind::TransferFailed,
        format!("Failed to write {}: {}", local.display(), err),
    )
}
