//! Conditional, range-aware static file serving.
//!
//! [`StaticFileHandler`] maps request paths onto a document root and
//! streams file contents through the response writer in fixed-size
//! chunks, pausing on every flush until the transport accepts it. It
//! answers `If-None-Match` revalidation with `304` and single byte
//! ranges with `206`; multi-range responses are not produced.

use std::fmt::Write as _;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use std::{fmt, io};

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, Method, StatusCode};
use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

use sluice_http::handler::Handler;
use sluice_http::protocol::RequestInfo;
use sluice_http::response::ResponseWriter;

use crate::range::parse_range;

/// Upper bound on a single body flush while streaming file contents.
pub const CHUNK_SIZE: usize = 204_800;

/// Serves files from a document root.
pub struct StaticFileHandler {
    document_root: PathBuf,
}

impl StaticFileHandler {
    pub fn new(document_root: impl Into<PathBuf>) -> Self {
        Self { document_root: document_root.into() }
    }

    pub fn document_root(&self) -> &Path {
        &self.document_root
    }

    async fn try_serve(
        &self,
        request: &RequestInfo,
        response: &ResponseWriter,
    ) -> Result<(), ServeError> {
        let raw_path = request.path();
        let components = sanitize_path(raw_path).ok_or_else(|| ServeError::not_found(raw_path))?;
        let mut resolved = self.document_root.clone();
        resolved.extend(&components);

        let metadata =
            tokio::fs::metadata(&resolved).await.map_err(|_| ServeError::not_found(raw_path))?;
        if metadata.is_dir() {
            return Err(ServeError::not_found(raw_path));
        }
        let size = metadata.len();
        let head_only = request.method() == Method::HEAD;

        response.set_header(header::ACCEPT_RANGES, "bytes");

        if let Some(range) = request.headers().get(header::RANGE) {
            let value = range.to_str().map_err(|_| ServeError::malformed_range(""))?.to_owned();
            return self.serve_range(raw_path, &resolved, size, &value, head_only, response).await;
        }

        let etag = resource_etag(&resolved, modification_secs(&metadata));
        if let Some(candidate) = request.headers().get(header::IF_NONE_MATCH) {
            if candidate.to_str().is_ok_and(|tag| tag == etag) {
                response.set_status(StatusCode::NOT_MODIFIED);
                response.complete().await;
                return Ok(());
            }
        }

        response.set_status(StatusCode::OK);
        response.set_header(header::CONTENT_TYPE, content_type(&resolved));
        response.set_header(header::CONTENT_LENGTH, size.to_string());
        response.set_header(header::ETAG, etag);

        if head_only {
            response.complete().await;
            return Ok(());
        }

        let file =
            File::open(&resolved).await.map_err(|source| ServeError::io(raw_path, source))?;
        self.stream(raw_path, file, size, response).await;
        Ok(())
    }

    async fn serve_range(
        &self,
        raw_path: &str,
        resolved: &Path,
        size: u64,
        value: &str,
        head_only: bool,
        response: &ResponseWriter,
    ) -> Result<(), ServeError> {
        let ranges = parse_range(value, size);
        let range = match ranges.len() {
            0 => return Err(ServeError::malformed_range(value)),
            1 => ranges[0],
            count => return Err(ServeError::unsupported_multi_range(count)),
        };

        response.set_status(StatusCode::PARTIAL_CONTENT);
        response.set_header(header::CONTENT_TYPE, content_type(resolved));
        response.set_header(header::CONTENT_LENGTH, range.len().to_string());
        response.set_header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{size}", range.lower(), range.upper().saturating_sub(1)),
        );

        if head_only {
            response.complete().await;
            return Ok(());
        }

        let mut file =
            File::open(resolved).await.map_err(|source| ServeError::io(raw_path, source))?;
        file.seek(SeekFrom::Start(range.lower()))
            .await
            .map_err(|source| ServeError::io(raw_path, source))?;
        self.stream(raw_path, file, range.len(), response).await;
        Ok(())
    }

    /// Streams `length` bytes and finishes the response. The head is on
    /// the wire once the first chunk flushes, so mid-stream errors can
    /// only tear the response down.
    async fn stream<R>(&self, raw_path: &str, reader: R, length: u64, response: &ResponseWriter)
    where
        R: AsyncRead + Unpin,
    {
        match stream_chunks(reader, length, CHUNK_SIZE, response).await {
            Ok(StreamEnd::Completed) => response.complete().await,
            Ok(StreamEnd::Aborted) => {
                debug!(path = raw_path, "transport aborted mid-stream");
                response.close();
            }
            Err(error) => {
                warn!(path = raw_path, %error, "read failed mid-stream");
                response.close();
            }
        }
    }
}

#[async_trait]
impl Handler for StaticFileHandler {
    async fn handle(&self, request: Arc<RequestInfo>, response: ResponseWriter) {
        if let Err(error) = self.try_serve(&request, &response).await {
            debug!(path = request.path(), %error, "static file request failed");
            respond_error(&response, &error).await;
        }
    }
}

impl fmt::Debug for StaticFileHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticFileHandler").field("document_root", &self.document_root).finish()
    }
}

/// Why a request could not be served. [`status`](Self::status) maps each
/// variant onto the response status; the display text becomes the error
/// body.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("The file {path} was not found.")]
    NotFound { path: String },
    #[error("The file {path} could not be read: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("The Range header could not be parsed: {value}")]
    MalformedRange { value: String },
    #[error("Multi-range requests are not supported ({count} ranges).")]
    UnsupportedMultiRange { count: usize },
}

impl ServeError {
    fn not_found(path: &str) -> Self {
        Self::NotFound { path: path.to_owned() }
    }

    fn io(path: &str, source: io::Error) -> Self {
        Self::Io { path: path.to_owned(), source }
    }

    fn malformed_range(value: &str) -> Self {
        Self::MalformedRange { value: value.to_owned() }
    }

    fn unsupported_multi_range(count: usize) -> Self {
        Self::UnsupportedMultiRange { count }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            // missing files, escapes of the document root and read
            // failures are all reported as plain 404s
            Self::NotFound { .. } | Self::Io { .. } => StatusCode::NOT_FOUND,
            Self::MalformedRange { .. } => StatusCode::BAD_REQUEST,
            Self::UnsupportedMultiRange { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

async fn respond_error(response: &ResponseWriter, error: &ServeError) {
    response.set_status(error.status());
    response.set_header(header::CONTENT_TYPE, mime::TEXT_PLAIN.as_ref());
    response.append_body(error.to_string());
    response.complete().await;
}

/// Resolves a request path to components under a document root.
///
/// `.` and empty segments are dropped; `..` pops the previous retained
/// component and rejects the whole path (`None`) when there is nothing
/// left to pop. A trailing slash asks for the directory index, so
/// `index.html` is appended.
fn sanitize_path(path: &str) -> Option<Vec<String>> {
    let mut components: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                components.pop()?;
            }
            segment => components.push(segment),
        }
    }
    let mut components: Vec<String> = components.into_iter().map(str::to_owned).collect();
    if path.ends_with('/') {
        components.push("index.html".to_owned());
    }
    Some(components)
}

/// A weak validator for a file on disk: lowercase hex SHA-1 over the
/// resolved path and the modification time in whole seconds. Stable for
/// an unchanged file, different after any rewrite that touches mtime.
fn resource_etag(path: &Path, modified_secs: u64) -> String {
    let mut hasher = Sha1::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update(modified_secs.to_string().as_bytes());
    let digest = hasher.finalize();
    let mut tag = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(tag, "{byte:02x}");
    }
    tag
}

fn modification_secs(metadata: &std::fs::Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |elapsed| elapsed.as_secs())
}

fn content_type(path: &Path) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}

#[derive(Debug)]
pub(crate) enum StreamEnd {
    Completed,
    Aborted,
}

/// Reads `length` bytes in chunks of at most `chunk_size`, flushing each
/// through the writer and waiting for the transport to accept it before
/// reading the next. Stops at the first refused flush.
pub(crate) async fn stream_chunks<R>(
    mut reader: R,
    length: u64,
    chunk_size: usize,
    response: &ResponseWriter,
) -> io::Result<StreamEnd>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; chunk_size];
    let mut remaining = length;
    while remaining > 0 {
        let want = usize::try_from(remaining.min(chunk_size as u64)).unwrap_or(chunk_size);
        let mut filled = 0;
        while filled < want {
            let n = reader.read(&mut buffer[filled..want]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file ended before the announced length",
            ));
        }
        response.append_body(Bytes::copy_from_slice(&buffer[..filled]));
        if !response.push().await {
            return Ok(StreamEnd::Aborted);
        }
        remaining -= filled as u64;
    }
    Ok(StreamEnd::Completed)
}
