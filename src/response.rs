//! Outgoing response variants and the [`IntoResponse`] conversion trait.
//!
//! A [`Response`] is a value. Handlers build one and return it; the
//! dispatcher sends it. Nothing else in an application writes to the client.

use std::fmt;
use std::io;

use http::{HeaderValue, StatusCode, header};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::exchange::Exchange;
use crate::problem::{Envelope, ErrorDetail};

/// Read buffer for streamed file bodies.
const COPY_CHUNK: usize = 8 * 1024;

/// A readable byte source for file responses.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin + 'static>;

// ── Response ─────────────────────────────────────────────────────────────────

/// The one result written to the client for a request.
///
/// ```rust
/// use baton::{ErrorDetail, Response};
/// use http::StatusCode;
///
/// Response::json(StatusCode::CREATED, &serde_json::json!({ "id": 42 }));
/// Response::json_ok(&vec!["a", "b"]);
/// Response::empty(StatusCode::NO_CONTENT);
/// Response::error(StatusCode::BAD_REQUEST, vec![ErrorDetail::invalid_params("age", "range")]);
/// ```
pub struct Response {
    repr: Repr,
}

enum Repr {
    Json { status: StatusCode, body: serde_json::Result<Vec<u8>> },
    Empty { status: StatusCode },
    File(FileSource),
    Error { status: StatusCode, errors: Vec<ErrorDetail> },
}

enum FileSource {
    File(tokio::fs::File),
    Stream { reader: ByteStream, len: u64 },
}

impl Response {
    /// JSON-encodes `data` with the given status.
    ///
    /// Serialisation happens here; a failure surfaces when the response is
    /// sent and goes to the application's error handler.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, data: &T) -> Self {
        Self { repr: Repr::Json { status, body: serde_json::to_vec(data) } }
    }

    /// `200 OK` with a JSON body.
    pub fn json_ok<T: Serialize + ?Sized>(data: &T) -> Self {
        Self::json(StatusCode::OK, data)
    }

    /// Status line and headers only.
    pub fn empty(status: StatusCode) -> Self {
        Self { repr: Repr::Empty { status } }
    }

    /// `200 OK` streaming the contents of `file`. The file is closed when the
    /// response has been sent, whether or not sending succeeded.
    pub fn file(file: tokio::fs::File) -> Self {
        Self { repr: Repr::File(FileSource::File(file)) }
    }

    /// `200 OK` streaming `len` bytes from `reader`. Same ownership rules as
    /// [`Response::file`].
    pub fn stream(reader: impl AsyncRead + Send + Unpin + 'static, len: u64) -> Self {
        Self { repr: Repr::File(FileSource::Stream { reader: Box::new(reader), len }) }
    }

    /// `{"errors": [...]}` with the given status.
    pub fn error(status: StatusCode, errors: Vec<ErrorDetail>) -> Self {
        Self { repr: Repr::Error { status, errors } }
    }

    /// The status this response will be sent with.
    pub fn status(&self) -> StatusCode {
        match &self.repr {
            Repr::Json { status, .. } | Repr::Empty { status } | Repr::Error { status, .. } => *status,
            Repr::File(_) => StatusCode::OK,
        }
    }

    /// Writes the response to `exchange`, consuming it.
    ///
    /// File bodies: once the head is committed, copy errors are logged and
    /// dropped, since they almost always mean the client hung up.
    pub async fn send(self, exchange: &mut Exchange) -> io::Result<()> {
        match self.repr {
            Repr::Json { status, body } => send_json(exchange, status, body?).await,
            Repr::Empty { status } => {
                exchange.write_status(status);
                exchange.send_head();
                Ok(())
            }
            Repr::File(source) => send_file(exchange, source).await,
            Repr::Error { status, errors } => {
                let body = serde_json::to_vec(&Envelope { errors: &errors })?;
                send_json(exchange, status, body).await
            }
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.repr {
            Repr::Json { .. } => "Json",
            Repr::Empty { .. } => "Empty",
            Repr::File(_) => "File",
            Repr::Error { .. } => "Error",
        };
        f.debug_struct("Response")
            .field("kind", &kind)
            .field("status", &self.status())
            .finish()
    }
}

async fn send_json(exchange: &mut Exchange, status: StatusCode, body: Vec<u8>) -> io::Result<()> {
    exchange.write_status(status);
    exchange.write_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
    exchange.write_header(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    exchange.write_body(body).await
}

async fn send_file(exchange: &mut Exchange, source: FileSource) -> io::Result<()> {
    // `source` is owned by this frame and dropped on every return path,
    // which closes the underlying handle.
    let (mut reader, len): (ByteStream, u64) = match source {
        FileSource::File(file) => {
            let len = file.metadata().await?.len();
            (Box::new(file), len)
        }
        FileSource::Stream { reader, len } => (reader, len),
    };

    exchange.write_status(StatusCode::OK);
    exchange.write_header(header::CONTENT_LENGTH, HeaderValue::from(len));
    exchange.flush();

    let mut buf = vec![0u8; COPY_CHUNK];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "file read failed mid-response, truncating");
                break;
            }
        };
        if let Err(e) = exchange.write_body(buf[..n].to_vec()).await {
            debug!(error = %e, "file write failed, client likely disconnected");
            break;
        }
    }
    Ok(())
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into a [`Response`].
///
/// Implement on your own types to return them from handlers via
/// `.into_response()`.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

/// Bare status, no body.
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::empty(self) }
}

/// A single error sent with its own status.
impl IntoResponse for ErrorDetail {
    fn into_response(self) -> Response {
        Response::error(self.status_code(), vec![self])
    }
}

/// Several errors, sent with the status of the first (`400` if empty).
impl IntoResponse for Vec<ErrorDetail> {
    fn into_response(self) -> Response {
        let status = self.first().map_or(StatusCode::BAD_REQUEST, ErrorDetail::status_code);
        Response::error(status, self)
    }
}
