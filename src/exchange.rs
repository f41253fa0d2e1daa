//! The write side of one HTTP exchange.
//!
//! # Commit model
//!
//! Status and headers are buffered until the exchange is *committed*: on the
//! first body write, an explicit [`flush`](Exchange::flush) or
//! [`send_head`](Exchange::send_head), or when the dispatcher finishes the
//! request. `send_head` commits a bodiless response; the others open a
//! streaming body. Committing hands the response head to the
//! server through a oneshot channel; body bytes follow through a bounded
//! mpsc channel that backs [`ResponseBody`].
//!
//! ```text
//! Response::send ──write_status/write_header──▶ buffered head
//!                ──write_body──▶ commit ──oneshot──▶ server returns head to hyper
//!                              └──mpsc──▶ ResponseBody::poll_frame ──▶ client
//! ```
//!
//! Once committed, the status and headers are on the wire. Later
//! `write_status` / `write_header` calls are ignored with a warning, which is
//! what keeps a recovery path from attempting a second response.
//!
//! If the client goes away, the body receiver is dropped and `write_body`
//! returns [`BrokenPipe`](std::io::ErrorKind::BrokenPipe).

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::mem;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use hyper::body::{Body, Frame, SizeHint};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::context::Context;
use crate::error::Error;
use crate::request::Request;

/// Body chunks buffered between the handler task and the connection.
const BODY_CHANNEL_CAPACITY: usize = 16;

enum Sink {
    Pending(oneshot::Sender<http::Response<ResponseBody>>),
    Open(mpsc::Sender<Bytes>),
    Closed,
}

/// One in-flight request/response pair.
///
/// Owned by the dispatcher for the lifetime of the request and lent to
/// [`Response::send`](crate::Response) and the
/// [`ErrorHandler`](crate::ErrorHandler). Dropping an exchange without
/// finishing it aborts the response.
pub struct Exchange {
    context: Context,
    status: StatusCode,
    headers: HeaderMap,
    sink: Sink,
}

impl Exchange {
    /// Creates an exchange for `context` and the handle through which the
    /// response head will arrive.
    pub fn new(context: Context) -> (Self, PendingResponse) {
        let (tx, rx) = oneshot::channel();
        let exchange = Self {
            context,
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            sink: Sink::Pending(tx),
        };
        (exchange, PendingResponse(rx))
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn request(&self) -> &Request {
        self.context.request()
    }

    /// `true` once the response head has been handed to the server.
    pub fn is_committed(&self) -> bool {
        !matches!(self.sink, Sink::Pending(_))
    }

    pub fn write_status(&mut self, status: StatusCode) {
        if self.is_committed() {
            warn!(%status, "response already committed, status ignored");
            return;
        }
        self.status = status;
    }

    /// Sets a header, replacing any previous value of the same name.
    pub fn write_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.is_committed() {
            warn!(header = %name, "response already committed, header ignored");
            return;
        }
        self.headers.insert(name, value);
    }

    /// Commits the head if needed and sends one body chunk.
    pub async fn write_body(&mut self, chunk: impl Into<Bytes>) -> io::Result<()> {
        let chunk = chunk.into();
        self.commit(true);
        match &self.sink {
            Sink::Open(tx) => tx.send(chunk).await.map_err(|_| disconnected()),
            _ => Err(disconnected()),
        }
    }

    /// Commits the head now. Body writes may follow.
    pub fn flush(&mut self) {
        self.commit(true);
    }

    /// Commits the head with an empty body. Later body writes fail.
    pub fn send_head(&mut self) {
        self.commit(false);
    }

    /// Completes the response. An uncommitted exchange is sent with an
    /// empty body.
    pub(crate) fn finish(mut self) {
        self.commit(false);
        // dropping the body sender ends the stream
    }

    fn commit(&mut self, streaming: bool) {
        if self.is_committed() {
            return;
        }
        let Sink::Pending(tx) = mem::replace(&mut self.sink, Sink::Closed) else {
            return;
        };

        let (body, sender) = if streaming {
            let (btx, brx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
            (ResponseBody { rx: Some(brx) }, Some(btx))
        } else {
            (ResponseBody::empty(), None)
        };

        let mut head = http::Response::new(body);
        *head.status_mut() = self.status;
        *head.headers_mut() = mem::take(&mut self.headers);

        if tx.send(head).is_ok() {
            if let Some(btx) = sender {
                self.sink = Sink::Open(btx);
            }
        }
    }
}

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected")
}

// ── PendingResponse ───────────────────────────────────────────────────────────

/// Resolves to the response head once the exchange commits.
///
/// Fails with [`Error::Aborted`] if the exchange is dropped first, which
/// happens only when the recovery path itself fails.
pub struct PendingResponse(oneshot::Receiver<http::Response<ResponseBody>>);

impl Future for PendingResponse {
    type Output = Result<http::Response<ResponseBody>, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx).map(|r| r.map_err(|_| Error::Aborted))
    }
}

// ── ResponseBody ──────────────────────────────────────────────────────────────

/// Streaming response body fed by an [`Exchange`].
pub struct ResponseBody {
    rx: Option<mpsc::Receiver<Bytes>>,
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self { rx: None }
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        match self.rx.as_mut() {
            Some(rx) => rx.poll_recv(cx).map(|chunk| chunk.map(|b| Ok(Frame::data(b)))),
            None => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.rx.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        match self.rx {
            Some(_) => SizeHint::default(),
            None => SizeHint::with_exact(0),
        }
    }
}
