//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** or Ctrl-C the server:
//! 1. Immediately stops `listener.accept()`; no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`], which lets `main` exit cleanly.

use std::future::{self, Future};
use std::net::SocketAddr;
use std::sync::Arc;

use http::StatusCode;
use http_body_util::BodyExt;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::app::App;
use crate::error::Error;
use crate::exchange::ResponseBody;
use crate::request::Request;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// ```rust,no_run
    /// use baton::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr }
    }

    /// Starts accepting connections and dispatching them through `app`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, app: App) -> Result<(), Error> {
        self.serve_with_shutdown(app, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but drains and returns when `shutdown`
    /// resolves instead of waiting for a process signal.
    pub async fn serve_with_shutdown(
        self,
        app: App,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let app = Arc::new(app);

        info!(addr = %self.addr, "baton listening");

        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // shutdown wins over queued connections
                biased;

                () = &mut shutdown => {
                    info!(in_flight = connections.len(), "shutdown signal received, draining connections");
                    break;
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(serve_connection(Arc::clone(&app), stream, peer));
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                },

                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        while connections.join_next().await.is_some() {}

        info!("baton stopped");
        Ok(())
    }
}

/// Serves every request on one connection, HTTP/1 or HTTP/2.
async fn serve_connection(app: Arc<App>, stream: TcpStream, peer: SocketAddr) {
    let svc = service_fn(move |req| {
        let app = Arc::clone(&app);
        async move { route(&app, req).await }
    });

    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(stream), svc)
        .await
    {
        debug!(%peer, error = %e, "connection closed with error");
    }
}

// ── Request routing ───────────────────────────────────────────────────────────

/// Finds the endpoint for one request and waits for its response head.
///
/// An `Err` here means the endpoint's recovery path failed as well; hyper
/// closes the connection.
async fn route(
    app: &App,
    req: hyper::Request<hyper::body::Incoming>,
) -> Result<http::Response<ResponseBody>, Error> {
    let Some((dispatcher, params)) = app.router().lookup(req.method(), req.uri().path()) else {
        return Ok(bare(StatusCode::NOT_FOUND));
    };

    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!(error = %e, "request body read failed");
            return Ok(bare(StatusCode::BAD_REQUEST));
        }
    };

    dispatcher.respond(Request::from_parts(parts, body, params)).await
}

fn bare(status: StatusCode) -> http::Response<ResponseBody> {
    let mut res = http::Response::new(ResponseBody::empty());
    *res.status_mut() = status;
    res
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or Ctrl-C. Only Ctrl-C exists off Unix.
///
/// A signal source that cannot be installed is logged and skipped; with
/// none left the future never resolves.
async fn shutdown_signal() {
    #[cfg(unix)]
    let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable");
            None
        }
    };

    let terminate = async {
        #[cfg(unix)]
        {
            if let Some(stream) = sigterm.as_mut() {
                stream.recv().await;
                return "SIGTERM";
            }
        }
        future::pending::<&str>().await
    };

    let interrupt = async {
        match signal::ctrl_c().await {
            Ok(()) => "Ctrl-C",
            Err(e) => {
                warn!(error = %e, "Ctrl-C handler unavailable");
                future::pending::<&str>().await
            }
        }
    };

    let received = tokio::select! {
        name = terminate => name,
        name = interrupt => name,
    };
    info!(signal = received, "shutdown requested");
}
