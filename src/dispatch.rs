//! Compiles a handler chain into one per-request callback.
//!
//! # Per-request state machine
//!
//! ```text
//! RUNNING(0) ─▶ RUNNING(1) ─▶ … ─▶ first Some(response) ─▶ send ─▶ SENT
//!      │              │                                       │
//!      └──── panic / Err(failure) / chain exhausted / send error ─┴─▶ FAILED ─▶ ErrorHandler ─▶ SENT
//! ```
//!
//! Everything a request does runs inside one `catch_unwind`, so a panicking
//! handler fails its own request and nothing else. If the error handler
//! itself fails, the exchange is dropped and the server tears the
//! connection down.

use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use http::StatusCode;
use tracing::{error, warn};

use crate::context::Context;
use crate::error::{Error, Failure};
use crate::exchange::{Exchange, ResponseBody};
use crate::handler::{BoxedHandler, Chain};
use crate::problem::ErrorDetail;
use crate::request::Request;
use crate::response::Response;

// ── ErrorHandler ──────────────────────────────────────────────────────────────

/// Last word on a request that failed.
///
/// Receives the exchange (possibly already committed, if the failure happened
/// mid-send) and the failure. Returning `Err` abandons the response.
#[async_trait]
pub trait ErrorHandler: Send + Sync + 'static {
    async fn handle(&self, exchange: &mut Exchange, failure: Failure) -> io::Result<()>;
}

/// Logs the failure and sends a bare `500`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultErrorHandler;

#[async_trait]
impl ErrorHandler for DefaultErrorHandler {
    async fn handle(&self, exchange: &mut Exchange, failure: Failure) -> io::Result<()> {
        log_failure(exchange, &failure);
        Response::empty(StatusCode::INTERNAL_SERVER_ERROR).send(exchange).await
    }
}

/// Logs the failure and sends a `500` with an `INTERNAL` error envelope.
///
/// The envelope's `id` is logged alongside the failure.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonErrorHandler;

#[async_trait]
impl ErrorHandler for JsonErrorHandler {
    async fn handle(&self, exchange: &mut Exchange, failure: Failure) -> io::Result<()> {
        let detail = ErrorDetail::internal();
        let req = exchange.request();
        error!(
            error_id = %detail.id,
            method = %req.method(),
            path = req.path(),
            committed = exchange.is_committed(),
            "error handling request: {failure}"
        );
        Response::error(StatusCode::INTERNAL_SERVER_ERROR, vec![detail]).send(exchange).await
    }
}

fn log_failure(exchange: &Exchange, failure: &Failure) {
    let req = exchange.request();
    error!(
        method = %req.method(),
        path = req.path(),
        committed = exchange.is_committed(),
        "error handling request: {failure}"
    );
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// A compiled handler chain plus the error handler it reports to.
///
/// Cheap to clone; the route table stores one per endpoint.
#[derive(Clone)]
pub struct Dispatcher {
    chain: Arc<[BoxedHandler]>,
    on_error: Arc<dyn ErrorHandler>,
}

impl Dispatcher {
    /// Fails with [`Error::EmptyChain`] if `chain` has no handlers.
    pub fn compile(chain: Chain, on_error: Arc<dyn ErrorHandler>) -> Result<Self, Error> {
        chain.ensure_non_empty()?;
        Ok(Self { chain: chain.into_shared(), on_error })
    }

    /// Runs `request` through the chain on a new task and resolves to the
    /// response head once the exchange commits.
    pub async fn respond(&self, request: Request) -> Result<http::Response<ResponseBody>, Error> {
        let (exchange, pending) = Exchange::new(Context::new(request));
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.run(exchange).await {
                warn!(error = %e, "response abandoned");
            }
        });
        pending.await
    }

    /// Runs the chain against `exchange` and finishes it.
    ///
    /// Returns `Err` only when the error handler failed too; the exchange is
    /// then dropped unfinished.
    pub async fn run(&self, mut exchange: Exchange) -> Result<(), Error> {
        let ctx = exchange.context().clone();

        let failure = match AssertUnwindSafe(self.execute(ctx, &mut exchange)).catch_unwind().await {
            Ok(Ok(())) => {
                exchange.finish();
                return Ok(());
            }
            Ok(Err(failure)) => failure,
            Err(panic) => Failure::from_panic(panic),
        };

        self.on_error.handle(&mut exchange, failure).await?;
        exchange.finish();
        Ok(())
    }

    async fn execute(&self, ctx: Context, exchange: &mut Exchange) -> Result<(), Failure> {
        for handler in self.chain.iter() {
            if let Some(response) = handler.call(ctx.clone()).await? {
                response.send(exchange).await?;
                return Ok(());
            }
        }
        Err(Failure::Unanswered)
    }
}
