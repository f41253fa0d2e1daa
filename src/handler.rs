//! Handler trait, type erasure, and handler chains.
//!
//! # How handlers are stored
//!
//! A chain holds handlers of *different* concrete types: user `async fn`s,
//! closures, and the binder middleware baton prepends. They are stored as
//! trait objects (`dyn ErasedHandler`) behind an `Arc`:
//!
//! ```text
//! async fn show(ctx: Context) -> Response { … }   ← user writes this
//!        ↓ Endpoint::get("/", show)
//! show.into_boxed_handler()                        ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(show))                        ← BoxedHandler
//!        ↓
//! handler.call(ctx)  at request time               ← one vtable dispatch
//!        ↓
//! Box::pin(async { show(ctx).await.into_outcome() })
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{Error, Failure};
use crate::response::Response;

// ── Outcome ───────────────────────────────────────────────────────────────────

/// What one handler decided: `Ok(Some(_))` answers the request, `Ok(None)`
/// passes it to the next handler, `Err(_)` goes to the error handler.
pub type Outcome = Result<Option<Response>, Failure>;

/// Conversion of a handler's return value into an [`Outcome`].
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl IntoOutcome for Response {
    fn into_outcome(self) -> Outcome { Ok(Some(self)) }
}

/// `None` continues the chain.
impl IntoOutcome for Option<Response> {
    fn into_outcome(self) -> Outcome { Ok(self) }
}

impl IntoOutcome for Result<Response, Failure> {
    fn into_outcome(self) -> Outcome { self.map(Some) }
}

impl IntoOutcome for Result<Option<Response>, Failure> {
    fn into_outcome(self) -> Outcome { self }
}

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future resolving to an [`Outcome`].
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Outcome> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` because it appears in the public `Handler` trait.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: Context) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid handler.
///
/// Satisfied automatically by any function or closure shaped like
///
/// ```text
/// async fn name(ctx: Context) -> impl IntoOutcome
/// ```
///
/// Sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Bridges a concrete handler `F` to [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture {
        let fut = (self.0)(ctx);
        Box::pin(async move { fut.await.into_outcome() })
    }
}

// ── Chain ─────────────────────────────────────────────────────────────────────

/// An ordered sequence of handlers.
///
/// Insertion order is execution order. At request time handlers run one by
/// one until one of them produces a [`Response`]; the rest are skipped.
#[derive(Clone, Default)]
pub struct Chain {
    handlers: Vec<BoxedHandler>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler. Returns `self` for chaining.
    pub fn then(mut self, handler: impl Handler) -> Self {
        self.handlers.push(handler.into_boxed_handler());
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Fails with [`Error::EmptyChain`] if there is nothing to run.
    pub(crate) fn ensure_non_empty(&self) -> Result<(), Error> {
        if self.is_empty() { Err(Error::EmptyChain) } else { Ok(()) }
    }

    /// Returns `middleware` followed by this chain's handlers.
    pub(crate) fn prefixed(&self, middleware: impl IntoIterator<Item = BoxedHandler>) -> Chain {
        let mut handlers: Vec<BoxedHandler> = middleware.into_iter().collect();
        handlers.extend(self.handlers.iter().cloned());
        Chain { handlers }
    }

    pub(crate) fn into_shared(self) -> Arc<[BoxedHandler]> {
        self.handlers.into()
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain").field("len", &self.handlers.len()).finish()
    }
}
