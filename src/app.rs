//! The application: registers endpoints and owns the error handler.

use std::sync::Arc;

use tracing::info;

use crate::dispatch::{DefaultErrorHandler, Dispatcher, ErrorHandler};
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::router::Router;

/// A set of registered endpoints and the error handler they share.
///
/// Build it once at startup, then pass it to
/// [`Server::serve`](crate::Server::serve). The error handler is fixed at
/// construction; every endpoint registered afterwards reports to it.
///
/// ```rust
/// use baton::{App, Context, Endpoint, JsonErrorHandler, Response};
///
/// async fn index(_: Context) -> Response {
///     Response::json_ok(&"hello")
/// }
///
/// let app = App::with_error_handler(JsonErrorHandler)
///     .endpoint(Endpoint::get("/", index));
/// ```
pub struct App {
    router: Router,
    on_error: Arc<dyn ErrorHandler>,
}

impl App {
    /// An application using [`DefaultErrorHandler`]: log, then bare `500`.
    pub fn new() -> Self {
        Self::with_error_handler(DefaultErrorHandler)
    }

    pub fn with_error_handler(handler: impl ErrorHandler) -> Self {
        Self { router: Router::new(), on_error: Arc::new(handler) }
    }

    /// Compiles `endpoint` and binds it to its method and path.
    ///
    /// Fails if the endpoint has no handlers, its path template is invalid,
    /// or another endpoint already holds the same method and path.
    pub fn register(&mut self, endpoint: Endpoint) -> Result<(), Error> {
        info!(method = %endpoint.method(), path = endpoint.path(), "registering endpoint");

        let dispatcher = Dispatcher::compile(endpoint.handlers(), Arc::clone(&self.on_error))?;
        self.router.insert(endpoint.method().clone(), endpoint.path(), dispatcher)
    }

    /// Chaining form of [`register`](App::register).
    ///
    /// # Panics
    ///
    /// Panics on any registration error. Routes are set up before traffic
    /// starts, so a bad route should stop the process.
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        let name = endpoint.to_string();
        self.register(endpoint)
            .unwrap_or_else(|e| panic!("cannot register `{name}`: {e}"));
        self
    }

    pub(crate) fn router(&self) -> &Router {
        &self.router
    }
}

impl Default for App {
    fn default() -> Self { Self::new() }
}
