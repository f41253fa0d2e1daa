//! Declarative endpoint descriptions.

use std::fmt;

use http::Method;

use crate::context::Slot;
use crate::error::Error;
use crate::handler::{BoxedHandler, Chain, Handler};
use crate::middleware::bind::{Binder, Params};

/// An HTTP endpoint: method, path template, optional parameter types, and
/// the handlers that answer it.
///
/// An endpoint always has at least one handler. The per-method constructors
/// take the first handler as an argument; [`Endpoint::new`] rejects an
/// empty [`Chain`].
///
/// ```rust
/// use baton::{Context, Endpoint, Params, Response};
/// use serde::Deserialize;
/// use validator::Validate;
///
/// #[derive(Deserialize, Validate)]
/// struct NewUser {
///     #[validate(length(min = 1))]
///     name: String,
/// }
/// impl Params for NewUser {}
///
/// async fn create(ctx: Context) -> Response {
///     let user = ctx.body_params::<NewUser>().expect("bound by the endpoint");
///     Response::json_ok(&serde_json::json!({ "name": user.name }))
/// }
///
/// let endpoint = Endpoint::post("/users", create).body::<NewUser>();
/// ```
pub struct Endpoint {
    method: Method,
    path: String,
    query: Option<BoxedHandler>,
    body: Option<BoxedHandler>,
    chain: Chain,
}

impl Endpoint {
    /// Fails with [`Error::EmptyChain`] if `chain` is empty.
    pub fn new(method: Method, path: impl Into<String>, chain: Chain) -> Result<Self, Error> {
        chain.ensure_non_empty()?;
        Ok(Self {
            method,
            path: path.into(),
            query: None,
            body: None,
            chain,
        })
    }

    fn with_first(method: Method, path: &str, first: impl Handler) -> Self {
        Self {
            method,
            path: path.to_owned(),
            query: None,
            body: None,
            chain: Chain::new().then(first),
        }
    }

    pub fn get(path: &str, handler: impl Handler) -> Self {
        Self::with_first(Method::GET, path, handler)
    }

    pub fn post(path: &str, handler: impl Handler) -> Self {
        Self::with_first(Method::POST, path, handler)
    }

    pub fn put(path: &str, handler: impl Handler) -> Self {
        Self::with_first(Method::PUT, path, handler)
    }

    pub fn patch(path: &str, handler: impl Handler) -> Self {
        Self::with_first(Method::PATCH, path, handler)
    }

    pub fn delete(path: &str, handler: impl Handler) -> Self {
        Self::with_first(Method::DELETE, path, handler)
    }

    /// Appends a handler after the existing ones.
    pub fn then(mut self, handler: impl Handler) -> Self {
        self.chain = self.chain.then(handler);
        self
    }

    /// Binds and validates query parameters as `T` before any handler runs.
    pub fn query<T: Params>(mut self) -> Self {
        self.query = Some(Binder::<T>::new(Slot::Query).boxed());
        self
    }

    /// Binds and validates the request body as `T` before any handler runs.
    pub fn body<T: Params>(mut self) -> Self {
        self.body = Some(Binder::<T>::new(Slot::Body).boxed());
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }

    /// The full chain to execute: query binder, body binder, then the
    /// endpoint's own handlers.
    pub fn handlers(&self) -> Chain {
        self.chain.prefixed(self.query.iter().chain(self.body.iter()).cloned())
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("binds_query", &self.query.is_some())
            .field("binds_body", &self.body.is_some())
            .field("handlers", &self.chain.len())
            .finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}
