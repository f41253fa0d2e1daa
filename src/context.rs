//! Per-request context handed to every handler in a chain.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::request::Request;

/// The reserved parameter slots a binder can fill.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Slot {
    Query,
    Body,
}

impl Slot {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Body => "body",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Bound = OnceLock<Box<dyn Any + Send + Sync>>;

/// Request data plus the parameters bound for it.
///
/// Cloning is one `Arc` increment; every handler in the chain receives a
/// handle to the same context. Parameter slots are written once, by the
/// binder middleware that precedes user handlers, and read afterwards.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    request: Request,
    query: Bound,
    body: Bound,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self {
            inner: Arc::new(Inner {
                request,
                query: OnceLock::new(),
                body: OnceLock::new(),
            }),
        }
    }

    pub fn request(&self) -> &Request {
        &self.inner.request
    }

    /// Shorthand for `request().param(key)`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.inner.request.param(key)
    }

    /// The bound query parameters. `None` if the endpoint does not bind
    /// query parameters or `T` is not the endpoint's query type.
    pub fn query_params<T: Any>(&self) -> Option<&T> {
        self.bound(Slot::Query)
    }

    /// The bound body parameters. `None` if the endpoint does not bind a
    /// body or `T` is not the endpoint's body type.
    pub fn body_params<T: Any>(&self) -> Option<&T> {
        self.bound(Slot::Body)
    }

    fn bound<T: Any>(&self, slot: Slot) -> Option<&T> {
        self.slot(slot).get()?.downcast_ref()
    }

    /// Stores a bound instance. Returns `false` if the slot was already set.
    pub(crate) fn store<T: Any + Send + Sync>(&self, slot: Slot, value: T) -> bool {
        self.slot(slot).set(Box::new(value)).is_ok()
    }

    fn slot(&self, slot: Slot) -> &Bound {
        match slot {
            Slot::Query => &self.inner.query,
            Slot::Body => &self.inner.body,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", self.inner.request.method())
            .field("path", &self.inner.request.path())
            .field("query_bound", &self.inner.query.get().is_some())
            .field("body_bound", &self.inner.body.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn ctx() -> Context {
        Context::new(http::Request::builder().uri("/").body(Bytes::new()).unwrap().into())
    }

    #[test]
    fn slots_start_empty() {
        let c = ctx();
        assert!(c.query_params::<u32>().is_none());
        assert!(c.body_params::<u32>().is_none());
    }

    #[test]
    fn slots_are_write_once_and_typed() {
        let c = ctx();
        assert!(c.store(Slot::Body, 7_u32));
        assert!(!c.store(Slot::Body, 8_u32));

        assert_eq!(c.body_params::<u32>(), Some(&7));
        assert_eq!(c.body_params::<String>(), None);
        assert!(c.query_params::<u32>().is_none());
    }

    #[test]
    fn clones_share_bound_parameters() {
        let c = ctx();
        let seen_later = c.clone();
        c.store(Slot::Query, String::from("q"));
        assert_eq!(seen_later.query_params::<String>().map(String::as_str), Some("q"));
    }
}
