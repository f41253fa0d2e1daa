//! Radix-tree route table.
//!
//! One tree per HTTP method. O(path-length) lookup. The table only knows
//! "this (method, path) runs that dispatcher"; endpoints, binding, and
//! recovery live elsewhere.

use std::collections::HashMap;

use http::Method;
use matchit::Router as MatchitRouter;

use crate::dispatch::Dispatcher;
use crate::error::Error;

/// Compiled dispatchers keyed by method and path template.
///
/// Path parameters use `{name}` syntax. A second registration for a path
/// that is already taken under the same method is rejected and leaves the
/// first one in place.
#[derive(Default)]
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Dispatcher>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, method: Method, path: &str, dispatcher: Dispatcher) -> Result<(), Error> {
        self.routes
            .entry(method.clone())
            .or_default()
            .insert(path, dispatcher)
            .map_err(|source| Error::Route { method, path: path.to_owned(), source })
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Option<(Dispatcher, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((matched.value.clone(), params))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::StatusCode;

    use super::*;
    use crate::context::Context;
    use crate::dispatch::DefaultErrorHandler;
    use crate::handler::Chain;
    use crate::response::Response;

    fn dispatcher() -> Dispatcher {
        let chain = Chain::new().then(|_ctx: Context| async { Response::empty(StatusCode::OK) });
        Dispatcher::compile(chain, Arc::new(DefaultErrorHandler)).unwrap()
    }

    #[test]
    fn lookup_extracts_params() {
        let mut r = Router::new();
        r.insert(Method::GET, "/users/{id}", dispatcher()).unwrap();

        let (_, params) = r.lookup(&Method::GET, "/users/42").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));

        assert!(r.lookup(&Method::POST, "/users/42").is_none());
        assert!(r.lookup(&Method::GET, "/users").is_none());
    }

    #[test]
    fn duplicate_route_is_a_conflict() {
        let mut r = Router::new();
        r.insert(Method::GET, "/users", dispatcher()).unwrap();
        r.insert(Method::POST, "/users", dispatcher()).unwrap();

        let err = r.insert(Method::GET, "/users", dispatcher()).unwrap_err();
        assert!(matches!(err, Error::Route { ref path, .. } if path == "/users"));
        assert!(r.lookup(&Method::GET, "/users").is_some());
    }
}
