//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};

/// An incoming HTTP request with its body fully buffered.
///
/// This is the read side of the exchange. Handlers see it through
/// [`Context::request`](crate::Context::request); nothing here writes to the
/// client.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
}

impl Request {
    pub(crate) fn from_parts(
        parts: http::request::Parts,
        body: Bytes,
        params: HashMap<String, String>,
    ) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params,
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Raw query string without the leading `?`; empty when absent.
    pub fn query(&self) -> &str {
        self.uri.query().unwrap_or("")
    }

    /// Header lookup. Names are case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Builds a request with no path parameters, e.g. for driving a
/// [`Dispatcher`](crate::Dispatcher) directly.
impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::from_parts(parts, body, HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_and_headers() {
        let req: Request = http::Request::builder()
            .method("GET")
            .uri("/search?q=rust&page=2")
            .header("X-Trace", "abc")
            .body(Bytes::new())
            .unwrap()
            .into();

        assert_eq!(req.path(), "/search");
        assert_eq!(req.query(), "q=rust&page=2");
        assert_eq!(req.header("x-trace"), Some("abc"));
        assert_eq!(req.param("id"), None);
    }

    #[test]
    fn missing_query_is_empty() {
        let req: Request = http::Request::builder().uri("/").body(Bytes::new()).unwrap().into();
        assert_eq!(req.query(), "");
        assert!(req.body().is_empty());
    }
}
