//! Crate error types.
//!
//! Two kinds of things go wrong in baton, and they never mix:
//!
//! - [`Error`]: infrastructure and registration failures surfaced to the
//!   code that builds or runs the application.
//! - [`Failure`]: something went wrong *while answering one request*. A
//!   failure never leaves the request it happened in; the dispatcher hands it
//!   to the application's [`ErrorHandler`](crate::ErrorHandler).
//!
//! Bad client input is neither. It is answered with a `400` Error
//! [`Response`](crate::Response) built from [`ErrorDetail`](crate::ErrorDetail)s.

use std::any::Any;

use thiserror::Error;

/// The error type returned by baton's fallible operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Binding a listener or accepting a connection failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// An endpoint or handler chain was built with no handlers.
    #[error("at least one handler is required")]
    EmptyChain,

    /// The route table rejected a path: malformed template or an endpoint
    /// already registered for the same method and path.
    #[error("route `{method} {path}` rejected: {source}")]
    Route {
        method: http::Method,
        path: String,
        #[source]
        source: matchit::InsertError,
    },

    /// The request was dropped before any response head was produced.
    /// The connection is torn down by the server.
    #[error("exchange aborted before a response was sent")]
    Aborted,
}

/// A per-request failure caught by the dispatcher's recovery path.
#[derive(Debug, Error)]
pub enum Failure {
    /// Every handler in the chain returned "continue".
    #[error("handler chain terminated without a response")]
    Unanswered,

    /// Writing the response to the exchange failed.
    #[error("sending response failed: {0}")]
    Send(#[from] std::io::Error),

    /// A parameter source could not be decoded for a reason other than
    /// missing or invalid client data.
    #[error("decoding {slot} parameters failed: {message}")]
    Decode { slot: &'static str, message: String },

    /// A handler gave up with an error of its own.
    #[error("handler failed: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Binder middleware or a handler panicked.
    #[error("handler panicked: {0}")]
    Panic(String),
}

impl Failure {
    /// Wraps an application error so a handler can return it as an outcome.
    pub fn handler(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Handler(err.into())
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self::Panic(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_keep_their_message() {
        let f = Failure::from_panic(Box::new("boom"));
        assert!(matches!(f, Failure::Panic(ref m) if m == "boom"));

        let f = Failure::from_panic(Box::new(String::from("formatted 42")));
        assert!(matches!(f, Failure::Panic(ref m) if m == "formatted 42"));

        let f = Failure::from_panic(Box::new(7_u32));
        assert!(matches!(f, Failure::Panic(ref m) if m == "non-string panic payload"));
    }

    #[test]
    fn io_errors_become_send_failures() {
        let f: Failure = std::io::Error::from(std::io::ErrorKind::BrokenPipe).into();
        assert!(matches!(f, Failure::Send(_)));
        assert!(f.to_string().starts_with("sending response failed"));
    }
}
