//! Middleware baton places in front of user handlers.
//!
//! Middleware is an ordinary chain member: it runs before the endpoint's
//! handlers and either lets the request through or answers it. Today that
//! means parameter binding; see [`bind`].

pub mod bind;
mod presence;

pub use bind::{Binder, Codec, Params};
