//! Built-in health-check endpoints.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? |
//! | **Readiness** | `/readyz` | Can it serve traffic? |
//!
//! ```rust
//! use baton::{App, health};
//!
//! let app = App::new()
//!     .endpoint(health::liveness())
//!     .endpoint(health::readiness());
//! ```
//!
//! To gate readiness on dependencies, register your own `GET /readyz`
//! instead of [`readiness`].

use serde_json::json;

use crate::context::Context;
use crate::endpoint::Endpoint;
use crate::response::Response;

/// `GET /healthz` answering `200 {"status":"ok"}`.
pub fn liveness() -> Endpoint {
    Endpoint::get("/healthz", |_ctx: Context| async { Response::json_ok(&json!({ "status": "ok" })) })
}

/// `GET /readyz` answering `200 {"status":"ready"}`.
pub fn readiness() -> Endpoint {
    Endpoint::get("/readyz", |_ctx: Context| async { Response::json_ok(&json!({ "status": "ready" })) })
}
