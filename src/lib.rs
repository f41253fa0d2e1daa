//! # baton
//!
//! Declarative HTTP endpoints over hyper. A handler chain passes the request
//! along until one handler answers; exactly one response goes out per
//! request, even when a handler panics.
//!
//! ## The contract
//!
//! - Handlers **return** a [`Response`]; they never write to the client.
//!   Returning `None` hands the request to the next handler.
//! - Query and body parameters are decoded and validated before user code
//!   runs. Bad client input is answered with a `400` and a
//!   `{"errors": [...]}` envelope listing every failed field.
//! - Everything else that goes wrong (panics, a chain that never answers,
//!   a failed write) is caught per request and handed to one
//!   [`ErrorHandler`]. The default logs and sends a bare `500`.
//!
//! What baton leaves to the layers around it: TLS, body-size limits,
//! timeouts, and content negotiation.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use baton::{App, Context, Endpoint, Params, Response, Server};
//! use http::StatusCode;
//! use serde::{Deserialize, Serialize};
//! use validator::Validate;
//!
//! #[derive(Deserialize, Serialize, Validate)]
//! struct NewUser {
//!     #[validate(length(min = 1, max = 64))]
//!     name: String,
//!     #[validate(range(min = 0))]
//!     age: i32,
//! }
//!
//! impl Params for NewUser {}
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = App::new()
//!         .endpoint(Endpoint::get("/users/{id}", get_user))
//!         .endpoint(Endpoint::post("/users", create_user).body::<NewUser>());
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn get_user(ctx: Context) -> Response {
//!     let id = ctx.param("id").unwrap_or("unknown");
//!     Response::json_ok(&serde_json::json!({ "id": id }))
//! }
//!
//! async fn create_user(ctx: Context) -> Option<Response> {
//!     let user = ctx.body_params::<NewUser>()?;
//!     Some(Response::json(StatusCode::CREATED, user))
//! }
//! ```

mod app;
mod context;
mod dispatch;
mod endpoint;
mod error;
mod exchange;
mod handler;
mod problem;
mod request;
mod response;
mod router;
mod server;

pub mod health;
pub mod middleware;

pub use app::App;
pub use context::{Context, Slot};
pub use dispatch::{DefaultErrorHandler, Dispatcher, ErrorHandler, JsonErrorHandler};
pub use endpoint::Endpoint;
pub use error::{Error, Failure};
pub use exchange::{Exchange, PendingResponse, ResponseBody};
pub use handler::{Chain, Handler, IntoOutcome, Outcome};
pub use middleware::{Codec, Params};
pub use problem::{ErrorCode, ErrorDetail};
pub use request::Request;
pub use response::{ByteStream, IntoResponse, Response};
pub use server::Server;

/// Re-exported so implementors of [`ErrorHandler`] need no direct dependency.
pub use async_trait::async_trait;
