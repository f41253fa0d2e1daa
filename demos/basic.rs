//! Minimal baton example: bound parameters, a file download, and health checks.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl 'http://localhost:3000/users?page=2'
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice","age":-1}'
//!   curl http://localhost:3000/Cargo.toml
//!   curl http://localhost:3000/healthz

use baton::{App, Context, Endpoint, ErrorDetail, IntoResponse, JsonErrorHandler, Params, Response, Server, health};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use validator::Validate;

#[derive(Deserialize, Serialize, Validate)]
struct NewUser {
    #[validate(length(min = 1, max = 64))]
    name: String,
    #[validate(range(min = 0, max = 150))]
    age: i32,
}

impl Params for NewUser {}

#[derive(Deserialize, Validate)]
struct Paging {
    #[validate(range(min = 1))]
    page: u32,
}

impl Params for Paging {}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app = App::with_error_handler(JsonErrorHandler)
        .endpoint(Endpoint::get("/users/{id}", get_user))
        .endpoint(Endpoint::get("/users", list_users).query::<Paging>())
        .endpoint(Endpoint::post("/users", require_json).then(create_user).body::<NewUser>())
        .endpoint(Endpoint::get("/Cargo.toml", manifest))
        .endpoint(health::liveness())
        .endpoint(health::readiness());

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}

// GET /users/{id}
async fn get_user(ctx: Context) -> Response {
    let id = ctx.param("id").unwrap_or("unknown");
    Response::json_ok(&serde_json::json!({ "id": id, "name": "alice" }))
}

// GET /users?page=N
async fn list_users(ctx: Context) -> Option<Response> {
    let paging = ctx.query_params::<Paging>()?;
    Some(Response::json_ok(&serde_json::json!({ "page": paging.page, "users": [] })))
}

// Runs after the body binder: rejects anything not declared as JSON.
async fn require_json(ctx: Context) -> Option<Response> {
    match ctx.request().header("content-type") {
        Some(ct) if ct.starts_with("application/json") => None,
        _ => Some(ErrorDetail::missing_params("content-type: application/json").into_response()),
    }
}

// POST /users
async fn create_user(ctx: Context) -> Option<Response> {
    let user = ctx.body_params::<NewUser>()?;
    Some(Response::json(StatusCode::CREATED, user))
}

// GET /Cargo.toml: streams the manifest from the working directory
async fn manifest(_ctx: Context) -> Response {
    match tokio::fs::File::open("Cargo.toml").await {
        Ok(file) => Response::file(file),
        Err(_) => Response::empty(StatusCode::NOT_FOUND),
    }
}
