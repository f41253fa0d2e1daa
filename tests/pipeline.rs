//! End-to-end behaviour of endpoint chains: binding, dispatch, recovery.
//!
//! Requests are driven straight through a compiled `Dispatcher`, without a
//! socket in between.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use baton::{
    Context, DefaultErrorHandler, Dispatcher, Endpoint, ErrorHandler, Exchange, Failure,
    JsonErrorHandler, Params, Request, Response, async_trait,
};
use bytes::Bytes;
use http::{StatusCode, header};
use http_body_util::BodyExt;
use serde::Deserialize;
use validator::Validate;

// ── Fixtures ──────────────────────────────────────────────────────────────────

#[allow(dead_code)]
#[derive(Debug, Deserialize, Validate)]
struct Named {
    name: String,
}

impl Params for Named {}

#[allow(dead_code)]
#[derive(Debug, Deserialize, Validate)]
struct Aged {
    #[validate(range(min = 0))]
    age: i32,
}

impl Params for Aged {}

#[allow(dead_code)]
#[derive(Debug, Deserialize, Validate)]
struct Profile {
    #[validate(length(min = 3))]
    handle: String,
    #[validate(email)]
    email: String,
    #[validate(range(min = 18, max = 130))]
    age: i32,
}

impl Params for Profile {}

#[derive(Debug, Deserialize, Validate)]
struct Page {
    #[validate(range(min = 1))]
    page: u32,
    size: Option<u32>,
}

impl Params for Page {}

#[allow(dead_code)]
#[derive(Debug, Deserialize, Validate)]
struct Person {
    #[validate(length(min = 1))]
    name: String,
    #[validate(range(min = 0))]
    age: i32,
}

impl Params for Person {}

#[derive(Debug, Deserialize, Validate)]
struct Window {
    #[validate(range(min = 0))]
    from: i32,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize, Validate)]
struct Report {
    #[validate(nested)]
    window: Window,
}

impl Params for Report {}

#[derive(Debug, Deserialize, Validate)]
struct Cursor {
    #[validate(range(min = 1))]
    page: Option<u32>,
}

impl Params for Cursor {}

fn request(method: &str, uri: &str, body: &'static str) -> Request {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .body(Bytes::from_static(body.as_bytes()))
        .unwrap()
        .into()
}

fn compile(endpoint: Endpoint) -> Dispatcher {
    Dispatcher::compile(endpoint.handlers(), Arc::new(DefaultErrorHandler)).unwrap()
}

async fn call(d: &Dispatcher, req: Request) -> (StatusCode, http::HeaderMap, Bytes) {
    let res = d.respond(req).await.unwrap();
    let status = res.status();
    let headers = res.headers().clone();
    let body = res.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

fn errors(body: &[u8]) -> Vec<serde_json::Value> {
    let v: serde_json::Value = serde_json::from_slice(body).unwrap();
    v["errors"].as_array().unwrap().clone()
}

async fn created(_: Context) -> Response {
    Response::empty(StatusCode::CREATED)
}

// ── Binding ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_object_for_required_field_is_missing_parameters() {
    let d = compile(Endpoint::post("/people", created).body::<Named>());
    let (status, _, body) = call(&d, request("POST", "/people", "{}")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let errs = errors(&body);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0]["code"], "INVALID_PARAMS");
    assert_eq!(errs[0]["detail"], "Missing parameters");
    assert_eq!(errs[0]["status"], "400");
}

#[tokio::test]
async fn empty_body_is_missing_parameters() {
    let d = compile(Endpoint::post("/people", created).body::<Named>());
    let (status, _, body) = call(&d, request("POST", "/people", "")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(errors(&body)[0]["detail"], "Missing parameters");
}

#[tokio::test]
async fn range_violation_names_field_and_rule() {
    let d = compile(Endpoint::post("/ages", created).body::<Aged>());
    let (status, _, body) = call(&d, request("POST", "/ages", r#"{"age": -1}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let errs = errors(&body);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0]["code"], "INVALID_PARAMS");
    assert_eq!(errs[0]["detail"], "Invalid parameter: age (range)");
}

#[tokio::test]
async fn every_field_failure_is_reported_with_a_unique_id() {
    let d = compile(Endpoint::post("/profiles", created).body::<Profile>());
    let body = r#"{"handle": "x", "email": "not-an-email", "age": 7}"#;
    let (status, _, body) = call(&d, request("POST", "/profiles", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let errs = errors(&body);
    assert_eq!(errs.len(), 3);

    let ids: HashSet<&str> = errs.iter().map(|e| e["id"].as_str().unwrap()).collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| !id.is_empty()));
    assert!(errs.iter().all(|e| e["code"] == "INVALID_PARAMS"));

    let details: Vec<&str> = errs.iter().map(|e| e["detail"].as_str().unwrap()).collect();
    assert_eq!(details, [
        "Invalid parameter: age (range)",
        "Invalid parameter: email (email)",
        "Invalid parameter: handle (length)",
    ]);
}

#[tokio::test]
async fn nested_field_failures_are_reported() {
    let d = compile(Endpoint::post("/reports", created).body::<Report>());
    let (status, _, body) = call(&d, request("POST", "/reports", r#"{"window": {"from": -1}}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let errs = errors(&body);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0]["code"], "INVALID_PARAMS");
    assert_eq!(errs[0]["detail"], "Invalid parameter: window.from (range)");
}

#[tokio::test]
async fn optional_query_binds_without_a_query_string() {
    let endpoint = Endpoint::get("/feed", |ctx: Context| async move {
        let cursor = ctx.query_params::<Cursor>()?;
        Some(Response::json_ok(&serde_json::json!({ "page": cursor.page })))
    })
    .query::<Cursor>();

    let d = compile(endpoint);
    let (status, _, body) = call(&d, request("GET", "/feed", "")).await;

    assert_eq!(status, StatusCode::OK);
    let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v, serde_json::json!({ "page": null }));

    let (status, _, body) = call(&d, request("GET", "/feed?page=0", "")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(errors(&body)[0]["detail"], "Invalid parameter: page (range)");
}

#[tokio::test]
async fn partially_filled_body_names_absent_and_invalid_fields() {
    let d = compile(Endpoint::post("/people", created).body::<Person>());
    let (status, _, body) = call(&d, request("POST", "/people", r#"{"age": -1}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let errs = errors(&body);
    let details: Vec<&str> = errs.iter().map(|e| e["detail"].as_str().unwrap()).collect();
    assert_eq!(details, ["Invalid parameter: age (range)", "Invalid parameter: name (required)"]);
    assert!(errs.iter().all(|e| e["code"] == "INVALID_PARAMS" && e["status"] == "400"));
}

#[tokio::test]
async fn bound_parameters_reach_handlers() {
    let endpoint = Endpoint::get("/items", |ctx: Context| async move {
        let page = ctx.query_params::<Page>()?;
        Some(Response::json_ok(&serde_json::json!({ "page": page.page, "size": page.size })))
    })
    .query::<Page>();

    let d = compile(endpoint);
    let (status, headers, body) = call(&d, request("GET", "/items?page=2&size=50", "")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json; charset=utf-8");
    let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v, serde_json::json!({ "page": 2, "size": 50 }));
}

#[tokio::test]
async fn query_is_bound_before_body() {
    let endpoint = Endpoint::post("/items", created).query::<Page>().body::<Aged>();
    let d = compile(endpoint);

    // both slots are invalid; only the query failure is reported
    let (status, _, body) = call(&d, request("POST", "/items?page=0", r#"{"age": -5}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let errs = errors(&body);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0]["detail"], "Invalid parameter: page (range)");
}

#[tokio::test]
async fn undecodable_body_goes_to_the_error_handler() {
    let d = compile(Endpoint::post("/ages", created).body::<Aged>());
    let (status, _, body) = call(&d, request("POST", "/ages", r#"{"age": "old"}"#)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.is_empty());
}

// ── Dispatch and recovery ─────────────────────────────────────────────────────

#[tokio::test]
async fn later_handlers_never_run_after_a_response() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);

    let endpoint = Endpoint::get("/", created).then(move |_ctx: Context| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Response::empty(StatusCode::OK) }
    });

    let d = compile(endpoint);
    for _ in 0..3 {
        let (status, _, _) = call(&d, request("GET", "/", "")).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn panic_mid_chain_sends_default_500_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);

    let endpoint = Endpoint::get("/", |_ctx: Context| async { None::<Response> })
        .then(|_ctx: Context| async {
            let err: Result<Response, std::io::Error> = Err(std::io::Error::other("disk on fire"));
            err.unwrap()
        })
        .then(move |_ctx: Context| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Response::empty(StatusCode::OK) }
        });

    let d = compile(endpoint);
    let (status, _, body) = call(&d, request("GET", "/", "")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.is_empty());
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn chain_without_response_is_recovered() {
    let endpoint = Endpoint::get("/", |_ctx: Context| async { None::<Response> })
        .then(|_ctx: Context| async { None::<Response> });

    let d = compile(endpoint);
    let (status, _, body) = call(&d, request("GET", "/", "")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.is_empty());
}

/// Records the failures it sees, then answers like the default handler.
#[derive(Clone, Default)]
struct Recording {
    seen: Arc<Mutex<Vec<String>>>,
    committed: Arc<Mutex<Vec<bool>>>,
}

#[async_trait]
impl ErrorHandler for Recording {
    async fn handle(&self, exchange: &mut Exchange, failure: Failure) -> std::io::Result<()> {
        let kind = match failure {
            Failure::Unanswered => "unanswered",
            Failure::Send(_) => "send",
            Failure::Decode { .. } => "decode",
            Failure::Handler(_) => "handler",
            Failure::Panic(_) => "panic",
        };
        self.seen.lock().unwrap().push(kind.to_owned());
        self.committed.lock().unwrap().push(exchange.is_committed());
        Response::empty(StatusCode::SERVICE_UNAVAILABLE).send(exchange).await
    }
}

#[tokio::test]
async fn every_failure_kind_reaches_the_error_handler() {
    let recorder = Recording::default();

    let unserialisable = || async {
        let mut m: HashMap<(i32, i32), i32> = HashMap::new();
        m.insert((1, 2), 3);
        Response::json_ok(&m)
    };
    let endpoints = [
        Endpoint::get("/", |_ctx: Context| async { None::<Response> }),
        Endpoint::get("/", move |_ctx: Context| unserialisable()),
        Endpoint::post("/", created).body::<Aged>(),
        Endpoint::get("/", |_ctx: Context| async { Err::<Response, _>(Failure::handler("nope")) }),
        Endpoint::get("/", |_ctx: Context| async {
            if true {
                panic!("bug");
            }
            None::<Response>
        }),
    ];

    for endpoint in endpoints {
        let d = Dispatcher::compile(endpoint.handlers(), Arc::new(recorder.clone())).unwrap();
        let (status, _, _) = call(&d, request("POST", "/", r#"{"age": "old"}"#)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    assert_eq!(*recorder.seen.lock().unwrap(), ["unanswered", "send", "decode", "handler", "panic"]);
}

#[tokio::test]
async fn write_failure_after_commit_reaches_the_error_handler_once() {
    let recorder = Recording::default();
    let endpoint = Endpoint::get("/", |_ctx: Context| async {
        Response::json_ok(&serde_json::json!({ "ok": true }))
    });
    let d = Dispatcher::compile(endpoint.handlers(), Arc::new(recorder.clone())).unwrap();

    // the connection is gone before the head is read
    let (exchange, pending) = Exchange::new(Context::new(request("GET", "/", "")));
    drop(pending);
    d.run(exchange).await.unwrap();

    assert_eq!(*recorder.seen.lock().unwrap(), ["send"]);
    assert_eq!(*recorder.committed.lock().unwrap(), [true]);
}

#[tokio::test]
async fn structured_error_handler_sends_internal_envelope() {
    let endpoint = Endpoint::get("/", |_ctx: Context| async { None::<Response> });
    let d = Dispatcher::compile(endpoint.handlers(), Arc::new(JsonErrorHandler)).unwrap();
    let (status, _, body) = call(&d, request("GET", "/", "")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let errs = errors(&body);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0]["code"], "INTERNAL");
    assert_eq!(errs[0]["status"], "500");
}

// ── File responses ────────────────────────────────────────────────────────────

#[tokio::test]
async fn file_response_streams_exact_length() {
    let endpoint = Endpoint::get("/download", |_ctx: Context| async {
        Response::stream(std::io::Cursor::new(b"0123456789".to_vec()), 10)
    });

    let d = compile(endpoint);
    let (status, headers, body) = call(&d, request("GET", "/download", "")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_LENGTH], "10");
    assert_eq!(&body[..], b"0123456789");
}
