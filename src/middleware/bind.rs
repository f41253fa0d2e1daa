//! Parameter binding and validation middleware.
//!
//! A binder decodes one parameter slot (query string or body) into a typed
//! value, validates it, and stores it in the [`Context`]. Client mistakes are
//! answered right here with a `400`:
//!
//! | Source problem | Response |
//! |---|---|
//! | nothing to decode (empty body, or no data where fields are required) | one `Missing parameters` entry |
//! | some required fields absent | one `{field} (required)` entry per absent field |
//! | validation rules failed | one `INVALID_PARAMS` entry per failed rule |
//!
//! Absent fields and failed rules are reported together, ordered by field
//! path. Nested members are named `outer.inner`, list members `items[0].x`.
//!
//! Anything else (malformed syntax, wrong types, codec bugs) is not a
//! validation outcome. It becomes [`Failure::Decode`] and goes to the error
//! handler like any other unexpected failure.

use std::marker::PhantomData;
use std::sync::Arc;

use http::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use super::presence;
use crate::context::{Context, Slot};
use crate::error::Failure;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::problem::ErrorDetail;
use crate::request::Request;
use crate::response::Response;

// ── Codec ─────────────────────────────────────────────────────────────────────

/// How a parameter source is decoded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Codec {
    /// JSON request body. Default for the body slot.
    Json,
    /// URL query string. Default for the query slot.
    Query,
    /// `application/x-www-form-urlencoded` request body.
    Form,
}

impl Codec {
    fn default_for(slot: Slot) -> Self {
        match slot {
            Slot::Query => Self::Query,
            Slot::Body => Self::Json,
        }
    }

    /// Urlencoded sources carry every value as a string.
    fn is_textual(self) -> bool {
        !matches!(self, Self::Json)
    }

    /// Reads the raw source. `Ok(None)` means there is nothing to decode.
    ///
    /// Only an empty JSON body counts as nothing; an empty query string or
    /// form is an empty set of pairs, and the target type decides whether
    /// that is acceptable.
    fn source(self, req: &Request) -> Result<Option<Value>, String> {
        match self {
            Self::Json => {
                let raw = req.body();
                if raw.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                match serde_json::from_slice(raw) {
                    Ok(value) => Ok(Some(value)),
                    Err(e) if e.is_eof() => Ok(None),
                    Err(e) => Err(e.to_string()),
                }
            }
            Self::Query => urlencoded(req.query().as_bytes()).map(Some),
            Self::Form => urlencoded(req.body()).map(Some),
        }
    }
}

/// Pairs become an object of strings; a repeated key keeps its last value.
fn urlencoded(raw: &[u8]) -> Result<Value, String> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(raw).map_err(|e| e.to_string())?;
    Ok(Value::Object(pairs.into_iter().map(|(k, v)| (k, Value::String(v))).collect()))
}

// ── Params ────────────────────────────────────────────────────────────────────

/// A type a binder can decode and validate.
///
/// Derive `Deserialize` and `Validate`, then opt in with an empty impl:
///
/// ```rust
/// use serde::Deserialize;
/// use validator::Validate;
///
/// #[derive(Deserialize, Validate)]
/// struct CreateUser {
///     #[validate(length(min = 1))]
///     name: String,
///     #[validate(range(min = 0))]
///     age: i32,
/// }
///
/// impl baton::Params for CreateUser {}
/// ```
pub trait Params: DeserializeOwned + Validate + Send + Sync + 'static {
    /// Overrides the slot's default codec, e.g. [`Codec::Form`] for a body
    /// that arrives urlencoded. Read once when the endpoint is built.
    fn codec() -> Option<Codec> {
        None
    }
}

// ── Binder ────────────────────────────────────────────────────────────────────

/// Middleware binding `T` into one [`Slot`] of the context.
pub struct Binder<T> {
    slot: Slot,
    codec: Codec,
    _params: PhantomData<fn() -> T>,
}

impl<T: Params> Binder<T> {
    pub fn new(slot: Slot) -> Self {
        Self {
            slot,
            codec: T::codec().unwrap_or_else(|| Codec::default_for(slot)),
            _params: PhantomData,
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub(crate) fn boxed(self) -> BoxedHandler {
        Arc::new(self)
    }

    /// Runs the binder against `ctx`.
    ///
    /// `Ok(None)`: bound and stored, continue. `Ok(Some(_))`: the client's
    /// parameters were rejected. `Err(_)`: the source could not be decoded.
    pub fn bind(&self, ctx: &Context) -> Result<Option<Response>, Failure> {
        let source = match self.codec.source(ctx.request()) {
            Ok(Some(source)) => source,
            Ok(None) => return Ok(Some(self.missing())),
            Err(message) => return Err(self.undecodable(message)),
        };
        let blank = matches!(&source, Value::Object(map) if map.is_empty());

        let decoded = match presence::decode::<T>(source, self.codec.is_textual()) {
            Ok(decoded) => decoded,
            Err(e) => {
                let message = e.to_string();
                return match presence::missing_field(&message) {
                    Some(field) => Ok(Some(bad_request(vec![ErrorDetail::invalid_params(field, "required")]))),
                    None => Err(self.undecodable(message)),
                };
            }
        };

        if blank && !decoded.gaps.is_empty() {
            return Ok(Some(self.missing()));
        }

        let mut failed: Vec<(String, String)> = decoded
            .gaps
            .iter()
            .map(|gap| (gap.clone(), "required".to_owned()))
            .collect();

        if let Err(errors) = decoded.value.validate() {
            // zero values standing in for absent fields fail rules of their own
            failed.extend(
                rule_failures(&errors)
                    .into_iter()
                    .filter(|(path, _)| !is_filled(path, &decoded.gaps)),
            );
        }

        if failed.is_empty() {
            ctx.store(self.slot, decoded.value);
            return Ok(None);
        }

        failed.sort_by(|a, b| a.0.cmp(&b.0));
        debug!(slot = %self.slot, failed = failed.len(), "parameters invalid");
        Ok(Some(bad_request(
            failed.iter().map(|(path, rule)| ErrorDetail::invalid_params(path, rule)).collect(),
        )))
    }

    fn missing(&self) -> Response {
        debug!(slot = %self.slot, "parameters missing");
        bad_request(vec![ErrorDetail::invalid_params("", "")])
    }

    fn undecodable(&self, message: String) -> Failure {
        Failure::Decode { slot: self.slot.as_str(), message }
    }
}

impl<T: Params> ErasedHandler for Binder<T> {
    fn call(&self, ctx: Context) -> BoxFuture {
        let outcome = self.bind(&ctx);
        Box::pin(async move { outcome })
    }
}

fn bad_request(errors: Vec<ErrorDetail>) -> Response {
    Response::error(StatusCode::BAD_REQUEST, errors)
}

/// `(path, rule)` for every failed rule, nested and list members included.
fn rule_failures(errors: &ValidationErrors) -> Vec<(String, String)> {
    let mut out = Vec::new();
    collect_rules(errors, "", &mut out);
    out
}

fn collect_rules(errors: &ValidationErrors, prefix: &str, out: &mut Vec<(String, String)>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() { field.to_string() } else { format!("{prefix}.{field}") };
        match kind {
            ValidationErrorsKind::Field(rules) => {
                out.extend(rules.iter().map(|rule| (path.clone(), rule.code.to_string())));
            }
            ValidationErrorsKind::Struct(inner) => collect_rules(inner, &path, out),
            ValidationErrorsKind::List(items) => {
                for (i, inner) in items {
                    collect_rules(inner, &format!("{path}[{i}]"), out);
                }
            }
        }
    }
}

/// `true` if `path` is, or lies under, a field that was filled in.
fn is_filled(path: &str, gaps: &[String]) -> bool {
    gaps.iter().any(|gap| {
        path.strip_prefix(gap.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.') || rest.starts_with('['))
    })
}
