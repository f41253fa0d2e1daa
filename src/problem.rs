//! Machine-readable error objects sent to clients.
//!
//! Every error response uses the same envelope:
//!
//! ```json
//! { "errors": [ { "id": "…", "status": "400", "code": "INVALID_PARAMS", "detail": "…" } ] }
//! ```
//!
//! Clients depend on this shape. Field names, field order, and the string
//! encoding of `status` must not change.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error category carried in the `code` field.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidParams,
    MissingParams,
    Internal,
}

/// One failure, as reported to the client.
///
/// Each constructor call mints a fresh random `id` so that a client report
/// can be matched against server logs.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ErrorDetail {
    pub id: Uuid,
    pub status: String,
    pub code: ErrorCode,
    pub detail: String,
}

impl ErrorDetail {
    pub fn new(status: StatusCode, code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: status.as_u16().to_string(),
            code,
            detail: detail.into(),
        }
    }

    /// `400 INVALID_PARAMS`.
    ///
    /// `detail` reads `Invalid parameter: {field}`, followed by ` ({rule})`
    /// when `rule` is non-empty. An empty `field` means the parameters were
    /// absent altogether and yields `Missing parameters`.
    pub fn invalid_params(field: &str, rule: &str) -> Self {
        let detail = match (field, rule) {
            ("", _) => "Missing parameters".to_owned(),
            (field, "") => format!("Invalid parameter: {field}"),
            (field, rule) => format!("Invalid parameter: {field} ({rule})"),
        };
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::InvalidParams, detail)
    }

    /// `400 MISSING_PARAMS`; `detail` names what was missing.
    pub fn missing_params(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::MissingParams, detail)
    }

    /// `500 INTERNAL` with an empty detail.
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Internal, "")
    }

    /// The `status` field as a status code, or `500` if it does not parse.
    pub fn status_code(&self) -> StatusCode {
        self.status
            .parse::<u16>()
            .ok()
            .and_then(|s| StatusCode::from_u16(s).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// The `{"errors": [...]}` wire envelope.
#[derive(Serialize)]
pub(crate) struct Envelope<'a> {
    pub errors: &'a [ErrorDetail],
}
