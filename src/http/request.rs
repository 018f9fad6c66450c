//! Request parsing.
//!
//! # Responsibilities
//! - Parse path ids and JSON bodies into typed values
//! - Assign and propagate the `x-request-id` header
//!
//! # Design Decisions
//! - Handlers take raw `Bytes` and `Path<String>` and parse here, inside
//!   the request scope, so a malformed request still gets a span, a log
//!   line and a 400 instead of an extractor rejection
//! - Request ids are UUID v4, set as early as possible

use axum::body::Bytes;
use axum::http::HeaderName;
use serde::de::DeserializeOwned;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::error::ServiceError;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Layer assigning a UUID request id when the client sent none.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid)
}

/// Layer copying the request id onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(X_REQUEST_ID)
}

/// Parse a positive numeric path segment.
pub fn parse_id(raw: &str, code: &'static str, what: &str) -> Result<u64, ServiceError> {
    match raw.parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ServiceError::invalid_input(code, format!("Invalid {} ID", what))),
    }
}

/// Deserialize a JSON body. An empty body is treated as `{}`.
pub fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ServiceError> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) { b"{}" } else { &body[..] };
    serde_json::from_slice(raw)
        .map_err(|e| ServiceError::invalid_input("invalid_request", format!("Invalid request: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Login {
        email: String,
        #[serde(default)]
        password: String,
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42", "invalid_user_id", "user").unwrap(), 42);
        assert_eq!(parse_id("0", "invalid_user_id", "user").unwrap_err().code, "invalid_user_id");
        assert_eq!(parse_id("abc", "invalid_user_id", "user").unwrap_err().message, "Invalid user ID");
        assert!(parse_id("-1", "invalid_user_id", "user").is_err());
    }

    #[test]
    fn test_parse_body() {
        let login: Login = parse_body(&Bytes::from_static(br#"{"email":"a@b.c"}"#)).unwrap();
        assert_eq!(login.email, "a@b.c");
        assert_eq!(login.password, "");

        let err = parse_body::<Login>(&Bytes::from_static(b"{not json")).unwrap_err();
        assert_eq!(err.code, "invalid_request");

        // Required field missing in the implied empty object.
        assert!(parse_body::<Login>(&Bytes::new()).is_err());
    }
}
