//! Successful responses.
//!
//! A [`Reply`] carries the status, the JSON body and the summary message
//! that the request scope logs. Degraded replies (a best-effort step was
//! skipped) are logged at warn level but still succeed.

use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::error::ServiceError;

#[derive(Debug)]
pub struct Reply {
    status: StatusCode,
    body: Result<Value, String>,
    message: String,
    degraded: bool,
}

impl Reply {
    pub fn new(status: StatusCode, message: impl Into<String>, body: &impl Serialize) -> Self {
        Self {
            status,
            body: serde_json::to_value(body).map_err(|e| e.to_string()),
            message: message.into(),
            degraded: false,
        }
    }

    /// 200 with `body`.
    pub fn ok(message: impl Into<String>, body: &impl Serialize) -> Self {
        Self::new(StatusCode::OK, message, body)
    }

    /// 201 with `body`.
    pub fn created(message: impl Into<String>, body: &impl Serialize) -> Self {
        Self::new(StatusCode::CREATED, message, body)
    }

    /// Mark as a soft success.
    pub fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Split into status and body, failing if the body did not serialize.
    pub(crate) fn into_parts(self) -> Result<(StatusCode, Value), ServiceError> {
        match self.body {
            Ok(body) => Ok((self.status, body)),
            Err(e) => Err(ServiceError::internal("response_serialization_failed", e)),
        }
    }
}
