//! Trace context creation and propagation.
//!
//! # Responsibilities
//! - Generate trace and span identifiers
//! - Derive child contexts for outbound calls
//! - Inject identifiers into outbound HTTP headers
//! - Extract identifiers from inbound HTTP headers
//!
//! # Wire Format
//! ```text
//! x-trace-id:      32 lowercase hex chars (128-bit, non-zero)
//! x-span-id:       16 lowercase hex chars (64-bit, non-zero)
//! x-trace-sampled: "1" | "0"   (absent = sampled)
//! traceparent:     00-{trace_id}-{span_id}-{01|00}   (W3C, fallback on extract)
//! ```
//!
//! # Design Decisions
//! - Extraction never fails a request: malformed input yields `None` and the
//!   caller starts a fresh root
//! - Injection only inserts the propagation keys; other headers are untouched

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const TRACE_ID_HEADER: HeaderName = HeaderName::from_static("x-trace-id");
pub const SPAN_ID_HEADER: HeaderName = HeaderName::from_static("x-span-id");
pub const SAMPLED_HEADER: HeaderName = HeaderName::from_static("x-trace-sampled");
pub const TRACEPARENT_HEADER: HeaderName = HeaderName::from_static("traceparent");

/// 128-bit trace identifier shared by every span of one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId(u128);

impl TraceId {
    /// Generate a random, non-zero trace id.
    pub fn random() -> Self {
        loop {
            let id = rand::random::<u128>();
            if id != 0 {
                return Self(id);
            }
        }
    }

    pub fn to_u128(self) -> u128 {
        self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for TraceId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseIdError);
        }
        match u128::from_str_radix(s, 16) {
            Ok(0) | Err(_) => Err(ParseIdError),
            Ok(id) => Ok(Self(id)),
        }
    }
}

/// 64-bit identifier of a single span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId(u64);

impl SpanId {
    /// Generate a random, non-zero span id.
    pub fn random() -> Self {
        loop {
            let id = rand::random::<u64>();
            if id != 0 {
                return Self(id);
            }
        }
    }

    pub fn to_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SpanId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseIdError);
        }
        match u64::from_str_radix(s, 16) {
            Ok(0) | Err(_) => Err(ParseIdError),
            Ok(id) => Ok(Self(id)),
        }
    }
}

/// Identifier text was not valid fixed-width, non-zero hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("malformed trace identifier")]
pub struct ParseIdError;

macro_rules! id_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

id_serde!(TraceId);
id_serde!(SpanId);

/// Identifiers of the current position in a trace tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub sampled: bool,
}

impl TraceContext {
    /// Start a new, sampled trace. Never fails.
    pub fn root() -> Self {
        Self::root_with_sampling(true)
    }

    /// Start a new trace with an explicit sampling decision.
    pub fn root_with_sampling(sampled: bool) -> Self {
        Self {
            trace_id: TraceId::random(),
            span_id: SpanId::random(),
            parent_span_id: None,
            sampled,
        }
    }

    /// Derive a context for a new span below this one.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::random(),
            parent_span_id: Some(self.span_id),
            sampled: self.sampled,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    /// W3C `traceparent` rendering of this context.
    pub fn traceparent(&self) -> String {
        format!(
            "00-{}-{}-{}",
            self.trace_id,
            self.span_id,
            if self.sampled { "01" } else { "00" }
        )
    }
}

/// Write the context into an outbound carrier.
///
/// Only the propagation keys are inserted; every other entry is left as is.
pub fn inject(ctx: &TraceContext, headers: &mut HeaderMap) {
    let pairs = [
        (TRACE_ID_HEADER, ctx.trace_id.to_string()),
        (SPAN_ID_HEADER, ctx.span_id.to_string()),
        (SAMPLED_HEADER, if ctx.sampled { "1" } else { "0" }.to_string()),
        (TRACEPARENT_HEADER, ctx.traceparent()),
    ];
    for (name, value) in pairs {
        // hex and dashes are always valid header values
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

/// Read the caller's context from an inbound carrier.
///
/// Returns `None` when the carrier holds no usable identifiers. The returned
/// context describes the *caller's* span; use [`extract_or_root`] to obtain
/// the context for the receiving span.
pub fn extract(headers: &HeaderMap) -> Option<TraceContext> {
    extract_custom(headers).or_else(|| extract_traceparent(headers))
}

/// Context for a server-side span: a child of the inbound context when one
/// was propagated, otherwise a fresh root.
pub fn extract_or_root(headers: &HeaderMap) -> TraceContext {
    match extract(headers) {
        Some(remote) => remote.child(),
        None => TraceContext::root(),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn extract_custom(headers: &HeaderMap) -> Option<TraceContext> {
    let trace_id = header_str(headers, &TRACE_ID_HEADER)?
        .to_ascii_lowercase()
        .parse()
        .ok()?;
    let span_id = header_str(headers, &SPAN_ID_HEADER)?
        .to_ascii_lowercase()
        .parse()
        .ok()?;
    let sampled = match header_str(headers, &SAMPLED_HEADER) {
        None | Some("1") | Some("true") => true,
        Some("0") | Some("false") => false,
        Some(_) => return None,
    };

    Some(TraceContext {
        trace_id,
        span_id,
        parent_span_id: None,
        sampled,
    })
}

fn extract_traceparent(headers: &HeaderMap) -> Option<TraceContext> {
    let value = header_str(headers, &TRACEPARENT_HEADER)?.to_ascii_lowercase();
    let parts: Vec<&str> = value.split('-').collect();
    if parts.len() != 4 || parts[0] != "00" || parts[3].len() != 2 {
        return None;
    }
    let flags = u8::from_str_radix(parts[3], 16).ok()?;

    Some(TraceContext {
        trace_id: parts[1].parse().ok()?,
        span_id: parts[2].parse().ok()?,
        parent_span_id: None,
        sampled: flags & 0x01 == 0x01,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_context() {
        let root = TraceContext::root();
        assert!(root.is_root());
        assert!(root.sampled);
        assert_ne!(root.trace_id.to_u128(), 0);
        assert_ne!(root.span_id.to_u64(), 0);
    }

    #[test]
    fn test_child_keeps_trace() {
        let root = TraceContext::root_with_sampling(false);
        let child = root.child();
        let grandchild = child.child();

        assert_eq!(child.trace_id, root.trace_id);
        assert_eq!(grandchild.trace_id, root.trace_id);
        assert_eq!(child.parent_span_id, Some(root.span_id));
        assert_eq!(grandchild.parent_span_id, Some(child.span_id));
        assert_ne!(child.span_id, root.span_id);
        assert!(!grandchild.sampled);
    }

    #[test]
    fn test_inject_then_extract() {
        let ctx = TraceContext::root();
        let mut headers = HeaderMap::new();
        inject(&ctx, &mut headers);

        let extracted = extract(&headers).expect("context should round trip");
        assert_eq!(extracted.trace_id, ctx.trace_id);
        assert_eq!(extracted.span_id, ctx.span_id);
        assert!(extracted.sampled);
    }

    #[test]
    fn test_inject_is_additive() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("x-request-id", HeaderValue::from_static("abc"));

        inject(&TraceContext::root(), &mut headers);

        assert_eq!(headers.get("content-type").unwrap(), "application/json");
        assert_eq!(headers.get("x-request-id").unwrap(), "abc");
        assert!(headers.contains_key(TRACE_ID_HEADER));
    }

    #[test]
    fn test_extract_absent() {
        assert!(extract(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_extract_malformed() {
        let cases = [
            ("not-hex-at-all-not-hex-at-all-xx", "00f067aa0ba902b7"),
            ("00000000000000000000000000000000", "00f067aa0ba902b7"),
            ("4bf92f3577b34da6a3ce929d0e0e4736", "short"),
            ("4bf92f3577b34da6a3ce929d0e0e4736", "0000000000000000"),
        ];
        for (trace, span) in cases {
            let mut headers = HeaderMap::new();
            headers.insert(TRACE_ID_HEADER, HeaderValue::from_static(trace));
            headers.insert(SPAN_ID_HEADER, HeaderValue::from_static(span));
            assert!(extract(&headers).is_none(), "{trace}/{span} should be rejected");
        }

        let mut headers = HeaderMap::new();
        headers.insert(TRACEPARENT_HEADER, HeaderValue::from_static("garbage"));
        assert!(extract(&headers).is_none());
    }

    #[test]
    fn test_extract_traceparent_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(
            TRACEPARENT_HEADER,
            HeaderValue::from_static("00-4BF92F3577B34DA6A3CE929D0E0E4736-00f067aa0ba902b7-00"),
        );

        let ctx = extract(&headers).unwrap();
        assert_eq!(ctx.trace_id.to_string(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(ctx.span_id.to_string(), "00f067aa0ba902b7");
        assert!(!ctx.sampled);
    }

    #[test]
    fn test_extract_or_root() {
        let fresh = extract_or_root(&HeaderMap::new());
        assert!(fresh.is_root());

        let caller = TraceContext::root();
        let mut headers = HeaderMap::new();
        inject(&caller, &mut headers);
        let server = extract_or_root(&headers);
        assert_eq!(server.trace_id, caller.trace_id);
        assert_eq!(server.parent_span_id, Some(caller.span_id));
    }
}
