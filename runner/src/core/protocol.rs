//! Wire model for the line-delimited handler protocol.
//!
//! A request is one JSON object per line on the handler's stdin; the handler
//! answers with exactly one response line on stdout, in request order. Field
//! omission and explicit `null` are equivalent for `result` and `error`, but an
//! empty `error: {}` is a real (unspecified) error and differs from no error.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::core::reference;

/// A single request sent to the handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
    /// Registry slot the handler must populate when the call creates an object.
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// A handler response (or the expected response of a test case).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    /// True when `result` was omitted or is JSON `null`.
    pub fn result_is_null_or_omitted(&self) -> bool {
        matches!(self.result, None | Some(Value::Null))
    }
}

/// Error payload. A missing `code` means "an error occurred" without detail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCode {
    /// Enum type name, e.g. `btck_ScriptVerifyStatus`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Enum member, e.g. `ERROR_INVALID_FLAGS_COMBINATION`.
    pub member: String,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.member)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub request: Request,
    #[serde(default, rename = "expected_response", alias = "expectedResponse")]
    pub expected_response: Response,
}

impl TestCase {
    /// Reference this test creates, if any.
    ///
    /// The request's `ref` wins; suites that predate the field announce the
    /// created reference as the bare-token `result` of the expected response.
    pub fn created_ref(&self) -> Option<&str> {
        match self.request.reference.as_deref() {
            Some(name) if !name.is_empty() => Some(name),
            _ => self
                .expected_response
                .result
                .as_ref()
                .and_then(reference::recognize)
                .map(|token| token.name),
        }
    }

    /// References consumed by this test's params (first level only).
    pub fn consumed_refs(&self) -> Vec<&str> {
        reference::refs_in_params(self.request.params.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSuite {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tests: Vec<TestCase>,
    /// Tests are causally chained: the first failure voids the rest of the suite.
    #[serde(default)]
    pub stateful: bool,
}

/// Render a JSON value in canonical form for comparison.
///
/// Object keys are emitted in sorted order regardless of how the map stores
/// them, and integral floats collapse to their integer spelling so `1.0` and
/// `1` compare equal. Whitespace never survives.
pub fn normalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => out.push_str(&value.to_string()),
        Value::Number(number) => out.push_str(&canonical_number(number)),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
    }
}

fn canonical_number(number: &Number) -> String {
    if number.is_i64() || number.is_u64() {
        return number.to_string();
    }
    match number.as_f64() {
        // Integral floats inside the exactly representable range.
        Some(float) if float.fract() == 0.0 && float.abs() < 9_007_199_254_740_992.0 => {
            format!("{}", float as i64)
        }
        _ => number.to_string(),
    }
}
