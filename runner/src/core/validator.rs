//! Comparison of an actual handler response against the expected one.

use thiserror::Error;

use crate::core::protocol::{ErrorCode, Response, normalize};

/// Why a response did not match its expectation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Mismatch {
    #[error("expected error {}, but got no error", describe_code(.expected.as_ref()))]
    MissingError { expected: Option<ErrorCode> },

    #[error("expected result to be null or omitted when error is present, got: {actual}")]
    ResultWithError { actual: String },

    #[error("expected error code {expected}, but got error with no code")]
    MissingErrorCode { expected: ErrorCode },

    #[error("expected error type {expected}, got {actual}")]
    ErrorType { expected: String, actual: String },

    #[error("expected error member {expected}, got {actual}")]
    ErrorMember { expected: String, actual: String },

    #[error("expected success with no error, but got error{}", describe_actual(.actual.as_ref()))]
    UnexpectedError { actual: Option<ErrorCode> },

    #[error("expected null or omitted result, got: {actual}")]
    UnexpectedResult { actual: String },

    #[error("result mismatch: expected {expected}, got {actual}")]
    Result { expected: String, actual: String },
}

fn describe_code(code: Option<&ErrorCode>) -> String {
    code.map_or_else(|| "(any)".to_string(), ToString::to_string)
}

fn describe_actual(code: Option<&ErrorCode>) -> String {
    code.map_or_else(String::new, |code| format!(": {code}"))
}

/// Validate `actual` against `expected`.
///
/// Error expectations check that an error is present, that no result rides
/// along with it, and, when a code is expected, that type and member match
/// exactly. Success expectations require no error and a result equal to the
/// expected one after canonicalization; an omitted expected result demands an
/// omitted (or null) actual result.
pub fn validate_response(expected: &Response, actual: &Response) -> Result<(), Mismatch> {
    match &expected.error {
        Some(expected_error) => validate_error(expected_error.code.as_ref(), actual),
        None => validate_success(expected, actual),
    }
}

fn validate_error(expected: Option<&ErrorCode>, actual: &Response) -> Result<(), Mismatch> {
    let Some(actual_error) = &actual.error else {
        return Err(Mismatch::MissingError {
            expected: expected.cloned(),
        });
    };

    if let Some(result) = actual.result.as_ref().filter(|_| !actual.result_is_null_or_omitted()) {
        return Err(Mismatch::ResultWithError {
            actual: normalize(result),
        });
    }

    let Some(expected) = expected else {
        return Ok(());
    };
    let Some(actual_code) = &actual_error.code else {
        return Err(Mismatch::MissingErrorCode {
            expected: expected.clone(),
        });
    };
    if actual_code.kind != expected.kind {
        return Err(Mismatch::ErrorType {
            expected: expected.kind.clone(),
            actual: actual_code.kind.clone(),
        });
    }
    if actual_code.member != expected.member {
        return Err(Mismatch::ErrorMember {
            expected: expected.member.clone(),
            actual: actual_code.member.clone(),
        });
    }
    Ok(())
}

fn validate_success(expected: &Response, actual: &Response) -> Result<(), Mismatch> {
    if let Some(actual_error) = &actual.error {
        return Err(Mismatch::UnexpectedError {
            actual: actual_error.code.clone(),
        });
    }

    let (Some(expected_result), false) =
        (expected.result.as_ref(), expected.result_is_null_or_omitted())
    else {
        return match actual.result.as_ref() {
            Some(result) if !actual.result_is_null_or_omitted() => {
                Err(Mismatch::UnexpectedResult {
                    actual: normalize(result),
                })
            }
            _ => Ok(()),
        };
    };

    let expected_norm = normalize(expected_result);
    let actual_norm = actual
        .result
        .as_ref()
        .map_or_else(|| "null".to_string(), normalize);
    if expected_norm != actual_norm {
        return Err(Mismatch::Result {
            expected: expected_norm,
            actual: actual_norm,
        });
    }
    Ok(())
}
