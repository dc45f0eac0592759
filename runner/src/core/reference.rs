//! Recognizer for reference tokens in params and results.
//!
//! A reference names a handler-owned object that outlives one request. Two
//! encodings exist across protocol revisions and both are accepted:
//!
//! - bare: `"$name"`
//! - wrapped: `{"ref": "$name"}`

use serde_json::{Map, Value};

/// Sentinel prefix that marks a string as a reference name.
pub const REF_PREFIX: char = '$';

/// Field name used by the wrapped encoding.
pub const WRAPPED_REF_FIELD: &str = "ref";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefEncoding {
    Bare,
    Wrapped,
}

/// A recognized reference and the encoding it appeared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefToken<'a> {
    pub name: &'a str,
    pub encoding: RefEncoding,
}

/// Returns true for strings that look like a reference name (`$` plus at least one char).
pub fn is_ref_name(candidate: &str) -> bool {
    candidate.len() > REF_PREFIX.len_utf8() && candidate.starts_with(REF_PREFIX)
}

/// Recognize a single JSON value as a reference token.
pub fn recognize(value: &Value) -> Option<RefToken<'_>> {
    match value {
        Value::String(name) if is_ref_name(name) => Some(RefToken {
            name,
            encoding: RefEncoding::Bare,
        }),
        Value::Object(map) if map.len() == 1 => match map.get(WRAPPED_REF_FIELD) {
            Some(Value::String(name)) if is_ref_name(name) => Some(RefToken {
                name,
                encoding: RefEncoding::Wrapped,
            }),
            _ => None,
        },
        _ => None,
    }
}

/// Collect references from the first level of a params object.
///
/// Nested arrays/objects are not searched, apart from the wrapped encoding
/// itself. Order follows the map's key order, so it is deterministic.
pub fn refs_in_params(params: Option<&Map<String, Value>>) -> Vec<&str> {
    params
        .into_iter()
        .flat_map(|map| map.values())
        .filter_map(recognize)
        .map(|token| token.name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recognizes_bare_and_wrapped_tokens() {
        assert_eq!(
            recognize(&json!("$ctx")),
            Some(RefToken {
                name: "$ctx",
                encoding: RefEncoding::Bare
            })
        );
        assert_eq!(
            recognize(&json!({"ref": "$ctx"})),
            Some(RefToken {
                name: "$ctx",
                encoding: RefEncoding::Wrapped
            })
        );
    }

    #[test]
    fn rejects_lookalikes() {
        assert_eq!(recognize(&json!("$")), None);
        assert_eq!(recognize(&json!("ctx")), None);
        assert_eq!(recognize(&json!({"ref": "ctx"})), None);
        assert_eq!(recognize(&json!({"ref": "$ctx", "extra": 1})), None);
        assert_eq!(recognize(&json!(["$ctx"])), None);
    }

    #[test]
    fn params_scan_is_first_level_only() {
        let params = json!({
            "a": "$first",
            "b": {"ref": "$second"},
            "c": {"nested": "$hidden"},
            "d": ["$also_hidden"],
            "e": "deadbeef"
        });
        let refs = refs_in_params(params.as_object());
        assert_eq!(refs, vec!["$first", "$second"]);
    }

    #[test]
    fn missing_params_have_no_refs() {
        assert!(refs_in_params(None).is_empty());
    }
}
