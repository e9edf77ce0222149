//! Property-based test generators using proptest.

use proptest::prelude::*;
use serde_json::{json, Map, Value};

/// Strategy for document IDs the server accepts, including ones that need
/// percent-encoding.
pub fn doc_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9][a-zA-Z0-9 ?#&%+/=:_-]{0,31}").expect("Invalid regex")
}

/// Strategy for valid database names.
pub fn db_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_$()+/-]{0,31}").expect("Invalid regex")
}

/// Strategy for scalar JSON values.
pub fn json_scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::String),
    ]
}

/// Strategy for document bodies: objects with up to eight fields and no
/// reserved (`_`-prefixed) keys.
pub fn doc_body_strategy() -> impl Strategy<Value = Value> {
    let value = json_scalar_strategy().prop_recursive(2, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|fields| Value::Object(fields.into_iter().collect())),
        ]
    });
    prop::collection::btree_map("[a-z][a-z0-9]{0,7}", value, 0..8)
        .prop_map(|fields| Value::Object(fields.into_iter().collect::<Map<_, _>>()))
}

/// Strategy for `ETag` header values, sometimes malformed.
pub fn etag_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (1u32..1000, "[0-9a-f]{32}").prop_map(|(n, hash)| format!("\"{}-{}\"", n, hash)),
        "[0-9a-f\"-]{0,8}",
    ]
}
