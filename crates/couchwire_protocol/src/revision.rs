//! Revision codec for `ETag` headers.
//!
//! CouchDB returns the current revision of a document in the `ETag`
//! header, wrapped in one pair of double quotes:
//!
//! ```
//! use couchwire_protocol::revision;
//!
//! assert_eq!(revision("\"1-62bc3c4d01e43ee9d0cead8cd7c76041\""), "1-62bc3c4d01e43ee9d0cead8cd7c76041");
//! assert_eq!(revision(""), "");
//! ```

/// Extracts the revision token from a raw `ETag` header value.
///
/// An empty value yields an empty token. A value wrapped in exactly one
/// pair of double quotes yields the inner text. Anything else is returned
/// unchanged.
pub fn revision(etag: &str) -> String {
    match etag
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        Some(inner) => inner.to_string(),
        None => etag.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_header() {
        assert_eq!(revision(""), "");
    }

    #[test]
    fn quoted_header() {
        assert_eq!(revision("\"2-7051cbe5c8faecd085a3fa619e6e6337\""), "2-7051cbe5c8faecd085a3fa619e6e6337");
    }

    #[test]
    fn only_one_pair_is_stripped() {
        assert_eq!(revision("\"\"1-a\"\""), "\"1-a\"");
    }

    #[test]
    fn malformed_headers_pass_through() {
        assert_eq!(revision("\""), "\"");
        assert_eq!(revision("x"), "x");
        assert_eq!(revision("1-abc"), "1-abc");
        assert_eq!(revision("\"1-abc"), "\"1-abc");
    }

    #[test]
    fn empty_quotes() {
        assert_eq!(revision("\"\""), "");
    }

    proptest! {
        #[test]
        fn unquotes_any_token(token in ".*") {
            prop_assert_eq!(revision(&format!("\"{}\"", token)), token);
        }
    }
}
