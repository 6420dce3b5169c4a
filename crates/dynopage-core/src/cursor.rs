//! Opaque pagination tokens.
//!
//! A cursor is the base64 of the JSON-serialized wire key map of a boundary
//! item. Callers treat it as an opaque string; only this layer ever looks
//! inside. A cursor is meaningful only for the table, schema, and index that
//! produced it; nothing here validates that.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dynopage_model::Key;

use crate::error::{Error, Result};

/// Encode a boundary key as an opaque token. `None` or an empty key yields
/// `None` rather than a token for "nothing".
#[must_use]
pub fn encode(key: Option<&Key>) -> Option<String> {
    let key = key?;
    if key.is_empty() {
        return None;
    }
    let json = serde_json::to_vec(key).ok()?;
    Some(STANDARD.encode(json))
}

/// Decode an opaque token back into a boundary key. `None` yields `None`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] when the token is not base64-wrapped
/// JSON of a key map.
pub fn decode(token: Option<&str>) -> Result<Option<Key>> {
    let Some(token) = token else {
        return Ok(None);
    };
    let bytes = STANDARD
        .decode(token)
        .map_err(|e| Error::invalid_argument(format!("malformed cursor: {e}")))?;
    let key: Key = serde_json::from_slice(&bytes)
        .map_err(|e| Error::invalid_argument(format!("malformed cursor: {e}")))?;
    Ok(Some(key))
}

#[cfg(test)]
mod tests {
    use dynopage_model::AttributeValue;

    use super::*;

    #[test]
    fn test_should_round_trip_keys() {
        let key = Key::from([
            ("pk".to_owned(), AttributeValue::S("user#1".into())),
            ("sk".to_owned(), AttributeValue::N("42".into())),
        ]);
        let token = encode(Some(&key)).unwrap();
        assert_eq!(decode(Some(&token)).unwrap(), Some(key));
    }

    #[test]
    fn test_should_map_absent_and_empty_to_none() {
        assert_eq!(encode(None), None);
        assert_eq!(encode(Some(&Key::new())), None);
        assert_eq!(decode(None).unwrap(), None);
    }

    #[test]
    fn test_should_reject_malformed_tokens() {
        let err = decode(Some("not base64!!")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let err = decode(Some(&STANDARD.encode(b"not json"))).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
