use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use custodia_core::error::CustodiaError;

/// Opaque pagination boundary: `(sortValue, id)`. Sorting by a monotone
/// field plus the id as a tiebreaker guarantees no duplicate/skipped rows
/// across pages even with concurrent inserts at the same sort value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cursor {
    pub sort_value: i64,
    pub id: Vec<u8>,
}

impl Cursor {
    pub fn encode(&self) -> String {
        let bytes = bincode::serialize(self).expect("Cursor serialization is infallible");
        URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn decode(token: &str) -> Result<Self, CustodiaError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| CustodiaError::InvalidCursor)?;
        bincode::deserialize(&bytes).map_err(|_| CustodiaError::InvalidCursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_roundtrips_through_its_token() {
        let cursor = Cursor {
            sort_value: 1234,
            id: vec![1, 2, 3, 4],
        };
        let token = cursor.encode();
        let decoded = Cursor::decode(&token).unwrap();
        assert_eq!(cursor, decoded);
    }

    #[test]
    fn malformed_token_is_rejected() {
        assert!(Cursor::decode("not-a-valid-token!!").is_err());
    }
}
