//! Access/refresh token wire format, per spec §6:
//!
//! - Access token: `{"alg":"HS256","typ":"JWT"}` header,
//!   `{sub,tid,roles,permissions,type:"access",iat,exp}` payload,
//!   HMAC-SHA256 signature over `base64url(header).base64url(payload)`.
//! - Refresh token: an opaque 64-byte random secret, base64url-encoded;
//!   only its SHA-256 hex digest is ever persisted.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize, Deserialize)]
struct Header<'a> {
    alg: &'a str,
    typ: &'a str,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub tid: String,
    pub roles: Vec<String>,
    pub permissions: serde_json::Value,
    #[serde(rename = "type")]
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
}

impl AccessTokenClaims {
    pub fn new(
        user_id: &str,
        tenant_id: &str,
        roles: Vec<String>,
        permissions: serde_json::Value,
        issued_at: i64,
        ttl_secs: i64,
    ) -> Self {
        Self {
            sub: user_id.to_string(),
            tid: tenant_id.to_string(),
            roles,
            permissions,
            token_type: "access".to_string(),
            iat: issued_at,
            exp: issued_at + ttl_secs,
        }
    }
}

fn b64url_json<T: Serialize>(value: &T) -> Result<String, CryptoError> {
    let bytes = serde_json::to_vec(value).map_err(|e| CryptoError::Json(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Sign `claims` into the wire format described above.
pub fn sign_access_token(secret: &[u8], claims: &AccessTokenClaims) -> Result<String, CryptoError> {
    let header = Header {
        alg: "HS256",
        typ: "JWT",
    };
    let header_b64 = b64url_json(&header)?;
    let payload_b64 = b64url_json(claims)?;
    let signing_input = format!("{header_b64}.{payload_b64}");

    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{signing_input}.{signature}"))
}

/// Verify an access token's signature and return its claims. Does not check
/// `exp` against wall-clock time itself — callers pass `now` so the check
/// stays testable without depending on system time.
pub fn verify_access_token(
    secret: &[u8],
    token: &str,
    now: i64,
) -> Result<AccessTokenClaims, CryptoError> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(CryptoError::MalformedToken);
    };

    let signing_input = format!("{header_b64}.{payload_b64}");
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(signing_input.as_bytes());
    let expected_sig = mac.finalize().into_bytes();

    let given_sig = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|e| CryptoError::Base64(e.to_string()))?;

    use subtle::ConstantTimeEq;
    if expected_sig.as_slice().ct_eq(&given_sig).unwrap_u8() != 1 {
        return Err(CryptoError::BadSignature);
    }

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|e| CryptoError::Base64(e.to_string()))?;
    let claims: AccessTokenClaims =
        serde_json::from_slice(&payload_bytes).map_err(|e| CryptoError::Json(e.to_string()))?;

    if claims.exp < now {
        return Err(CryptoError::TokenExpired);
    }

    Ok(claims)
}

/// Generate a fresh 64-byte random refresh secret, base64url-encoded.
pub fn generate_refresh_secret() -> String {
    let mut bytes = [0u8; 64];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a refresh secret for storage. Only this digest is persisted, never
/// the secret itself.
pub fn hash_refresh_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_roundtrips() {
        let secret = b"test-signing-secret";
        let claims = AccessTokenClaims::new(
            "user-1",
            "tenant-1",
            vec!["admin".to_string()],
            serde_json::json!(["wallet.read"]),
            1_000,
            900,
        );
        let token = sign_access_token(secret, &claims).unwrap();
        let verified = verify_access_token(secret, &token, 1_500).unwrap();
        assert_eq!(verified.sub, "user-1");
        assert_eq!(verified.exp, 1_900);
    }

    #[test]
    fn expired_token_is_rejected() {
        let secret = b"test-signing-secret";
        let claims = AccessTokenClaims::new("u", "t", vec![], serde_json::json!([]), 0, 100);
        let token = sign_access_token(secret, &claims).unwrap();
        assert!(matches!(
            verify_access_token(secret, &token, 200),
            Err(CryptoError::TokenExpired)
        ));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let secret = b"test-signing-secret";
        let claims = AccessTokenClaims::new("u", "t", vec![], serde_json::json!([]), 0, 100);
        let mut token = sign_access_token(secret, &claims).unwrap();
        token.push('x');
        assert!(verify_access_token(secret, &token, 0).is_err());
    }

    #[test]
    fn refresh_secret_hash_is_deterministic() {
        let secret = generate_refresh_secret();
        assert_eq!(hash_refresh_secret(&secret), hash_refresh_secret(&secret));
    }
}
