//! Signed request envelope primitives.
//!
//! Every authenticated request carries a detached ed25519 signature over a
//! five-line canonical string:
//!
//! ```text
//! METHOD \n PATH_WITH_QUERY \n TIMESTAMP \n NONCE \n SHA256_HEX(BODY_BYTES)
//! ```
//!
//! `METHOD` is uppercase ASCII, `PATH_WITH_QUERY` is the exact request
//! target (no scheme or host), and the body hash is lowercase hex of the
//! raw bytes (the hash of the empty string when there is no body).
//!
//! Signing and verification are pure functions; [`verify`] returns `false`
//! for any malformed input rather than panicking.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Build the canonical bytes signed by the client.
pub fn canonical_string(
    method: &str,
    path_with_query: &str,
    timestamp: &str,
    nonce: &str,
    body: &[u8],
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}",
        method.to_ascii_uppercase(),
        path_with_query,
        timestamp,
        nonce,
        sha256_hex(body)
    )
}

/// Sign the canonical string for a request, returning the signature as
/// 128 lowercase hex characters.
pub fn sign(
    method: &str,
    path_with_query: &str,
    timestamp: &str,
    nonce: &str,
    body: &[u8],
    signing_key: &SigningKey,
) -> String {
    let message = canonical_string(method, path_with_query, timestamp, nonce, body);
    let signature = signing_key.sign(message.as_bytes());
    hex::encode(signature.to_bytes())
}

/// Verify a detached signature over the canonical string.
///
/// Returns `false` for ill-formed hex, wrong lengths, points not on the
/// curve, and genuine signature mismatches alike.
pub fn verify(
    method: &str,
    path_with_query: &str,
    timestamp: &str,
    nonce: &str,
    body: &[u8],
    pub_hex: &str,
    sig_hex: &str,
) -> bool {
    let Some(verifying_key) = decode_verifying_key(pub_hex) else {
        return false;
    };
    let Some(signature) = decode_signature(sig_hex) else {
        return false;
    };

    let message = canonical_string(method, path_with_query, timestamp, nonce, body);
    verifying_key.verify(message.as_bytes(), &signature).is_ok()
}

fn decode_verifying_key(pub_hex: &str) -> Option<VerifyingKey> {
    let bytes = hex::decode(pub_hex).ok()?;
    let bytes: [u8; 32] = bytes.try_into().ok()?;
    VerifyingKey::from_bytes(&bytes).ok()
}

fn decode_signature(sig_hex: &str) -> Option<Signature> {
    let bytes = hex::decode(sig_hex).ok()?;
    let bytes: [u8; 64] = bytes.try_into().ok()?;
    Some(Signature::from_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn pub_hex(key: &SigningKey) -> String {
        hex::encode(key.verifying_key().to_bytes())
    }

    // -----------------------------------------------------------------------
    // Canonical string
    // -----------------------------------------------------------------------

    #[test]
    fn test_canonical_string_shape() {
        let s = canonical_string("post", "/v1/jobs?limit=5", "1700000000", "ab12", b"{}");
        let lines: Vec<&str> = s.split('\n').collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "POST");
        assert_eq!(lines[1], "/v1/jobs?limit=5");
        assert_eq!(lines[2], "1700000000");
        assert_eq!(lines[3], "ab12");
        assert_eq!(lines[4], sha256_hex(b"{}"));
    }

    #[test]
    fn test_empty_body_hash_is_hash_of_empty_string() {
        let s = canonical_string("GET", "/v1/jobs/x", "0", "n", b"");
        assert!(s.ends_with("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"));
    }

    // -----------------------------------------------------------------------
    // Sign / verify round trip
    // -----------------------------------------------------------------------

    #[test]
    fn test_sign_verify_round_trip() {
        let key = test_key();
        let sig = sign("POST", "/v1/offers", "1700000000", "deadbeef", b"{\"a\":1}", &key);
        assert_eq!(sig.len(), 128);
        assert!(verify(
            "POST",
            "/v1/offers",
            "1700000000",
            "deadbeef",
            b"{\"a\":1}",
            &pub_hex(&key),
            &sig
        ));
    }

    #[test]
    fn test_verify_rejects_any_field_change() {
        let key = test_key();
        let pk = pub_hex(&key);
        let sig = sign("POST", "/v1/offers", "1700000000", "deadbeef", b"body", &key);

        assert!(!verify("GET", "/v1/offers", "1700000000", "deadbeef", b"body", &pk, &sig));
        assert!(!verify("POST", "/v1/jobs", "1700000000", "deadbeef", b"body", &pk, &sig));
        assert!(!verify("POST", "/v1/offers", "1700000001", "deadbeef", b"body", &pk, &sig));
        assert!(!verify("POST", "/v1/offers", "1700000000", "deadbeee", b"body", &pk, &sig));
        assert!(!verify("POST", "/v1/offers", "1700000000", "deadbeef", b"bodY", &pk, &sig));
    }

    #[test]
    fn test_verify_rejects_flipped_signature_bit() {
        let key = test_key();
        let pk = pub_hex(&key);
        let sig = sign("POST", "/v1/offers", "1700000000", "deadbeef", b"body", &key);

        let mut bytes = hex::decode(&sig).unwrap();
        bytes[0] ^= 0x01;
        let tampered = hex::encode(bytes);
        assert!(!verify("POST", "/v1/offers", "1700000000", "deadbeef", b"body", &pk, &tampered));
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let key = test_key();
        let other = SigningKey::from_bytes(&[9u8; 32]);
        let sig = sign("POST", "/v1/offers", "1700000000", "deadbeef", b"body", &key);
        assert!(!verify(
            "POST",
            "/v1/offers",
            "1700000000",
            "deadbeef",
            b"body",
            &pub_hex(&other),
            &sig
        ));
    }

    // -----------------------------------------------------------------------
    // Malformed inputs must not panic
    // -----------------------------------------------------------------------

    #[test]
    fn test_verify_malformed_pubkey_returns_false() {
        let key = test_key();
        let sig = sign("POST", "/", "0", "n", b"", &key);
        assert!(!verify("POST", "/", "0", "n", b"", "not-hex", &sig));
        assert!(!verify("POST", "/", "0", "n", b"", "abcd", &sig));
        assert!(!verify("POST", "/", "0", "n", b"", "", &sig));
    }

    #[test]
    fn test_verify_malformed_signature_returns_false() {
        let key = test_key();
        let pk = pub_hex(&key);
        assert!(!verify("POST", "/", "0", "n", b"", &pk, "zz"));
        assert!(!verify("POST", "/", "0", "n", b"", &pk, "abcd"));
        assert!(!verify("POST", "/", "0", "n", b"", &pk, ""));
    }

    #[test]
    fn test_verify_non_curve_point_returns_false() {
        // All-0xff is not a valid compressed Edwards point.
        let sig = "00".repeat(64);
        assert!(!verify("POST", "/", "0", "n", b"", &"ff".repeat(32), &sig));
    }
}
