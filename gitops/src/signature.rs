use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing X-Hub-Signature-256 header")]
    Missing,
    #[error("signature does not start with sha256=")]
    BadPrefix,
    #[error("signature is not valid hex")]
    BadHex,
    #[error("signature does not match payload")]
    Mismatch,
}

fn compute_mac(payload_body: &[u8], secret: &str) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload_body);
    mac.finalize().into_bytes().to_vec()
}

/// Checks a `sha256=<hex>` webhook signature against the raw request body.
pub fn verify_signature(
    payload_body: &[u8],
    signature: Option<&str>,
    secret: &str,
) -> Result<(), SignatureError> {
    let signature = match signature {
        Some(s) if !s.trim().is_empty() => s.trim(),
        _ => return Err(SignatureError::Missing),
    };
    let hex_part = signature
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(SignatureError::BadPrefix)?;
    let provided = hex::decode(hex_part).map_err(|_| SignatureError::BadHex)?;

    let expected = compute_mac(payload_body, secret);
    if expected.ct_eq(&provided).unwrap_u8() == 1 {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Produces the header value GitHub would send for `payload_body`.
pub fn sign(payload_body: &[u8], secret: &str) -> String {
    format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(compute_mac(payload_body, secret))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    static SECRET: &str = "my-github-webhook-secret";
    static BODY: &str = r#"{"action":"opened","number":1}"#;

    #[test]
    fn test_roundtrip_signature_is_accepted() {
        let signature = sign(BODY.as_bytes(), SECRET);
        assert!(signature.starts_with("sha256="));
        assert_eq!(
            verify_signature(BODY.as_bytes(), Some(&signature), SECRET),
            Ok(())
        );
    }

    #[test]
    fn test_known_vector() {
        // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
        let body = b"The quick brown fox jumps over the lazy dog";
        assert_eq!(
            sign(body, "key"),
            "sha256=f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let signature = sign(BODY.as_bytes(), SECRET);
        let tampered = BODY.replace("opened", "closed");
        assert_eq!(
            verify_signature(tampered.as_bytes(), Some(&signature), SECRET),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let signature = sign(BODY.as_bytes(), "other");
        assert_eq!(
            verify_signature(BODY.as_bytes(), Some(&signature), SECRET),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_malformed_headers() {
        assert_eq!(
            verify_signature(BODY.as_bytes(), None, SECRET),
            Err(SignatureError::Missing)
        );
        assert_eq!(
            verify_signature(BODY.as_bytes(), Some(""), SECRET),
            Err(SignatureError::Missing)
        );
        assert_eq!(
            verify_signature(BODY.as_bytes(), Some("sha1=abcd"), SECRET),
            Err(SignatureError::BadPrefix)
        );
        assert_eq!(
            verify_signature(BODY.as_bytes(), Some("sha256=zz"), SECRET),
            Err(SignatureError::BadHex)
        );
    }

    #[test]
    fn test_truncated_signature_is_a_mismatch() {
        let signature = sign(BODY.as_bytes(), SECRET);
        assert_eq!(
            verify_signature(BODY.as_bytes(), Some(&signature[..21]), SECRET),
            Err(SignatureError::Mismatch)
        );
    }
}
