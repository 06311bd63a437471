use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-elevenlabs-signature";
pub const SECRET_HEADER: &str = "x-webhook-secret";

pub fn sign_body(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Checks a hex HMAC-SHA256 of the raw body. An empty secret disables the check.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        return true;
    }
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(body);
            mac.verify_slice(&expected).is_ok()
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"conversation_id":"conv_1"}"#;

    #[test]
    fn test_valid_signature_passes() {
        let sig = sign_body("s3cret", BODY).unwrap();
        assert_eq!(sig.len(), 64);
        assert!(verify_signature("s3cret", BODY, &sig));
    }

    #[test]
    fn test_tampered_or_malformed_signature_fails() {
        let sig = sign_body("s3cret", BODY).unwrap();
        assert!(!verify_signature("other", BODY, &sig));
        assert!(!verify_signature("s3cret", br#"{"conversation_id":"conv_2"}"#, &sig));
        assert!(!verify_signature("s3cret", BODY, "not-hex"));
        assert!(!verify_signature("s3cret", BODY, ""));
    }

    #[test]
    fn test_no_secret_skips_verification() {
        assert!(verify_signature("", BODY, ""));
    }
}
