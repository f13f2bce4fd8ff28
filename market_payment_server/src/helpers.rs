use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Calculates the hex-encoded HMAC-SHA256 signature of `data` under `secret`. Rail pushes carry this signature in
/// the `x-gateway-signature` header, computed over the raw request body.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    // new_from_slice only fails on zero-length keys for some MAC types; HMAC accepts any key length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::default(),
    };
    mac.update(data);
    mac.finalize().into_bytes().iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[cfg(test)]
mod test {
    use super::calculate_hmac;

    #[test]
    fn known_signature() {
        // RFC 4231 test case 2
        let sig = calculate_hmac("Jefe", b"what do ya want for nothing?");
        assert_eq!(sig, "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843");
    }

    #[test]
    fn signature_depends_on_the_secret() {
        let body = br#"{"push_id":"push-1"}"#;
        assert_ne!(calculate_hmac("secret-a", body), calculate_hmac("secret-b", body));
    }
}
