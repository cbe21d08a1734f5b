//! HMAC helpers shared by the webhook guard and Roblox verification

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac(secret: &[u8]) -> HmacSha256 {
  // HMAC accepts keys of any length
  match HmacSha256::new_from_slice(secret) {
    Ok(mac) => mac,
    Err(_) => unreachable!("hmac key length is unrestricted"),
  }
}

/// Lowercase hex HMAC-SHA256 of `body`
pub fn sign(secret: &[u8], body: &[u8]) -> String {
  let mut mac = mac(secret);
  mac.update(body);
  hex::encode(mac.finalize().into_bytes())
}

/// Constant time check of a hex signature
pub fn verify(secret: &[u8], body: &[u8], signature: &str) -> bool {
  let Ok(expected) = hex::decode(signature.trim()) else {
    return false;
  };

  let mut mac = mac(secret);
  mac.update(body);
  mac.verify_slice(&expected).is_ok()
}

/// Phrase the user puts into the Roblox profile description to prove ownership
pub fn challenge_phrase(secret: &[u8], tg_user_id: i64) -> String {
  let digest = sign(secret, format!("roblox-verify:{tg_user_id}").as_bytes());
  format!("nuts-{}", &digest[..10])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_sign_and_verify() {
    let body = br#"{"external_id":"x"}"#;
    let signature = sign(b"secret", body);

    assert_eq!(signature.len(), 64);
    let lower_hex = |c: char| c.is_ascii_hexdigit() && !c.is_ascii_uppercase();
    assert!(signature.chars().all(lower_hex));
    assert!(verify(b"secret", body, &signature));
    assert!(!verify(b"other", body, &signature));
    assert!(!verify(b"secret", br#"{"external_id":"y"}"#, &signature));
    assert!(!verify(b"secret", body, "not hex"));
    assert!(!verify(b"secret", body, ""));
  }

  #[test]
  fn test_known_vector() {
    // RFC 4231 test case 2
    assert_eq!(
      sign(b"Jefe", b"what do ya want for nothing?"),
      "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
    );
  }

  #[test]
  fn test_challenge_is_stable_per_user() {
    let first = challenge_phrase(b"secret", 42);
    assert_eq!(first, challenge_phrase(b"secret", 42));
    assert_ne!(first, challenge_phrase(b"secret", 43));
    assert_ne!(first, challenge_phrase(b"rotated", 42));
    assert!(first.starts_with("nuts-"));
  }
}
