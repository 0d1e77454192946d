//! Wire format and MAC for rotating credentials.
//!
//! A credential reads `session_id|window_index|nonce:signature` where the
//! signature is the lowercase hex HMAC-SHA256 of `session_id|window_index|nonce`
//! under the session secret. None of the characters the format produces
//! collide with the two delimiters, so the string splits unambiguously and
//! survives percent-encoding.

use std::fmt;

use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::crypto::secret::SessionSecret;
use crate::error::RejectReason;

type HmacSha256 = Hmac<Sha256>;

/// Separates the three signed fields.
pub const FIELD_DELIMITER: char = '|';
/// Separates the signed body from the signature.
pub const SIGNATURE_MARKER: char = ':';
/// The number of random bytes in a nonce.
pub const NONCE_BYTES: usize = 12;

/// A parsed or freshly issued credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub session_id: Uuid,
    pub window_index: i64,
    pub nonce: String,
    pub signature: String,
}

impl Credential {
    /// Builds and signs a credential for the given window with a caller-chosen nonce.
    pub fn sign(secret: &SessionSecret, session_id: Uuid, window_index: i64, nonce: String) -> Self {
        let signature = compute_signature(secret, session_id, window_index, &nonce);
        Self {
            session_id,
            window_index,
            nonce,
            signature,
        }
    }

    /// Parses the wire form. Only structure is checked here, not the signature.
    ///
    /// The signed body never contains the marker, so the first one ends it;
    /// anything after it, stray markers included, is the signature.
    ///
    /// # Arguments
    ///
    /// * `text` - The normalized credential text.
    ///
    /// # Returns
    ///
    /// The parsed `Credential`, or `RejectReason::MalformedPayload`.
    pub fn parse(text: &str) -> Result<Self, RejectReason> {
        let (body, signature) = text
            .split_once(SIGNATURE_MARKER)
            .ok_or(RejectReason::MalformedPayload)?;

        let mut fields = body.split(FIELD_DELIMITER);
        let (Some(session), Some(window), Some(nonce), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(RejectReason::MalformedPayload);
        };

        let session_id = Uuid::parse_str(session).map_err(|_| RejectReason::MalformedPayload)?;
        let window_index: i64 = window.parse().map_err(|_| RejectReason::MalformedPayload)?;

        if nonce.is_empty() || !nonce.bytes().all(is_base64url) {
            return Err(RejectReason::MalformedPayload);
        }
        if signature.is_empty() {
            return Err(RejectReason::MalformedPayload);
        }

        Ok(Self {
            session_id,
            window_index,
            nonce: nonce.to_string(),
            signature: signature.to_string(),
        })
    }

    /// Checks the signature against the secret in constant time.
    pub fn signature_matches(&self, secret: &SessionSecret) -> bool {
        let expected = compute_signature(secret, self.session_id, self.window_index, &self.nonce);
        expected.as_bytes().ct_eq(self.signature.as_bytes()).into()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{FIELD_DELIMITER}{}{FIELD_DELIMITER}{}{SIGNATURE_MARKER}{}",
            self.session_id, self.window_index, self.nonce, self.signature
        )
    }
}

/// Generates a random nonce, base64url without padding.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Computes the hex HMAC-SHA256 over `session_id|window_index|nonce`.
pub fn compute_signature(
    secret: &SessionSecret,
    session_id: Uuid,
    window_index: i64,
    nonce: &str,
) -> String {
    // HMAC accepts keys of any length.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts any key length"));
    mac.update(signing_input(session_id, window_index, nonce).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn signing_input(session_id: Uuid, window_index: i64, nonce: &str) -> String {
    format!("{session_id}{FIELD_DELIMITER}{window_index}{FIELD_DELIMITER}{nonce}")
}

fn is_base64url(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> SessionSecret {
        SessionSecret::new([42u8; 32])
    }

    #[test]
    fn test_display_then_parse() {
        let session_id = Uuid::new_v4();
        let credential = Credential::sign(&secret(), session_id, 17, generate_nonce());
        let text = credential.to_string();

        let parsed = Credential::parse(&text).unwrap();
        assert_eq!(parsed, credential);
        assert!(parsed.signature_matches(&secret()));
    }

    #[test]
    fn test_signature_is_deterministic() {
        let session_id = Uuid::new_v4();
        let a = compute_signature(&secret(), session_id, 3, "abc");
        let b = compute_signature(&secret(), session_id, 3, "abc");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, compute_signature(&secret(), session_id, 4, "abc"));
    }

    #[test]
    fn test_nonce_is_fresh_and_url_safe() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_ne!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.bytes().all(is_base64url));
    }

    #[test]
    fn test_parse_rejects_structural_damage() {
        let id = Uuid::new_v4();
        let cases = [
            String::new(),
            "no delimiters at all".to_string(),
            format!("{id}|1|nonce"),
            format!("{id}|1:sig"),
            format!("{id}|1|nonce|extra:sig"),
            format!("not-a-uuid|1|nonce:sig"),
            format!("{id}|one|nonce:sig"),
            format!("{id}||nonce:sig"),
            format!("{id}|1|:sig"),
            format!("{id}|1|no nce:sig"),
            format!("{id}|1|nonce:"),
        ];
        for case in cases {
            assert_eq!(
                Credential::parse(&case),
                Err(RejectReason::MalformedPayload),
                "expected malformed: {case:?}"
            );
        }
    }

    #[test]
    fn test_parse_accepts_negative_window() {
        let id = Uuid::new_v4();
        let parsed = Credential::parse(&format!("{id}|-2|abc:def")).unwrap();
        assert_eq!(parsed.window_index, -2);
    }

    #[test]
    fn test_wrong_secret_does_not_match() {
        let credential = Credential::sign(&secret(), Uuid::new_v4(), 1, generate_nonce());
        assert!(!credential.signature_matches(&SessionSecret::new([1u8; 32])));
    }

    #[test]
    fn test_marker_inside_signature_is_a_bad_signature() {
        let credential = Credential::sign(&secret(), Uuid::new_v4(), 1, generate_nonce());
        let mut text = credential.to_string();
        let last = text.len() - 1;
        text.replace_range(last.., ":");

        let parsed = Credential::parse(&text).unwrap();
        assert_eq!(parsed.nonce, credential.nonce);
        assert!(parsed.signature.ends_with(':'));
        assert!(!parsed.signature_matches(&secret()));
    }

    #[test]
    fn test_truncated_signature_does_not_match() {
        let mut credential = Credential::sign(&secret(), Uuid::new_v4(), 1, generate_nonce());
        credential.signature.pop();
        assert!(!credential.signature_matches(&secret()));
    }
}
