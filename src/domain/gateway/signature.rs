//! Notification signature verification.
//!
//! The gateway signs every notification by percent-encoding each non-empty
//! field value, joining `key=value` pairs with `&` in the exact order the
//! fields appear on the wire, appending the shared passphrase, and hashing
//! the result. Reproducing that string is therefore order-sensitive, so
//! fields are carried as an ordered sequence rather than a map.

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::errors::WebhookError;

/// Name of the field carrying the signature itself.
///
/// Excluded from the canonical string, since the gateway computed the
/// signature before this field existed.
pub const SIGNATURE_FIELD: &str = "signature";

/// Key/value pairs in wire arrival order.
///
/// A `HashMap` would lose the ordering the signature depends on; this
/// wrapper keeps the sequence exactly as received while still offering
/// keyed lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderedFields(Vec<(String, String)>);

impl OrderedFields {
    /// Creates an empty sequence.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Parses a form-encoded body, preserving field order.
    pub fn from_form_bytes(body: &[u8]) -> Result<Self, WebhookError> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;
        Ok(Self(pairs))
    }

    /// Appends a field, keeping insertion order.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    /// Returns the first value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates pairs in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no fields were received.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for OrderedFields {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Percent-encodes a value the way the gateway does.
///
/// Spaces become `+`, unreserved characters (`A-Z a-z 0-9 - _ .`) pass
/// through, everything else becomes uppercase `%XX` - so `(` is `%28`
/// and `)` is `%29`.
pub fn encode_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' => {
                out.push(byte as char);
            }
            b' ' => out.push('+'),
            _ => {
                out.push('%');
                out.push_str(&format!("{:02X}", byte));
            }
        }
    }
    out
}

/// Verifies and generates notification signatures.
pub struct SignatureVerifier {
    /// Optional shared passphrase appended to the canonical string.
    passphrase: Option<SecretString>,
}

impl SignatureVerifier {
    /// Creates a verifier with the given optional passphrase.
    pub fn new(passphrase: Option<SecretString>) -> Self {
        Self { passphrase }
    }

    /// Builds the canonical string the signature is computed over.
    ///
    /// Every non-empty field except the signature itself contributes
    /// `key=<encoded value>`, joined by `&` in arrival order; the encoded
    /// passphrase is appended last when configured.
    pub fn canonical_string(&self, fields: &OrderedFields) -> String {
        let mut parts: Vec<String> = fields
            .iter()
            .filter(|(k, v)| *k != SIGNATURE_FIELD && !v.is_empty())
            .map(|(k, v)| format!("{}={}", k, encode_value(v)))
            .collect();

        if let Some(passphrase) = &self.passphrase {
            parts.push(format!(
                "passphrase={}",
                encode_value(passphrase.expose_secret())
            ));
        }

        parts.join("&")
    }

    /// Computes the hex signature over the given field sequence.
    pub fn sign(&self, fields: &OrderedFields) -> String {
        let canonical = self.canonical_string(fields);
        let digest = Sha256::digest(canonical.as_bytes());
        hex_encode(&digest)
    }

    /// Verifies the supplied signature against the field sequence.
    ///
    /// Comparison happens over raw digest bytes in constant time. Any
    /// mismatch - including a malformed hex signature - is a hard
    /// rejection.
    pub fn verify(&self, fields: &OrderedFields, supplied: &str) -> Result<(), WebhookError> {
        let canonical = self.canonical_string(fields);
        let expected = Sha256::digest(canonical.as_bytes());

        let supplied_bytes =
            hex_decode(supplied).ok_or(WebhookError::InvalidSignature)?;

        if !constant_time_compare(expected.as_slice(), &supplied_bytes) {
            return Err(WebhookError::InvalidSignature);
        }
        Ok(())
    }
}

/// Performs constant-time comparison of two byte slices.
///
/// Prevents timing attacks that could leak information about the
/// expected signature.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Lowercase hex encoding without allocating per byte.
pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> OrderedFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn verifier_with(passphrase: &str) -> SignatureVerifier {
        SignatureVerifier::new(Some(SecretString::new(passphrase.to_string())))
    }

    // ══════════════════════════════════════════════════════════════
    // Encoding Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn encode_passes_unreserved_through() {
        assert_eq!(encode_value("Abc-123_x.y"), "Abc-123_x.y");
    }

    #[test]
    fn encode_turns_spaces_into_plus() {
        assert_eq!(encode_value("two words"), "two+words");
    }

    #[test]
    fn encode_parentheses_as_literal_escapes() {
        assert_eq!(encode_value("(fee)"), "%28fee%29");
    }

    #[test]
    fn encode_uses_uppercase_hex() {
        assert_eq!(encode_value("a/b"), "a%2Fb");
        assert_eq!(encode_value("100%"), "100%25");
    }

    #[test]
    fn encode_handles_multibyte_utf8() {
        assert_eq!(encode_value("é"), "%C3%A9");
    }

    // ══════════════════════════════════════════════════════════════
    // Ordered Fields Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn form_parse_preserves_arrival_order() {
        let parsed =
            OrderedFields::from_form_bytes(b"zebra=1&alpha=2&middle=3").unwrap();
        let keys: Vec<&str> = parsed.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["zebra", "alpha", "middle"]);
    }

    #[test]
    fn form_parse_decodes_values() {
        let parsed = OrderedFields::from_form_bytes(b"name=two+words%21").unwrap();
        assert_eq!(parsed.get("name"), Some("two words!"));
    }

    #[test]
    fn get_returns_none_for_missing_key() {
        let parsed = OrderedFields::from_form_bytes(b"a=1").unwrap();
        assert_eq!(parsed.get("b"), None);
    }

    // ══════════════════════════════════════════════════════════════
    // Canonical String Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn canonical_string_follows_arrival_order() {
        let verifier = SignatureVerifier::new(None);
        let f = fields(&[("b", "2"), ("a", "1")]);
        assert_eq!(verifier.canonical_string(&f), "b=2&a=1");
    }

    #[test]
    fn canonical_string_skips_empty_values() {
        let verifier = SignatureVerifier::new(None);
        let f = fields(&[("a", "1"), ("blank", ""), ("b", "2")]);
        assert_eq!(verifier.canonical_string(&f), "a=1&b=2");
    }

    #[test]
    fn canonical_string_excludes_signature_field() {
        let verifier = SignatureVerifier::new(None);
        let f = fields(&[("a", "1"), ("signature", "deadbeef")]);
        assert_eq!(verifier.canonical_string(&f), "a=1");
    }

    #[test]
    fn canonical_string_appends_encoded_passphrase() {
        let verifier = verifier_with("open sesame");
        let f = fields(&[("a", "1")]);
        assert_eq!(verifier.canonical_string(&f), "a=1&passphrase=open+sesame");
    }

    #[test]
    fn canonical_string_encodes_values() {
        let verifier = SignatureVerifier::new(None);
        let f = fields(&[("item_name", "Hand carved bowl (oak)")]);
        assert_eq!(
            verifier.canonical_string(&f),
            "item_name=Hand+carved+bowl+%28oak%29"
        );
    }

    // ══════════════════════════════════════════════════════════════
    // Verification Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn sign_then_verify_succeeds() {
        let verifier = verifier_with("secret-phrase");
        let f = fields(&[("merchant_id", "10000100"), ("amount_gross", "200.00")]);
        let sig = verifier.sign(&f);
        assert!(verifier.verify(&f, &sig).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_value() {
        let verifier = verifier_with("secret-phrase");
        let f = fields(&[("amount_gross", "200.00")]);
        let sig = verifier.sign(&f);
        let tampered = fields(&[("amount_gross", "900.00")]);
        assert!(matches!(
            verifier.verify(&tampered, &sig),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn verify_rejects_reordered_fields() {
        let verifier = verifier_with("secret-phrase");
        let original = fields(&[("a", "1"), ("b", "2")]);
        let reordered = fields(&[("b", "2"), ("a", "1")]);
        let sig = verifier.sign(&original);
        assert!(verifier.verify(&reordered, &sig).is_err());
    }

    #[test]
    fn verify_rejects_wrong_passphrase() {
        let f = fields(&[("a", "1")]);
        let sig = verifier_with("right").sign(&f);
        assert!(verifier_with("wrong").verify(&f, &sig).is_err());
    }

    #[test]
    fn verify_rejects_malformed_hex() {
        let verifier = verifier_with("secret");
        let f = fields(&[("a", "1")]);
        assert!(verifier.verify(&f, "zz-not-hex").is_err());
        assert!(verifier.verify(&f, "abc").is_err()); // odd length
    }

    #[test]
    fn signature_field_in_payload_does_not_affect_digest() {
        let verifier = verifier_with("secret");
        let without = fields(&[("a", "1")]);
        let sig = verifier.sign(&without);

        let mut with = fields(&[("a", "1")]);
        with.push(SIGNATURE_FIELD, sig.clone());
        assert!(verifier.verify(&with, &sig).is_ok());
    }

    // ══════════════════════════════════════════════════════════════
    // Constant Time Comparison Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn constant_time_compare_equal_values() {
        assert!(constant_time_compare(&[1, 2, 3], &[1, 2, 3]));
    }

    #[test]
    fn constant_time_compare_different_values() {
        assert!(!constant_time_compare(&[1, 2, 3], &[1, 2, 4]));
    }

    #[test]
    fn constant_time_compare_different_lengths() {
        assert!(!constant_time_compare(&[1, 2], &[1, 2, 3]));
    }

    #[test]
    fn hex_round_trip() {
        let bytes = vec![0u8, 255, 16, 1];
        assert_eq!(hex_decode(&hex_encode(&bytes)).unwrap(), bytes);
    }
}
