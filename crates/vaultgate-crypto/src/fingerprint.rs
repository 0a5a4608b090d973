//! Human-verifiable fingerprint phrases.
//!
//! A fingerprint phrase lets a human confirm out-of-band that the public
//! key presented to an approver is the one the requesting device actually
//! generated (MITM defense). It is a pure function of (email, public key):
//! the displayed phrase MUST be derived from locally held key material,
//! never from a key echoed back by a server.

use hkdf::Hkdf;
use sha2::{Digest, Sha256};

use crate::wordlist::{FINGERPRINT_WORDLIST, WORDLIST_LEN};

/// Number of words in a fingerprint phrase (8 bits each).
pub const PHRASE_WORDS: usize = 8;

/// A fingerprint phrase, rendered as dash-joined lowercase words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintPhrase(String);

impl FingerprintPhrase {
    /// The phrase as shown to the user.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FingerprintPhrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the fingerprint phrase for (email, DER-encoded public key).
///
/// The public key is hashed, then HKDF-SHA256 binds the hash to the email
/// so the same key shows different phrases for different accounts. The
/// first [`PHRASE_WORDS`] bytes of the expansion index the word list.
pub fn fingerprint_phrase(email: &str, public_key_der: &[u8]) -> FingerprintPhrase {
    let key_hash = Sha256::digest(public_key_der);

    let Ok(hk) = Hkdf::<Sha256>::from_prk(&key_hash) else {
        unreachable!("a SHA-256 digest is always a valid HKDF-SHA256 PRK");
    };

    let mut material = [0u8; PHRASE_WORDS];
    let Ok(()) = hk.expand(email.trim().to_lowercase().as_bytes(), &mut material) else {
        unreachable!("8 bytes is a valid HKDF-SHA256 output length");
    };

    let words: Vec<&str> =
        material.iter().map(|&b| FINGERPRINT_WORDLIST[b as usize]).collect();

    FingerprintPhrase(words.join("-"))
}

/// Sanity bound used by tests; indexing is by byte so the list must cover
/// the full byte range.
const _: () = assert!(WORDLIST_LEN == 256);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const EMAIL: &str = "user@example.com";

    #[test]
    fn phrase_is_stable_for_same_inputs() {
        let der = [0x30u8, 0x82, 0x01, 0x22, 0xAA, 0xBB];
        let a = fingerprint_phrase(EMAIL, &der);
        let b = fingerprint_phrase(EMAIL, &der);
        assert_eq!(a, b, "fingerprint must be a pure function of its inputs");
    }

    #[test]
    fn phrase_has_expected_shape() {
        let phrase = fingerprint_phrase(EMAIL, &[0x01, 0x02, 0x03]);
        let words: Vec<&str> = phrase.as_str().split('-').collect();
        assert_eq!(words.len(), PHRASE_WORDS);
        for word in words {
            assert!(FINGERPRINT_WORDLIST.contains(&word));
        }
    }

    #[test]
    fn one_byte_key_change_changes_phrase() {
        let mut der = vec![0x42u8; 270];
        let a = fingerprint_phrase(EMAIL, &der);
        der[100] ^= 0x01;
        let b = fingerprint_phrase(EMAIL, &der);
        assert_ne!(a, b);
    }

    #[test]
    fn phrase_is_bound_to_email() {
        let der = vec![0x42u8; 270];
        let a = fingerprint_phrase("alice@example.com", &der);
        let b = fingerprint_phrase("bob@example.com", &der);
        assert_ne!(a, b);
    }

    #[test]
    fn email_is_normalized() {
        let der = vec![0x42u8; 270];
        let a = fingerprint_phrase("Alice@Example.COM ", &der);
        let b = fingerprint_phrase("alice@example.com", &der);
        assert_eq!(a, b);
    }

    #[test]
    fn wordlist_entries_are_distinct() {
        let mut sorted: Vec<&str> = FINGERPRINT_WORDLIST.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), WORDLIST_LEN, "duplicate words weaken the phrase");
    }
}
