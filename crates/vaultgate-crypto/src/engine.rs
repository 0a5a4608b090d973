//! Authenticated encryption and RSA key wrap.
//!
//! Symmetric operations are encrypt-then-MAC: AES-256-CBC with the key's
//! encryption half, HMAC-SHA256 over `iv || data` with the MAC half. The
//! tag is verified in constant time BEFORE any decryption is attempted;
//! plain CBC output is never returned on a failed tag.
//!
//! All functions are pure - random bytes (IVs, RNGs) are provided by the
//! caller. This enables deterministic testing.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use hmac::{Hmac, Mac};
use rand::{CryptoRng, RngCore};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{
    error::CryptoError,
    keys::{RsaKeyPair, SymmetricCryptoKey},
};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// AES block / IV size in bytes.
pub const IV_LEN: usize = 16;

/// HMAC-SHA256 tag size in bytes.
pub const MAC_LEN: usize = 32;

/// RSA modulus size for generated key pairs.
pub const RSA_KEY_BITS: usize = 2048;

/// An authenticated symmetric ciphertext.
///
/// The MAC covers `iv || data` so a transplanted IV is detected the same
/// as tampered data.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Ciphertext {
    /// CBC initialization vector.
    pub iv: [u8; IV_LEN],
    /// HMAC-SHA256 tag over `iv || data`.
    pub mac: [u8; MAC_LEN],
    /// AES-256-CBC ciphertext (PKCS#7 padded).
    pub data: Vec<u8>,
}

/// Encrypt and authenticate `plaintext` under `key`.
///
/// The caller provides the IV and MUST use cryptographically secure random
/// bytes in production; reuse only breaks confidentiality of equal prefixes,
/// but there is no reason to ever reuse one.
pub fn symmetric_encrypt(plaintext: &[u8], key: &SymmetricCryptoKey, iv: [u8; IV_LEN]) -> Ciphertext {
    let Ok(cipher) = Aes256CbcEnc::new_from_slices(key.enc_half(), &iv) else {
        unreachable!("key and IV lengths are fixed by their types");
    };
    let data = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    let mac = compute_mac(key, &iv, &data);

    Ciphertext { iv, mac, data }
}

/// Verify and decrypt a [`Ciphertext`].
///
/// # Errors
///
/// - `MacMismatch` if the authentication tag does not verify (tamper);
///   nothing is decrypted in that case
/// - `DecryptFailure` if authenticated data fails to unpad (wrong key class)
pub fn symmetric_decrypt(
    ciphertext: &Ciphertext,
    key: &SymmetricCryptoKey,
) -> Result<Vec<u8>, CryptoError> {
    let expected = compute_mac(key, &ciphertext.iv, &ciphertext.data);
    if !bool::from(expected.ct_eq(&ciphertext.mac)) {
        return Err(CryptoError::MacMismatch);
    }

    let Ok(cipher) = Aes256CbcDec::new_from_slices(key.enc_half(), &ciphertext.iv) else {
        unreachable!("key and IV lengths are fixed by their types");
    };
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext.data)
        .map_err(|_| CryptoError::DecryptFailure { reason: "invalid padding".to_string() })
}

fn compute_mac(key: &SymmetricCryptoKey, iv: &[u8; IV_LEN], data: &[u8]) -> [u8; MAC_LEN] {
    let Ok(mut mac) = HmacSha256::new_from_slice(key.mac_half()) else {
        unreachable!("HMAC accepts any key length");
    };
    mac.update(iv);
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Wrap symmetric key bytes under an RSA public key (OAEP-SHA1).
pub fn rsa_wrap(
    key_bytes: &[u8],
    public_key: &RsaPublicKey,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<Vec<u8>, CryptoError> {
    public_key
        .encrypt(rng, Oaep::new::<sha1::Sha1>(), key_bytes)
        .map_err(|e| CryptoError::UnwrapFailure { reason: e.to_string() })
}

/// Unwrap symmetric key bytes with an RSA private key.
///
/// # Errors
///
/// - `UnwrapFailure` if the ciphertext was not wrapped for this key
pub fn rsa_unwrap(wrapped: &[u8], private_key: &RsaPrivateKey) -> Result<Vec<u8>, CryptoError> {
    private_key
        .decrypt(Oaep::new::<sha1::Sha1>(), wrapped)
        .map_err(|e| CryptoError::UnwrapFailure { reason: e.to_string() })
}

/// Generate a fresh RSA key pair.
///
/// Used for the account identity pair, ephemeral auth-request pairs and
/// device trust pairs alike; the type system distinguishes their roles at
/// the call sites, not here.
pub fn generate_rsa_key_pair(rng: &mut (impl RngCore + CryptoRng)) -> Result<RsaKeyPair, CryptoError> {
    let private = RsaPrivateKey::new(rng, RSA_KEY_BITS)
        .map_err(|e| CryptoError::KeyPairFailure { reason: e.to_string() })?;
    Ok(RsaKeyPair::new(private))
}
