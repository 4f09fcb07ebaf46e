//! RSA-OAEP Encryption and Decryption Services
//!
//! Stateless transforms over the resolved [`CredentialBundle`]: payloads are
//! encrypted under the server certificate's public key and decrypted with the
//! matching private key.
//!
//! Padding is RSA-OAEP with SHA-1 (OpenSSL's `PKCS1_OAEP` default), applied
//! identically on both paths. Under a 2048-bit modulus that caps plaintext at
//! 256 − 42 = 214 bytes; ciphertext is always exactly one modulus worth of
//! bytes (256) before base64 encoding. OAEP padding is randomized, so two
//! encryptions of the same plaintext produce different ciphertexts that both
//! decrypt to the original.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use openssl::rsa::Padding;
use thiserror::Error;

use crate::key_material::CredentialState;

/// OAEP overhead in bytes: two SHA-1 digests plus two framing bytes
pub const OAEP_OVERHEAD: usize = 2 * 20 + 2;

/// What went wrong with an encrypt or decrypt request
#[derive(Debug, Error)]
pub enum CryptoError {
    /// No key material resolved at startup
    #[error("key material unavailable")]
    KeyUnavailable,
    /// Plaintext was empty
    #[error("plaintext is empty")]
    InputEmpty,
    /// Plaintext exceeds what RSA-OAEP can carry under the loaded key
    #[error("plaintext is {len} bytes, maximum is {max}")]
    InputTooLarge { len: usize, max: usize },
    /// Payload was not valid base64 or not one RSA block long
    #[error("malformed input: {0}")]
    MalformedInput(String),
    /// The underlying engine rejected the operation (typically an OAEP
    /// padding check failure from a mismatched key or corrupted ciphertext)
    #[error("crypto failure: {0}")]
    CryptoFailure(String),
}

/// Encrypt plaintext under the certificate's public key
///
/// Returns the ciphertext as base64. The decoded ciphertext is always
/// exactly the RSA modulus size in bytes.
///
/// # Errors
/// * [`CryptoError::KeyUnavailable`] - no credentials resolved
/// * [`CryptoError::InputEmpty`] - plaintext is empty
/// * [`CryptoError::InputTooLarge`] - plaintext exceeds the OAEP bound
/// * [`CryptoError::CryptoFailure`] - engine-level failure
pub fn encrypt_data(credentials: &CredentialState, plaintext: &[u8]) -> Result<String, CryptoError> {
    let bundle = credentials.bundle().ok_or(CryptoError::KeyUnavailable)?;

    if plaintext.is_empty() {
        return Err(CryptoError::InputEmpty);
    }

    let public_key = bundle
        .certificate()
        .public_key()
        .map_err(|e| CryptoError::CryptoFailure(format!("failed to extract public key: {}", e)))?;
    let rsa = public_key
        .rsa()
        .map_err(|e| CryptoError::CryptoFailure(format!("public key is not RSA: {}", e)))?;

    let modulus_size = rsa.size() as usize;
    let max = modulus_size - OAEP_OVERHEAD;
    if plaintext.len() > max {
        return Err(CryptoError::InputTooLarge {
            len: plaintext.len(),
            max,
        });
    }

    let mut ciphertext = vec![0u8; modulus_size];
    let len = rsa
        .public_encrypt(plaintext, &mut ciphertext, Padding::PKCS1_OAEP)
        .map_err(|e| CryptoError::CryptoFailure(format!("RSA encryption failed: {}", e)))?;
    ciphertext.truncate(len);

    Ok(BASE64.encode(&ciphertext))
}

/// Decrypt a base64 payload with the private key
///
/// The decoded payload must be exactly one RSA block (the modulus size in
/// bytes); anything else is rejected before the key is touched.
///
/// # Errors
/// * [`CryptoError::KeyUnavailable`] - no credentials resolved
/// * [`CryptoError::MalformedInput`] - bad base64 or wrong decoded length
/// * [`CryptoError::CryptoFailure`] - OAEP padding check failure
pub fn decrypt_data(credentials: &CredentialState, payload: &str) -> Result<Vec<u8>, CryptoError> {
    let bundle = credentials.bundle().ok_or(CryptoError::KeyUnavailable)?;

    let ciphertext = BASE64
        .decode(payload.trim())
        .map_err(|e| CryptoError::MalformedInput(format!("invalid base64: {}", e)))?;

    let private_key = bundle
        .private_key()
        .map_err(|e| CryptoError::CryptoFailure(format!("failed to load private key: {}", e)))?;
    let rsa = private_key
        .rsa()
        .map_err(|e| CryptoError::CryptoFailure(format!("private key is not RSA: {}", e)))?;

    let modulus_size = rsa.size() as usize;
    if ciphertext.len() != modulus_size {
        return Err(CryptoError::MalformedInput(format!(
            "ciphertext is {} bytes, expected {}",
            ciphertext.len(),
            modulus_size
        )));
    }

    let mut plaintext = vec![0u8; modulus_size];
    let len = rsa
        .private_decrypt(&ciphertext, &mut plaintext, Padding::PKCS1_OAEP)
        .map_err(|e| CryptoError::CryptoFailure(format!("RSA decryption failed: {}", e)))?;
    plaintext.truncate(len);

    Ok(plaintext)
}
