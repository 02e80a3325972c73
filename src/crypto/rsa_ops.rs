// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Shared RSA primitives: OAEP(SHA-1) transport encryption and "recoverable"
//! PKCS#1-v1.5 signatures.
//!
//! The recoverable-signature convention signs the ASCII hex digest string,
//! not the raw digest bytes, and verifies by public-decrypting the signature
//! and comparing the recovered bytes to a freshly computed digest, mirroring
//! a `private_encrypt`/`public_decrypt` pairing exactly; a stricter
//! PSS/PKCS1-with-DigestInfo scheme would change interop and must not be
//! substituted silently.

use rsa::{
    oaep,
    traits::{Decryptor, PublicKeyParts, RandomizedEncryptor},
    Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey,
};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// RSA operation failures.
#[derive(Debug, Error)]
pub enum RsaOpError {
    /// OAEP encryption failed (oversized plaintext or bad key).
    #[error("oaep encrypt")]
    OaepEncrypt,
    /// OAEP decryption failed (wrong key or corrupt ciphertext).
    #[error("oaep decrypt")]
    OaepDecrypt,
    /// Signature generation failed.
    #[error("sign")]
    Sign,
    /// Signature did not verify.
    #[error("verify")]
    Verify,
}

/// Encrypt `plaintext` under `pub_key` with RSA-OAEP, SHA-1/MGF1-SHA-1, empty label.
pub fn oaep_encrypt(pub_key: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>, RsaOpError> {
    let encrypting_key = oaep::EncryptingKey::<Sha1>::new(pub_key.clone());
    let mut rng = rsa::rand_core::OsRng;
    encrypting_key
        .encrypt_with_rng(&mut rng, plaintext)
        .map_err(|_| RsaOpError::OaepEncrypt)
}

/// Decrypt `ciphertext` under `priv_key` with RSA-OAEP, SHA-1/MGF1-SHA-1, empty label.
pub fn oaep_decrypt(priv_key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>, RsaOpError> {
    let decrypting_key = oaep::DecryptingKey::<Sha1>::new(priv_key.clone());
    decrypting_key
        .decrypt(ciphertext)
        .map_err(|_| RsaOpError::OaepDecrypt)
}

/// Compute the lowercase ASCII hex SHA-256 digest string of `message`.
pub fn sha256_hex(message: &[u8]) -> String {
    let digest = Sha256::digest(message);
    hex::encode(digest)
}

/// Sign `message`'s SHA-256 hex digest string using raw (unprefixed)
/// PKCS#1-v1.5 padding, so that the signature is recoverable by public-key
/// decryption rather than requiring a hash-aware verifier.
pub fn sign_recoverable(priv_key: &RsaPrivateKey, message: &[u8]) -> Result<Vec<u8>, RsaOpError> {
    let digest_hex = sha256_hex(message);
    priv_key
        .sign(Pkcs1v15Sign::new_unprefixed(), digest_hex.as_bytes())
        .map_err(|_| RsaOpError::Sign)
}

/// Verify a recoverable PKCS#1-v1.5 signature over `message`'s SHA-256 hex
/// digest string, public-decrypting `sig` under `pub_key` and comparing the
/// recovered bytes to a freshly computed digest.
pub fn verify_recoverable(
    pub_key: &RsaPublicKey,
    message: &[u8],
    sig: &[u8],
) -> Result<(), RsaOpError> {
    let digest_hex = sha256_hex(message);
    pub_key
        .verify(Pkcs1v15Sign::new_unprefixed(), digest_hex.as_bytes(), sig)
        .map_err(|_| RsaOpError::Verify)
}

/// Modulus size in bytes, used to size-check ciphertexts/signatures before
/// attempting the (comparatively expensive) RSA operation.
pub fn modulus_len(pub_key: &RsaPublicKey) -> usize {
    pub_key.size()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPrivateKey;

    fn test_key() -> RsaPrivateKey {
        let mut rng = rsa::rand_core::OsRng;
        RsaPrivateKey::new(&mut rng, 2048).unwrap()
    }

    #[test]
    fn oaep_round_trip() {
        let key = test_key();
        let pub_key = key.to_public_key();
        let plaintext = b"session key material";
        let ct = oaep_encrypt(&pub_key, plaintext).unwrap();
        assert_eq!(ct.len(), modulus_len(&pub_key));
        let pt = oaep_decrypt(&key, &ct).unwrap();
        assert_eq!(pt, plaintext);
    }

    #[test]
    fn oaep_decrypt_garbage_fails() {
        let key = test_key();
        let garbage = vec![0u8; 256];
        assert!(oaep_decrypt(&key, &garbage).is_err());
    }

    #[test]
    fn recoverable_signature_round_trip() {
        let key = test_key();
        let pub_key = key.to_public_key();
        let message = b"session-key-string";
        let sig = sign_recoverable(&key, message).unwrap();
        assert!(verify_recoverable(&pub_key, message, &sig).is_ok());
    }

    #[test]
    fn recoverable_signature_rejects_tampered_message() {
        let key = test_key();
        let pub_key = key.to_public_key();
        let sig = sign_recoverable(&key, b"original").unwrap();
        assert!(verify_recoverable(&pub_key, b"tampered", &sig).is_err());
    }

    #[test]
    fn recoverable_signature_rejects_wrong_key() {
        let key = test_key();
        let other = test_key();
        let sig = sign_recoverable(&key, b"message").unwrap();
        assert!(verify_recoverable(&other.to_public_key(), b"message", &sig).is_err());
    }
}
