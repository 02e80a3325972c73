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

//! Crypticle: encrypt-then-MAC authenticated encryption for opaque byte
//! payloads.
//!
//! Wire layout: `IV(16) || CT || MAC(32)`, AES-CBC with PKCS#7 padding and
//! HMAC-SHA256 over `IV || CT`. The MAC is checked, in constant time,
//! before any ciphertext is touched: a tampered message never yields
//! partial plaintext.

use aes::{Aes128, Aes192, Aes256};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{
    block_padding::NoPadding, generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut,
    KeyIvInit,
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::padding::{pkcs7_pad, pkcs7_unpad};

const IV_LEN: usize = 16;
const MAC_LEN: usize = 32;
const HMAC_KEY_LEN: usize = 32;
const BLOCK_SIZE: usize = 16;

/// Fixed magic prefix checked by [`Envelope::loads`] as a sanity check
/// beyond the MAC, catching key/session mixups.
pub const PICKLE_MAGIC: &[u8; 8] = b"pickle::";

/// Envelope errors.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The key string did not decode to a supported length.
    #[error("invalid key")]
    InvalidKey,
    /// MAC verification failed; no ciphertext was decrypted.
    #[error("authentication failed")]
    AuthenticationFailed,
}

type HmacSha256 = Hmac<Sha256>;

/// Generate a fresh session-key string: `key_size/8` random AES key bytes
/// followed by 32 random HMAC key bytes, base64-encoded without newlines.
pub fn generate_key_string(key_size: usize) -> String {
    let aes_len = key_size / 8;
    let mut buf = vec![0u8; aes_len + HMAC_KEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    STANDARD.encode(&buf)
}

/// Authenticated-encryption envelope built from a session-key string.
pub struct Envelope {
    aes_key: Zeroizing<Vec<u8>>,
    hmac_key: Zeroizing<Vec<u8>>,
}

impl Envelope {
    /// Build an envelope from a base64 session-key string, checking that it
    /// decodes to exactly `key_size/8 + 32` bytes.
    pub fn new(key_string: &str, key_size: usize) -> Result<Self, EnvelopeError> {
        let raw = STANDARD
            .decode(key_string.trim())
            .map_err(|_| EnvelopeError::InvalidKey)?;
        let aes_len = key_size / 8;
        if raw.len() != aes_len + HMAC_KEY_LEN {
            return Err(EnvelopeError::InvalidKey);
        }
        if !matches!(aes_len, 16 | 24 | 32) {
            return Err(EnvelopeError::InvalidKey);
        }
        let (aes_key, hmac_key) = raw.split_at(aes_len);
        Ok(Self {
            aes_key: Zeroizing::new(aes_key.to_vec()),
            hmac_key: Zeroizing::new(hmac_key.to_vec()),
        })
    }

    /// Encrypt `plaintext`: PKCS#7-pad, AES-CBC encrypt under a fresh IV,
    /// then HMAC-SHA256 over `IV || CT`. Output: `IV || CT || MAC`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        let padded = pkcs7_pad(plaintext, BLOCK_SIZE);

        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut iv);

        let ct = aes_cbc_encrypt(&self.aes_key, &iv, &padded)?;

        let mut out = Vec::with_capacity(IV_LEN + ct.len() + MAC_LEN);
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ct);

        let mac = self.compute_mac(&out);
        out.extend_from_slice(&mac);
        Ok(out)
    }

    /// Decrypt a `IV || CT || MAC` message. The MAC is verified in constant
    /// time before any ciphertext is touched; mismatch returns
    /// `AuthenticationFailed` without exposing plaintext.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        if data.len() < IV_LEN + MAC_LEN {
            return Err(EnvelopeError::AuthenticationFailed);
        }
        let (signed, tag) = data.split_at(data.len() - MAC_LEN);
        let expected = self.compute_mac(signed);
        if expected[..].ct_eq(tag).unwrap_u8() != 1 {
            return Err(EnvelopeError::AuthenticationFailed);
        }

        let (iv, ct) = signed.split_at(IV_LEN);
        let padded = aes_cbc_decrypt(&self.aes_key, iv, ct)?;
        pkcs7_unpad(&padded, BLOCK_SIZE)
    }

    /// Encrypt an already-serialized object, prefixing the fixed magic
    /// bytes so `loads` can sanity-check the decrypted plaintext.
    pub fn dumps(&self, obj: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        let mut tagged = Vec::with_capacity(PICKLE_MAGIC.len() + obj.len());
        tagged.extend_from_slice(PICKLE_MAGIC);
        tagged.extend_from_slice(obj);
        self.encrypt(&tagged)
    }

    /// Decrypt and strip the magic prefix written by `dumps`. If the
    /// decrypted plaintext does not begin with the magic, returns an empty
    /// object rather than erroring: this is a sanity check beyond the MAC,
    /// not an authentication boundary.
    pub fn loads(&self, data: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        let plaintext = self.decrypt(data)?;
        if plaintext.starts_with(PICKLE_MAGIC) {
            Ok(plaintext[PICKLE_MAGIC.len()..].to_vec())
        } else {
            Ok(Vec::new())
        }
    }

    fn compute_mac(&self, data: &[u8]) -> [u8; MAC_LEN] {
        let mut mac = HmacSha256::new_from_slice(&self.hmac_key)
            .expect("HMAC accepts keys of any length");
        mac.update(data);
        mac.finalize().into_bytes().into()
    }
}

fn aes_cbc_encrypt(key: &[u8], iv: &[u8; IV_LEN], padded: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    match key.len() {
        16 => Ok(cbc::Encryptor::<Aes128>::new(
            GenericArray::from_slice(key),
            GenericArray::from_slice(iv),
        )
        .encrypt_padded_vec_mut::<NoPadding>(padded)),
        24 => Ok(cbc::Encryptor::<Aes192>::new(
            GenericArray::from_slice(key),
            GenericArray::from_slice(iv),
        )
        .encrypt_padded_vec_mut::<NoPadding>(padded)),
        32 => Ok(cbc::Encryptor::<Aes256>::new(
            GenericArray::from_slice(key),
            GenericArray::from_slice(iv),
        )
        .encrypt_padded_vec_mut::<NoPadding>(padded)),
        _ => Err(EnvelopeError::InvalidKey),
    }
}

fn aes_cbc_decrypt(key: &[u8], iv: &[u8], ct: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    if iv.len() != IV_LEN || ct.is_empty() || ct.len() % BLOCK_SIZE != 0 {
        return Err(EnvelopeError::AuthenticationFailed);
    }
    let out = match key.len() {
        16 => cbc::Decryptor::<Aes128>::new(GenericArray::from_slice(key), GenericArray::from_slice(iv))
            .decrypt_padded_vec_mut::<NoPadding>(ct)
            .map_err(|_| EnvelopeError::AuthenticationFailed)?,
        24 => cbc::Decryptor::<Aes192>::new(GenericArray::from_slice(key), GenericArray::from_slice(iv))
            .decrypt_padded_vec_mut::<NoPadding>(ct)
            .map_err(|_| EnvelopeError::AuthenticationFailed)?,
        32 => cbc::Decryptor::<Aes256>::new(GenericArray::from_slice(key), GenericArray::from_slice(iv))
            .decrypt_padded_vec_mut::<NoPadding>(ct)
            .map_err(|_| EnvelopeError::AuthenticationFailed)?,
        _ => return Err(EnvelopeError::InvalidKey),
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key_string = generate_key_string(192);
        let env = Envelope::new(&key_string, 192).unwrap();
        let plaintext = b"publish this command to the minion";
        let ct = env.encrypt(plaintext).unwrap();
        let pt = env.decrypt(&ct).unwrap();
        assert_eq!(pt, plaintext);
    }

    #[test]
    fn dumps_loads_round_trip() {
        let key_string = generate_key_string(192);
        let env = Envelope::new(&key_string, 192).unwrap();
        let obj = br#"{"cmd":"test.ping"}"#;
        let wire = env.dumps(obj).unwrap();
        let recovered = env.loads(&wire).unwrap();
        assert_eq!(recovered, obj);
    }

    #[test]
    fn new_rejects_wrong_length() {
        let bad = STANDARD.encode([0u8; 10]);
        assert!(matches!(
            Envelope::new(&bad, 192),
            Err(EnvelopeError::InvalidKey)
        ));
    }

    #[test]
    fn new_rejects_non_base64() {
        assert!(matches!(
            Envelope::new("not base64!!", 192),
            Err(EnvelopeError::InvalidKey)
        ));
    }

    #[test]
    fn tampered_ciphertext_fails_closed() {
        let key_string = generate_key_string(192);
        let env = Envelope::new(&key_string, 192).unwrap();
        let mut ct = env.encrypt(b"hello").unwrap();
        ct[20] ^= 0x01;
        assert!(matches!(
            env.decrypt(&ct),
            Err(EnvelopeError::AuthenticationFailed)
        ));
    }

    #[test]
    fn tampered_mac_fails_closed() {
        let key_string = generate_key_string(192);
        let env = Envelope::new(&key_string, 192).unwrap();
        let mut ct = env.encrypt(b"hello").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        assert!(matches!(
            env.decrypt(&ct),
            Err(EnvelopeError::AuthenticationFailed)
        ));
    }

    #[test]
    fn different_key_cannot_decrypt() {
        let env_a = Envelope::new(&generate_key_string(192), 192).unwrap();
        let env_b = Envelope::new(&generate_key_string(192), 192).unwrap();
        let ct = env_a.encrypt(b"secret").unwrap();
        assert!(env_b.decrypt(&ct).is_err());
    }

    #[test]
    fn loads_rejects_session_mixup_with_empty_object() {
        let env_a = Envelope::new(&generate_key_string(192), 192).unwrap();
        // Same key, but plaintext without the magic prefix, simulating a
        // decrypt under the right key but wrong serialization framing.
        let ct = env_a.encrypt(b"no magic here").unwrap();
        let recovered = env_a.loads(&ct).unwrap();
        assert!(recovered.is_empty());
    }

    #[test]
    fn generate_key_string_has_expected_decoded_length() {
        for key_size in [128usize, 192, 256] {
            let s = generate_key_string(key_size);
            let raw = STANDARD.decode(&s).unwrap();
            assert_eq!(raw.len(), key_size / 8 + HMAC_KEY_LEN);
        }
    }

    #[test]
    fn supports_all_three_aes_variants() {
        for key_size in [128usize, 192, 256] {
            let env = Envelope::new(&generate_key_string(key_size), key_size).unwrap();
            let ct = env.encrypt(b"variant test").unwrap();
            assert_eq!(env.decrypt(&ct).unwrap(), b"variant test");
        }
    }
}
