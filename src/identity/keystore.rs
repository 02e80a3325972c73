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

#![deny(missing_docs)]

//! Identity Store: load/generate RSA keypairs on disk with strict
//! permissions.
//!
//! `<name>.pem` (private, mode 0400) and `<name>.pub` (public, mode 0644)
//! live under the configured PKI directory. A private key, once written, is
//! never rewritten: `load_or_generate` loads the existing file if present.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rsa::pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::{pkcs1v15, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use signature::{Signer, Verifier};
use thiserror::Error;

/// Identity Store errors.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// Malformed key material.
    #[error("invalid key")]
    InvalidKey,
    /// Key file could not be parsed.
    #[error("key parse error")]
    KeyParseError,
    /// Filesystem I/O failure.
    #[error("io error")]
    Io,
    /// The PKI directory or key file has unsafe permissions.
    #[error("permission denied")]
    PermissionDenied,
}

impl From<std::io::Error> for KeyStoreError {
    fn from(_: std::io::Error) -> Self {
        KeyStoreError::Io
    }
}

/// A loaded or freshly generated RSA identity keypair.
pub struct KeyHandle {
    name: String,
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyHandle {
    /// Load `<dir>/<name>.pem` if present, else generate a new RSA keypair
    /// of `key_size` bits, public exponent 65537, and persist both halves.
    /// `user` is a best-effort chown target for the written files.
    pub fn load_or_generate(
        dir: &Path,
        name: &str,
        key_size: usize,
        user: Option<&str>,
    ) -> Result<Self, KeyStoreError> {
        check_dir_permissions(dir)?;
        fs::create_dir_all(dir)?;

        let priv_path = dir.join(format!("{name}.pem"));
        let pub_path = dir.join(format!("{name}.pub"));

        if priv_path.exists() {
            let pem = fs::read_to_string(&priv_path)?;
            let private =
                RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|_| KeyStoreError::KeyParseError)?;
            let public = private.to_public_key();
            if !pub_path.exists() {
                write_public(&pub_path, &public, user)?;
            }
            return Ok(Self {
                name: name.to_string(),
                private,
                public,
            });
        }

        let mut rng = rsa::rand_core::OsRng;
        let private =
            RsaPrivateKey::new(&mut rng, key_size).map_err(|_| KeyStoreError::InvalidKey)?;
        let public = private.to_public_key();

        write_private(&priv_path, &private, user)?;
        write_public(&pub_path, &public, user)?;

        Ok(Self {
            name: name.to_string(),
            private,
            public,
        })
    }

    /// The key's configured name (file stem under the PKI directory).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Borrow the private key.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// Borrow the public key.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// PKCS#1 PEM encoding of the public key.
    pub fn public_pem(&self) -> Result<String, KeyStoreError> {
        self.public
            .to_pkcs1_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|_| KeyStoreError::InvalidKey)
    }

    /// Sign `message` with PKCS#1-v1.5 SHA-256 (standard, hash-prefixed
    /// form; distinct from the handshake's recoverable-signature
    /// convention in `crypto::rsa_ops`).
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, KeyStoreError> {
        let signing_key = pkcs1v15::SigningKey::<Sha256>::new(self.private.clone());
        let sig = signing_key
            .try_sign(message)
            .map_err(|_| KeyStoreError::InvalidKey)?;
        let bytes: Box<[u8]> = sig.into();
        Ok(bytes.into_vec())
    }
}

/// Verify a PKCS#1-v1.5 SHA-256 signature produced by [`KeyHandle::sign`]
/// against a PEM-encoded public key.
pub fn verify(pub_pem: &str, message: &[u8], signature: &[u8]) -> Result<bool, KeyStoreError> {
    let public =
        RsaPublicKey::from_pkcs1_pem(pub_pem).map_err(|_| KeyStoreError::KeyParseError)?;
    let verifying_key = pkcs1v15::VerifyingKey::<Sha256>::new(public);
    let sig = match pkcs1v15::Signature::try_from(signature) {
        Ok(s) => s,
        Err(_) => return Ok(false),
    };
    Ok(verifying_key.verify(message, &sig).is_ok())
}

/// Hex SHA-256 fingerprint of a PEM file's raw bytes.
pub fn pem_fingerprint(path: &Path) -> Result<String, KeyStoreError> {
    let bytes = fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(hex::encode(digest))
}

fn write_private(
    path: &Path,
    key: &RsaPrivateKey,
    user: Option<&str>,
) -> Result<(), KeyStoreError> {
    let pem = key
        .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
        .map_err(|_| KeyStoreError::InvalidKey)?;
    atomic_write(path, pem.as_bytes(), 0o400)?;
    best_effort_chown(path, user);
    Ok(())
}

fn write_public(
    path: &Path,
    key: &RsaPublicKey,
    user: Option<&str>,
) -> Result<(), KeyStoreError> {
    let pem = key
        .to_pkcs1_pem(rsa::pkcs8::LineEnding::LF)
        .map_err(|_| KeyStoreError::InvalidKey)?;
    atomic_write(path, pem.as_bytes(), 0o644)?;
    best_effort_chown(path, user);
    Ok(())
}

fn atomic_write(path: &Path, bytes: &[u8], mode: u32) -> Result<(), KeyStoreError> {
    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");

    {
        let mut f = fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }

    set_mode(&tmp, mode);
    fs::rename(&tmp, path)?;
    set_mode(path, mode);
    Ok(())
}

fn set_mode(path: &Path, mode: u32) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
}

fn best_effort_chown(path: &Path, user: Option<&str>) {
    #[cfg(unix)]
    {
        let Some(user) = user else { return };
        if let Some(uid) = resolve_uid(user) {
            let _ = nix::unistd::chown(path, Some(uid), None);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (path, user);
    }
}

#[cfg(unix)]
fn resolve_uid(user: &str) -> Option<nix::unistd::Uid> {
    nix::unistd::User::from_name(user).ok().flatten().map(|u| u.uid)
}

/// Best-effort check that the PKI directory is not world-writable before
/// writing key material into it.
fn check_dir_permissions(dir: &Path) -> Result<(), KeyStoreError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(md) = fs::metadata(dir) {
            let mode = md.permissions().mode();
            if mode & 0o002 != 0 {
                return Err(KeyStoreError::PermissionDenied);
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}

/// Path helper: `<dir>/<name>.pub`.
pub fn public_key_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.pub"))
}

/// Path helper: `<dir>/<name>.pem`.
pub fn private_key_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.pem"))
}
