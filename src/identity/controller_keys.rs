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

//! Controller Keys: the controller's identity keypair plus an optional
//! "sign the signer" keypair used to defend agents against controller key
//! rotation / MITM.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use tracing::{info, warn};

use crate::identity::keystore::{KeyHandle, KeyStoreError};

/// Controller Keys errors.
#[derive(Debug, Error)]
pub enum ControllerKeysError {
    /// Underlying Identity Store failure.
    #[error("key store: {0}")]
    KeyStore(#[from] KeyStoreError),
    /// `master_use_pubkey_signature` was set but the signature blob file is
    /// absent; startup must abort.
    #[error("missing pre-computed master pubkey signature file")]
    MissingSignatureFile,
    /// Signature blob file could not be read.
    #[error("io error reading signature blob")]
    Io,
}

impl From<std::io::Error> for ControllerKeysError {
    fn from(_: std::io::Error) -> Self {
        ControllerKeysError::Io
    }
}

/// Policy controlling whether/how the controller's identity key is signed.
#[derive(Clone, Debug)]
pub struct SigningPolicy {
    /// Enable "sign the signer": a second keypair signs `master.pub`.
    pub master_sign_pubkey: bool,
    /// Name of the signing keypair (`<name>.pem` / `<name>.pub`).
    pub master_sign_key_name: String,
    /// Use a pre-computed signature blob instead of signing on demand.
    pub master_use_pubkey_signature: bool,
    /// Relative path (under the PKI dir) of the pre-computed signature blob.
    pub master_pubkey_signature: Option<String>,
}

impl Default for SigningPolicy {
    fn default() -> Self {
        Self {
            master_sign_pubkey: false,
            master_sign_key_name: "master_sign".to_string(),
            master_use_pubkey_signature: false,
            master_pubkey_signature: None,
        }
    }
}

/// The controller's identity keypair and, optionally, its signing keypair
/// or a pre-computed signature blob.
pub struct ControllerKeys {
    master: KeyHandle,
    signing: Option<KeyHandle>,
    precomputed_signature: Option<String>,
}

impl ControllerKeys {
    /// Load or generate `master.pem`/`master.pub` under `pki_dir`, and set
    /// up the signing side per `policy`.
    pub fn init(
        pki_dir: &Path,
        key_size: usize,
        user: Option<&str>,
        policy: &SigningPolicy,
    ) -> Result<Self, ControllerKeysError> {
        let master = KeyHandle::load_or_generate(pki_dir, "master", key_size, user)?;

        if !policy.master_sign_pubkey {
            return Ok(Self {
                master,
                signing: None,
                precomputed_signature: None,
            });
        }

        if policy.master_use_pubkey_signature {
            let rel = policy
                .master_pubkey_signature
                .as_deref()
                .unwrap_or("master_pubkey_signature");
            let sig_path = pki_dir.join(rel);
            if !sig_path.is_file() {
                warn!(path = %sig_path.display(), "master_use_pubkey_signature enabled but signature file is absent");
                return Err(ControllerKeysError::MissingSignatureFile);
            }
            let blob = std::fs::read_to_string(&sig_path)?;
            info!(path = %sig_path.display(), "loaded pre-computed master pubkey signature");
            Ok(Self {
                master,
                signing: None,
                precomputed_signature: Some(blob.trim().to_string()),
            })
        } else {
            let signing =
                KeyHandle::load_or_generate(pki_dir, &policy.master_sign_key_name, key_size, user)?;
            Ok(Self {
                master,
                signing: Some(signing),
                precomputed_signature: None,
            })
        }
    }

    /// The controller's identity keypair.
    pub fn master(&self) -> &KeyHandle {
        &self.master
    }

    /// Base64-encoded signature over `master.pub`'s PEM bytes, either the
    /// pre-computed blob or freshly signed by the signing keypair. `None`
    /// if `master_sign_pubkey` is disabled.
    pub fn pub_signature(&self) -> Result<Option<String>, ControllerKeysError> {
        if let Some(blob) = &self.precomputed_signature {
            return Ok(Some(blob.clone()));
        }
        if let Some(signing) = &self.signing {
            let pub_pem = self.master.public_pem()?;
            let sig = signing.sign(pub_pem.as_bytes())?;
            return Ok(Some(STANDARD.encode(sig)));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn no_signing_yields_no_signature() {
        let dir = tempdir().unwrap();
        let keys = ControllerKeys::init(dir.path(), 2048, None, &SigningPolicy::default()).unwrap();
        assert!(keys.pub_signature().unwrap().is_none());
    }

    #[test]
    fn on_demand_signing_produces_verifiable_signature() {
        let dir = tempdir().unwrap();
        let policy = SigningPolicy {
            master_sign_pubkey: true,
            master_sign_key_name: "master_sign".to_string(),
            master_use_pubkey_signature: false,
            master_pubkey_signature: None,
        };
        let keys = ControllerKeys::init(dir.path(), 2048, None, &policy).unwrap();
        let sig_b64 = keys.pub_signature().unwrap().unwrap();
        let sig = STANDARD.decode(sig_b64).unwrap();

        let signing_pub_path = dir.path().join("master_sign.pub");
        let signing_pub_pem = std::fs::read_to_string(signing_pub_path).unwrap();
        let master_pub_pem = keys.master().public_pem().unwrap();

        assert!(crate::identity::keystore::verify(&signing_pub_pem, master_pub_pem.as_bytes(), &sig).unwrap());
    }

    #[test]
    fn missing_precomputed_signature_aborts() {
        let dir = tempdir().unwrap();
        let policy = SigningPolicy {
            master_sign_pubkey: true,
            master_sign_key_name: "master_sign".to_string(),
            master_use_pubkey_signature: true,
            master_pubkey_signature: Some("master_pubkey_signature".to_string()),
        };
        let err = ControllerKeys::init(dir.path(), 2048, None, &policy).unwrap_err();
        assert!(matches!(err, ControllerKeysError::MissingSignatureFile));
    }

    #[test]
    fn precomputed_signature_is_used_verbatim() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("master_pubkey_signature"), "cGluIHRoZSBzaWduZXI=\n").unwrap();
        let policy = SigningPolicy {
            master_sign_pubkey: true,
            master_sign_key_name: "master_sign".to_string(),
            master_use_pubkey_signature: true,
            master_pubkey_signature: Some("master_pubkey_signature".to_string()),
        };
        let keys = ControllerKeys::init(dir.path(), 2048, None, &policy).unwrap();
        assert_eq!(keys.pub_signature().unwrap().unwrap(), "cGluIHRoZSBzaWduZXI=");
    }
}
