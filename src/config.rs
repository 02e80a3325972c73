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

//! Configuration structs covering every recognized option.
//!
//! On-disk discovery, CLI argument parsing and environment overlaying stay
//! external; this module only owns the `serde`/`toml`-deserializable
//! shape and a convenience `from_str`/`from_file` pair.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::auth::handshake::PinnedKeyRole;
use crate::auth::session::SessionConfig;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("io error reading config")]
    Io,
    /// The config body is not valid TOML for this shape.
    #[error("toml parse error: {0}")]
    Parse(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(_: std::io::Error) -> Self {
        ConfigError::Io
    }
}

fn default_keysize() -> usize {
    2048
}

fn default_acceptance_wait_time() -> u64 {
    10
}

fn default_acceptance_wait_time_max() -> u64 {
    0
}

fn default_auth_timeout() -> u64 {
    60
}

fn default_auth_tries() -> u32 {
    7
}

/// Agent-side ("minion") configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct AgentConfig {
    /// PKI directory holding this agent's identity and pinned controller key.
    pub pki_dir: PathBuf,
    /// Cache directory; unused directly by the agent but kept for symmetry
    /// with `ControllerConfig` and any local rotation-observer tooling.
    #[serde(default)]
    pub cachedir: Option<PathBuf>,
    /// This agent's configured id.
    pub id: String,
    /// Owner for key files written under `pki_dir`.
    #[serde(default)]
    pub user: Option<String>,
    /// RSA key size in bits.
    #[serde(default = "default_keysize")]
    pub keysize: usize,

    /// Controller transport endpoint.
    pub master_uri: String,
    /// Controller display name.
    #[serde(default)]
    pub master: Option<String>,
    /// Pre-shared hex fingerprint pin for the ordinary controller role.
    #[serde(default)]
    pub master_finger: Option<String>,
    /// Pre-shared hex fingerprint pin for the syndic role.
    #[serde(default)]
    pub syndic_finger: Option<String>,
    /// Disables the TOFU/pinning check entirely.
    #[serde(default)]
    pub open_mode: bool,
    /// Soft controller rejection (`ret: false`) retries instead of exiting.
    #[serde(default)]
    pub rejected_retry: bool,

    /// Require/verify a signature on controller key changes.
    #[serde(default)]
    pub verify_master_pubkey_sign: bool,
    /// Re-verify `pub_sig` even when the controller key has not changed.
    #[serde(default)]
    pub always_verify_signature: bool,

    /// Initial backoff, in seconds, on RETRY/FULL/PendingApproval.
    #[serde(default = "default_acceptance_wait_time")]
    pub acceptance_wait_time: u64,
    /// Cap, in seconds, on the geometric backoff. `0` means uncapped.
    #[serde(default = "default_acceptance_wait_time_max")]
    pub acceptance_wait_time_max: u64,
    /// Per-attempt transport timeout budget, in seconds.
    #[serde(default = "default_auth_timeout")]
    pub auth_timeout: u64,
    /// Treat `Timeout` as RETRY rather than a hard failure.
    #[serde(default)]
    pub auth_safemode: bool,
    /// Cap on sign-in attempts before giving up; `0` retries indefinitely.
    #[serde(default = "default_auth_tries")]
    pub auth_tries: u32,

    /// This agent acts as a syndic (intermediate controller).
    #[serde(default)]
    pub syndic_master: bool,
    /// This agent acts as an alerting/monitoring endpoint.
    #[serde(default)]
    pub alert_master: bool,
    /// One-shot "caller" mode: a first RETRY exits instead of backing off.
    #[serde(default)]
    pub caller: bool,
}

impl AgentConfig {
    /// Parse from a TOML document.
    pub fn from_str(body: &str) -> Result<Self, ConfigError> {
        toml::from_str(body).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load and parse from a file on disk.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let body = std::fs::read_to_string(path)?;
        Self::from_str(&body)
    }

    /// This agent's pinned-key role, derived from `syndic_master`/
    /// `alert_master`.
    pub fn pinned_key_role(&self) -> PinnedKeyRole {
        if self.syndic_master {
            PinnedKeyRole::Syndic
        } else if self.alert_master {
            PinnedKeyRole::Monitor
        } else {
            PinnedKeyRole::Minion
        }
    }

    /// The fingerprint pin this agent's role checks.
    pub fn pinned_fingerprint(&self) -> Option<String> {
        if self.syndic_master {
            self.syndic_finger.clone()
        } else {
            self.master_finger.clone()
        }
    }

    /// Build a [`SessionConfig`] for the Session Driver from this agent's
    /// settings. `signer_pub_pem` is the pre-installed controller signing
    /// public key, loaded from `pki_dir` by the caller.
    pub fn to_session_config(&self, signer_pub_pem: Option<String>) -> SessionConfig {
        let acceptance_wait_time_max = if self.acceptance_wait_time_max == 0 {
            Duration::MAX
        } else {
            Duration::from_secs(self.acceptance_wait_time_max)
        };

        SessionConfig {
            id: self.id.clone(),
            pki_dir: self.pki_dir.clone(),
            role: self.pinned_key_role(),
            open_mode: self.open_mode,
            sig_enabled: self.verify_master_pubkey_sign,
            always_verify_signature: self.always_verify_signature,
            signer_pub_pem,
            rejected_retry: self.rejected_retry,
            acceptance_wait_time: Duration::from_secs(self.acceptance_wait_time),
            acceptance_wait_time_max,
            auth_timeout: Duration::from_secs(self.auth_timeout),
            auth_safemode: self.auth_safemode,
            auth_tries: if self.auth_tries == 0 {
                None
            } else {
                Some(self.auth_tries)
            },
            caller: self.caller,
            key_size: 192,
            fingerprint: self.pinned_fingerprint(),
        }
    }
}

/// Controller-side ("master") configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct ControllerConfig {
    /// PKI directory holding the controller identity, optional signing
    /// keypair, and optional pre-computed signature blob.
    pub pki_dir: PathBuf,
    /// Cache directory holding the rotation dropfile.
    pub cachedir: PathBuf,
    /// Owner for key/dropfile writes.
    #[serde(default)]
    pub user: Option<String>,
    /// RSA key size in bits.
    #[serde(default = "default_keysize")]
    pub keysize: usize,

    /// Enable "sign the signer": a second keypair signs `master.pub`.
    #[serde(default)]
    pub master_sign_pubkey: bool,
    /// Name of the signing keypair (`<name>.pem`/`.pub`).
    #[serde(default)]
    pub master_sign_key_name: Option<String>,
    /// Use a pre-computed signature blob instead of signing on demand.
    #[serde(default)]
    pub master_use_pubkey_signature: bool,
    /// Relative path (under `pki_dir`) of the pre-computed signature blob.
    #[serde(default)]
    pub master_pubkey_signature: Option<String>,
}

impl ControllerConfig {
    /// Parse from a TOML document.
    pub fn from_str(body: &str) -> Result<Self, ConfigError> {
        toml::from_str(body).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load and parse from a file on disk.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let body = std::fs::read_to_string(path)?;
        Self::from_str(&body)
    }
}
